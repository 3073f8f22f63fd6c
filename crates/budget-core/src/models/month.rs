use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A year-month with saved budgets, as listed by `GET /budgets/months`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Month {
    /// Machine form used in URLs, e.g. `2025-03`
    pub value: String,
    /// Human form, e.g. `March 2025`
    pub display: String,
}

fn parse_month(value: &str) -> Option<NaiveDate> {
    if value.len() != 7 {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok()
}

/// True for strings of the form `YYYY-MM` naming a real month
pub fn is_valid_month(value: &str) -> bool {
    parse_month(value).is_some()
}

/// `2025-03` -> `March 2025`
pub fn format_month(value: &str) -> Option<String> {
    parse_month(value).map(|d| d.format("%B %Y").to_string())
}
