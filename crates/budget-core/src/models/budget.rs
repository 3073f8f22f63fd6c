use serde::{Deserialize, Serialize};

use super::category::Category;
use super::month::is_valid_month;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub value: f64,
    /// `YYYY-MM`
    pub month: String,
    pub category: Category,
}

impl Budget {
    pub fn display_value(&self) -> String {
        format!("${:.2}", self.value)
    }
}

/// Body of `POST /budgets`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCreate {
    pub value: f64,
    pub month: String,
    pub category_id: Option<i64>,
}

impl BudgetCreate {
    /// Mirrors the server's constraints so obviously bad input never leaves the client
    pub fn validate(&self) -> Result<(), String> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err("Budget value must be zero or more".to_string());
        }
        if !is_valid_month(&self.month) {
            return Err(format!("Month must look like YYYY-MM, got {:?}", self.month));
        }
        if self.category_id.is_none() {
            return Err("A category is required".to_string());
        }
        Ok(())
    }
}
