//! Wire models for the budget API.
//!
//! - `Budget`, `BudgetCreate`: a budgeted amount for one category in one month
//! - `Category`, `CategoryCreate`, `TransactionType`: spending/income categories
//! - `Month`: a year-month that has budgets, with its display label
//! - `LoginRequest`, `AuthResponse`, `ErrorResponse`: auth and error envelopes

pub mod auth;
pub mod budget;
pub mod category;
pub mod month;

pub use auth::{AuthResponse, ErrorResponse, LoginRequest};
pub use budget::{Budget, BudgetCreate};
pub use category::{Category, CategoryCreate, TransactionType};
pub use month::{format_month, is_valid_month, Month};
