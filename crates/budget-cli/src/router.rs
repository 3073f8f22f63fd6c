//! History-based navigation between pages.

use std::sync::{Mutex, MutexGuard};

use budget_core::gate::LOGIN_PATH;
use budget_core::Navigator;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    MonthBudgets(String),
    NewBudget,
    NewCategory,
    NotFound(String),
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Login,
            ["dashboard"] => Route::Dashboard,
            ["budgets", "new"] => Route::NewBudget,
            ["budgets", month] => Route::MonthBudgets(month.to_string()),
            ["categories", "new"] => Route::NewCategory,
            _ => Route::NotFound(path.to_string()),
        }
    }

    /// Everything but the login page sits behind an access gate
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login)
    }
}

/// Stack of visited paths; the last entry is the current location.
pub struct Router {
    history: Mutex<Vec<String>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(vec![LOGIN_PATH.to_string()]),
        }
    }

    fn history(&self) -> MutexGuard<'_, Vec<String>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> String {
        self.history()
            .last()
            .cloned()
            .unwrap_or_else(|| LOGIN_PATH.to_string())
    }

    pub fn route(&self) -> Route {
        Route::parse(&self.current())
    }

    pub fn push(&self, path: &str) {
        debug!(path, "Navigate");
        self.history().push(path.to_string());
    }

    /// Go back one entry; the first entry is never popped
    pub fn back(&self) -> bool {
        let mut history = self.history();
        if history.len() > 1 {
            history.pop();
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.history().len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for Router {
    fn replace(&self, path: &str) {
        debug!(path, "Replace location");
        let mut history = self.history();
        match history.last_mut() {
            Some(top) => *top = path.to_string(),
            None => history.push(path.to_string()),
        }
    }
}
