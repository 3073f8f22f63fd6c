use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /auth/login` and `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Success envelope; `token` is only set by login
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Error envelope returned for 4xx/5xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default)]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    /// One-line summary including any per-field messages
    pub fn summary(&self) -> String {
        match self.errors {
            Some(ref errors) if !errors.is_empty() => {
                let fields: Vec<String> = errors
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect();
                format!("{} ({})", self.message, fields.join(", "))
            }
            _ => self.message.clone(),
        }
    }
}
