//! REST API client module for the budget service.
//!
//! This module provides the `ApiClient` for talking to the budget API and
//! the `ApiHooks` that tie every request to the current session.
//!
//! The API uses bearer credential authentication obtained from
//! `POST /auth/login`.

pub mod client;
pub mod error;
pub mod hooks;

pub use client::ApiClient;
pub use error::ApiError;
pub use hooks::{ApiHooks, RequestAuthorizer, UnauthorizedSignalHandler};
