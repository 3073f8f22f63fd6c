//! Core library for the budget tool client.
//!
//! The interesting part of this crate is session handling: a single
//! observable [`SessionStore`](auth::SessionStore) owns the bearer credential,
//! request hooks read it on every outbound call, a 401 from the server logs
//! the session out, and the [`AccessGate`](gate::AccessGate) turns session
//! state into a render or redirect decision.
//!
//! Everything else is a thin REST client over the budget API.

pub mod api;
pub mod auth;
pub mod gate;
pub mod models;

pub use api::{ApiClient, ApiError, ApiHooks};
pub use auth::{CredentialStorage, Session, SessionStore};
pub use gate::{AccessGate, GateState, Navigator};
