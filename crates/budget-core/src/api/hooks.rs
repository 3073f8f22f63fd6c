//! Per-request session hooks.
//!
//! [`ApiHooks`] is the only coupling between the HTTP client and the session:
//! one callback runs on every outbound header set, the other on every
//! unauthorized response. It is built once and shared by reference.

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::SessionStore;

type AttachFn = dyn Fn(&mut HeaderMap) + Send + Sync;
type UnauthorizedFn = dyn Fn(StatusCode) + Send + Sync;

/// Sets or clears the `Authorization` header from the session's live value.
#[derive(Clone)]
pub struct RequestAuthorizer {
    session: Arc<SessionStore>,
}

impl RequestAuthorizer {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    /// Read the credential at send time and make the header match it.
    /// No other header is touched.
    pub fn attach_credential(&self, headers: &mut HeaderMap) {
        let Some(credential) = self.session.credential() else {
            headers.remove(AUTHORIZATION);
            return;
        };

        match HeaderValue::from_str(&format!("Bearer {}", credential)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(error = %e, "Credential is not a valid header value, sending without it");
                headers.remove(AUTHORIZATION);
            }
        }
    }
}

/// Logs the session out when the server rejects its credential.
#[derive(Clone)]
pub struct UnauthorizedSignalHandler {
    session: Arc<SessionStore>,
}

impl UnauthorizedSignalHandler {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    pub fn is_unauthorized(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED
    }

    /// Inspect one response status; returns true if it triggered a logout.
    pub fn on_response(&self, status: StatusCode) -> bool {
        if !Self::is_unauthorized(status) {
            return false;
        }
        debug!(%status, "Server rejected credential, logging out");
        self.session.logout();
        true
    }
}

/// The two request/response callbacks handed to [`ApiClient`](super::ApiClient).
#[derive(Clone)]
pub struct ApiHooks {
    pub attach_credential: Arc<AttachFn>,
    pub on_unauthorized: Arc<UnauthorizedFn>,
}

impl ApiHooks {
    /// Hooks bound to a session store
    pub fn for_session(session: Arc<SessionStore>) -> Self {
        let authorizer = RequestAuthorizer::new(Arc::clone(&session));
        let handler = UnauthorizedSignalHandler::new(session);
        Self {
            attach_credential: Arc::new(move |headers: &mut HeaderMap| {
                authorizer.attach_credential(headers)
            }),
            on_unauthorized: Arc::new(move |status: StatusCode| {
                handler.on_response(status);
            }),
        }
    }

    /// Hooks that never send a credential and ignore 401s
    pub fn detached() -> Self {
        Self {
            attach_credential: Arc::new(|headers: &mut HeaderMap| {
                headers.remove(AUTHORIZATION);
            }),
            on_unauthorized: Arc::new(|_: StatusCode| {}),
        }
    }
}

impl fmt::Debug for ApiHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiHooks").finish_non_exhaustive()
    }
}
