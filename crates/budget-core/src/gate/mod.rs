//! Route guard for protected views.
//!
//! The gate's decision is a pure function of `(ready, credential)`. An
//! [`AccessGate`] re-runs it on every session transition, so a logout that
//! happens while a protected view is showing redirects on the same update.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::auth::{Session, SessionStore, SubscriptionId};

/// Path of the login entry point
pub const LOGIN_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Session not validated yet; render nothing
    Pending,
    /// Render the protected content
    Authorized,
    /// Redirect to login
    Unauthorized,
}

impl GateState {
    pub fn from_parts(ready: bool, credential: Option<&str>) -> Self {
        match (ready, credential) {
            (false, _) => GateState::Pending,
            (true, Some(_)) => GateState::Authorized,
            (true, None) => GateState::Unauthorized,
        }
    }
}

/// Decide what a protected route shows for a session
pub fn decide(session: &Session) -> GateState {
    GateState::from_parts(session.ready, session.credential.as_deref())
}

/// Redirect primitive supplied by the host.
pub trait Navigator: Send + Sync {
    /// Replace the current location with `path`; no new history entry.
    fn replace(&self, path: &str);
}

struct GateShared {
    state: Mutex<GateState>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl GateShared {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, session: &Session) {
        let next = decide(session);
        let previous = std::mem::replace(&mut *self.state(), next);
        if previous != next {
            debug!(?previous, ?next, "Access gate transition");
        }

        if next == GateState::Unauthorized && previous != GateState::Unauthorized {
            info!(path = %self.login_path, "No session, redirecting to login");
            self.navigator.replace(&self.login_path);
        }
    }
}

/// A mounted guard around one protected view.
///
/// Unmounting (dropping) the gate stops it from reacting to the session.
pub struct AccessGate {
    session: Arc<SessionStore>,
    shared: Arc<GateShared>,
    subscription: SubscriptionId,
}

impl AccessGate {
    /// Mount a gate that redirects to [`LOGIN_PATH`]
    pub fn mount(session: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self::mount_with_login(session, navigator, LOGIN_PATH)
    }

    pub fn mount_with_login(
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        login_path: &str,
    ) -> Self {
        let shared = Arc::new(GateShared {
            state: Mutex::new(GateState::Pending),
            navigator,
            login_path: login_path.to_string(),
        });

        let observer = Arc::clone(&shared);
        let subscription = session.subscribe(move |s: &Session| observer.apply(s));
        shared.apply(&session.snapshot());

        Self {
            session,
            shared,
            subscription,
        }
    }

    pub fn state(&self) -> GateState {
        *self.shared.state()
    }

    /// Produce the protected content only while authorized
    pub fn render<T>(&self, content: impl FnOnce() -> T) -> Option<T> {
        match self.state() {
            GateState::Authorized => Some(content()),
            GateState::Pending | GateState::Unauthorized => None,
        }
    }
}

impl Drop for AccessGate {
    fn drop(&mut self) {
        self.session.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UnauthorizedSignalHandler;
    use crate::auth::codec::tests::token_for;
    use crate::auth::MemoryStorage;
    use reqwest::StatusCode;

    const NOW_MS: i64 = 1_750_000_000_000;

    #[derive(Default)]
    struct RecordingNavigator {
        replaced: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn redirects(&self) -> Vec<String> {
            self.replaced.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn replace(&self, path: &str) {
            self.replaced.lock().unwrap().push(path.to_string());
        }
    }

    fn fixture(persisted: Option<&str>) -> (Arc<SessionStore>, Arc<RecordingNavigator>) {
        let storage = match persisted {
            Some(value) => MemoryStorage::with_value(value),
            None => MemoryStorage::new(),
        };
        (
            Arc::new(SessionStore::new(storage)),
            Arc::new(RecordingNavigator::default()),
        )
    }

    fn valid_token() -> String {
        token_for("amy", NOW_MS / 1000 + 3600)
    }

    #[test]
    fn test_decide() {
        assert_eq!(GateState::from_parts(false, None), GateState::Pending);
        assert_eq!(GateState::from_parts(false, Some("x")), GateState::Pending);
        assert_eq!(GateState::from_parts(true, Some("x")), GateState::Authorized);
        assert_eq!(GateState::from_parts(true, None), GateState::Unauthorized);
    }

    #[test]
    fn test_pending_renders_nothing() {
        let (store, nav) = fixture(Some(&valid_token()));
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());

        assert_eq!(gate.state(), GateState::Pending);
        assert_eq!(gate.render(|| "budgets"), None);
        assert!(nav.redirects().is_empty());
    }

    #[test]
    fn test_authorized_after_init_renders_content() {
        let (store, nav) = fixture(Some(&valid_token()));
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());

        store.init_at(NOW_MS);

        assert_eq!(gate.state(), GateState::Authorized);
        assert_eq!(gate.render(|| "budgets"), Some("budgets"));
        assert!(nav.redirects().is_empty());
    }

    #[test]
    fn test_no_session_redirects_once() {
        let (store, nav) = fixture(None);
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());

        store.init_at(NOW_MS);
        store.logout();

        assert_eq!(gate.state(), GateState::Unauthorized);
        assert_eq!(gate.render(|| "budgets"), None);
        assert_eq!(nav.redirects(), vec![LOGIN_PATH.to_string()]);
    }

    #[test]
    fn test_mount_after_init_decides_immediately() {
        let (store, nav) = fixture(None);
        store.init_at(NOW_MS);

        let gate = AccessGate::mount_with_login(Arc::clone(&store), nav.clone(), "/login");

        assert_eq!(gate.state(), GateState::Unauthorized);
        assert_eq!(nav.redirects(), vec!["/login".to_string()]);
    }

    #[test]
    fn test_unauthorized_response_redirects_mounted_view() {
        let (store, nav) = fixture(Some(&valid_token()));
        store.init_at(NOW_MS);
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());
        assert_eq!(gate.state(), GateState::Authorized);

        // An unrelated call comes back 401
        UnauthorizedSignalHandler::new(Arc::clone(&store)).on_response(StatusCode::UNAUTHORIZED);

        assert_eq!(gate.state(), GateState::Unauthorized);
        assert_eq!(nav.redirects(), vec![LOGIN_PATH.to_string()]);
    }

    #[test]
    fn test_login_after_redirect_authorizes_again() {
        let (store, nav) = fixture(None);
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());
        store.init_at(NOW_MS);

        store.login(&valid_token());
        assert_eq!(gate.state(), GateState::Authorized);

        store.logout();
        assert_eq!(nav.redirects().len(), 2);
    }

    #[test]
    fn test_unmounted_gate_stops_reacting() {
        let (store, nav) = fixture(Some(&valid_token()));
        store.init_at(NOW_MS);
        let gate = AccessGate::mount(Arc::clone(&store), nav.clone());
        drop(gate);

        store.logout();
        assert!(nav.redirects().is_empty());
    }
}
