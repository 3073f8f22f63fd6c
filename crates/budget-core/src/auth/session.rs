use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::codec;
use super::storage::{CredentialStorage, StorageError};

/// Handle returned by [`SessionStore::subscribe`]
pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&Session) + Send + Sync>;

/// In-process view of the current credential.
///
/// `ready` flips to true once the persisted credential has been checked and
/// never flips back. Until then `credential` carries no meaning.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub credential: Option<String>,
    pub ready: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.ready && self.credential.is_some()
    }
}

// The credential is a bearer secret and must not end up in logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("ready", &self.ready)
            .finish()
    }
}

struct StoreState {
    session: Session,
    durable: bool,
}

/// Sole owner of the [`Session`].
///
/// Persists the credential through a [`CredentialStorage`] slot, and tells
/// subscribers about every transition. Share it behind an `Arc`.
pub struct SessionStore {
    storage: Box<dyn CredentialStorage>,
    state: RwLock<StoreState>,
    // Serializes init/login/logout so storage and memory change together
    writer: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    init_started: AtomicBool,
}

impl SessionStore {
    pub fn new(storage: impl CredentialStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            state: RwLock::new(StoreState {
                session: Session::default(),
                durable: true,
            }),
            writer: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            init_started: AtomicBool::new(false),
        }
    }

    /// Load and validate the persisted credential against the current time.
    pub fn init(&self) {
        self.init_at(Utc::now().timestamp_millis());
    }

    /// Load and validate the persisted credential as of `now_epoch_ms`.
    ///
    /// Never fails: unreadable, malformed or expired credentials all end as
    /// "no session". Only the first call on a store does anything.
    pub fn init_at(&self, now_epoch_ms: i64) {
        if self.init_started.swap(true, Ordering::SeqCst) {
            debug!("Session store already initialized");
            return;
        }

        let snapshot = {
            let _writer = self.writer();
            let credential = self.load_persisted(now_epoch_ms);

            let mut state = self.state_mut();
            state.session.credential = credential;
            state.session.ready = true;
            state.session.clone()
        };

        debug!(session = ?snapshot, "Session store ready");
        self.notify(&snapshot);
    }

    /// Establish a session with a credential the server just issued.
    ///
    /// Storage is written before memory, so a failure in between leaves the
    /// process without a session rather than with one storage doesn't know.
    ///
    /// A blank credential is refused and leaves the session as it was.
    pub fn login(&self, raw_credential: &str) {
        let raw_credential = raw_credential.trim();
        if raw_credential.is_empty() {
            warn!("Refusing to log in with a blank credential");
            return;
        }

        let snapshot = {
            let _writer = self.writer();

            if self.is_durable() {
                if let Err(e) = self.storage.write(raw_credential) {
                    self.degrade(&e);
                }
            }

            let mut state = self.state_mut();
            if state.session.credential.as_deref() == Some(raw_credential) {
                debug!("Login with the current credential, nothing to do");
                return;
            }
            state.session.credential = Some(raw_credential.to_string());
            state.session.clone()
        };

        info!(subject = ?codec::decode(raw_credential).ok().map(|d| d.subject), "Logged in");
        self.notify(&snapshot);
    }

    /// Drop the current session. Calling this without a session is a no-op.
    pub fn logout(&self) {
        let snapshot = {
            let _writer = self.writer();

            if self.state().session.credential.is_none() {
                debug!("Logout without a session, nothing to do");
                return;
            }

            // Still try the slot when degraded; an earlier session may be on it
            match self.storage.delete() {
                Ok(()) => {}
                Err(e) if self.is_durable() => self.degrade(&e),
                Err(e) => debug!(error = %e, "Clearing degraded storage failed"),
            }

            let mut state = self.state_mut();
            state.session.credential = None;
            state.session.clone()
        };

        info!("Logged out");
        self.notify(&snapshot);
    }

    /// Register a callback fired with the new session after every transition.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers().retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn snapshot(&self) -> Session {
        self.state().session.clone()
    }

    /// The credential as of right now
    pub fn credential(&self) -> Option<String> {
        self.state().session.credential.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state().session.ready
    }

    /// False once storage has failed and the session lives in memory only
    pub fn is_durable(&self) -> bool {
        self.state().durable
    }

    /// Subject of the current credential, for display
    pub fn subject(&self) -> Option<String> {
        let credential = self.credential()?;
        codec::decode(&credential).ok().map(|d| d.subject)
    }

    fn load_persisted(&self, now_epoch_ms: i64) -> Option<String> {
        let raw = match self.storage.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted credential");
                return None;
            }
            Err(e) => {
                self.degrade(&e);
                return None;
            }
        };

        match codec::decode(&raw) {
            Ok(decoded) if codec::is_expired(&decoded, now_epoch_ms) => {
                info!(subject = %decoded.subject, "Persisted credential expired");
                self.purge();
                None
            }
            Ok(decoded) => {
                info!(subject = %decoded.subject, "Restored persisted session");
                Some(raw)
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed persisted credential");
                self.purge();
                None
            }
        }
    }

    fn purge(&self) {
        if let Err(e) = self.storage.delete() {
            self.degrade(&e);
        }
    }

    fn degrade(&self, err: &StorageError) {
        let mut state = self.state_mut();
        if state.durable {
            warn!(error = %err, "Credential storage failed, keeping session in memory only");
            state.durable = false;
        }
    }

    fn notify(&self, session: &Session) {
        // Callbacks run outside the lock so they may call back into the store
        let subscribers: Vec<Subscriber> = self
            .subscribers()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            callback(session);
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
