//! Session management for the budget client.
//!
//! This module provides:
//! - `codec`: payload decoding and expiry checks for bearer credentials
//! - `SessionStore`: the observable owner of the current session
//! - `CredentialStorage`: the persisted credential slot (file, keychain, memory)
//!
//! A persisted credential is validated once at startup; after that it only
//! changes through `login` and `logout`.

pub mod codec;
pub mod session;
pub mod storage;

pub use codec::{DecodeError, DecodedCredential};
pub use session::{Session, SessionStore, SubscriptionId};
pub use storage::{CredentialStorage, FileStorage, KeyringStorage, MemoryStorage, StorageError};
