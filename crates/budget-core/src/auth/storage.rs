use std::path::PathBuf;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

/// Keyring service name for the credential slot
const SERVICE_NAME: &str = "budget-tool";

/// Name of the single slot holding the raw credential
pub const CREDENTIAL_SLOT: &str = "credential";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),

    #[error("Credential storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<keyring::Error> for StorageError {
    fn from(err: keyring::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// A single named string slot that survives process restarts.
pub trait CredentialStorage: Send + Sync {
    fn read(&self) -> Result<Option<String>, StorageError>;
    fn write(&self, value: &str) -> Result<(), StorageError>;
    /// Deleting an empty slot is not an error
    fn delete(&self) -> Result<(), StorageError>;
}

impl<T: CredentialStorage + ?Sized> CredentialStorage for std::sync::Arc<T> {
    fn read(&self) -> Result<Option<String>, StorageError> {
        (**self).read()
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        (**self).write(value)
    }

    fn delete(&self) -> Result<(), StorageError> {
        (**self).delete()
    }
}

/// Slot stored as a plain file in the data directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join(CREDENTIAL_SLOT),
        }
    }
}

impl CredentialStorage for FileStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let value = contents.trim();
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, value)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Slot stored in the OS keychain.
pub struct KeyringStorage {
    slot: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self {
            slot: CREDENTIAL_SLOT.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Ok(Entry::new(SERVICE_NAME, &self.slot)?)
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStorage for KeyringStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        self.entry()?.set_password(value)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), StorageError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!("No keychain entry to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local slot. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: &str) -> Self {
        Self {
            slot: Mutex::new(Some(value.to_string())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, StorageError> {
        self.slot
            .lock()
            .map_err(|_| StorageError::Unavailable("memory slot poisoned".to_string()))
    }
}

impl CredentialStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.clone())
    }

    fn write(&self, value: &str) -> Result<(), StorageError> {
        *self.lock()? = Some(value.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), StorageError> {
        *self.lock()? = None;
        Ok(())
    }
}
