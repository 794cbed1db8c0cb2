//! Device-local secret storage.
//!
//! The OS keychain backend uses the `keyring` crate with the service name
//! "app.barakah". [`MemorySecureStorage`] keeps values in process memory.

use dashmap::DashMap;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SecureStorageError {
    #[error("secure storage not available on this system")]
    NotAvailable,
    #[error("secure storage error: {0}")]
    Backend(String),
}

/// Key/value storage for credentials. Writes replace the whole value.
pub trait SecureStorage: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError>;

    /// `None` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError>;

    /// No-op when nothing is stored under `key`.
    fn delete(&self, key: &str) -> Result<(), SecureStorageError>;
}

#[cfg(feature = "keychain")]
pub use keychain::KeychainStorage;

#[cfg(feature = "keychain")]
mod keychain {
    use super::*;

    const SERVICE_NAME: &str = "app.barakah";

    impl From<keyring::Error> for SecureStorageError {
        fn from(err: keyring::Error) -> Self {
            match err {
                keyring::Error::NoStorageAccess(_) => SecureStorageError::NotAvailable,
                keyring::Error::PlatformFailure(_) => SecureStorageError::NotAvailable,
                _ => SecureStorageError::Backend(err.to_string()),
            }
        }
    }

    /// OS keychain (Keychain, Credential Manager, Secret Service).
    #[derive(Clone, Copy, Debug, Default)]
    pub struct KeychainStorage;

    impl KeychainStorage {
        pub fn is_available() -> bool {
            keyring::Entry::new(SERVICE_NAME, "availability_test").is_ok()
        }
    }

    impl SecureStorage for KeychainStorage {
        fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
            let entry = keyring::Entry::new(SERVICE_NAME, key)?;
            entry.set_password(value)?;
            Ok(())
        }

        fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError> {
            let entry = keyring::Entry::new(SERVICE_NAME, key)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(Zeroizing::new(value))),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
            let entry = keyring::Entry::new(SERVICE_NAME, key)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        #[ignore = "requires system keychain"]
        fn test_keychain_roundtrip() {
            let storage = KeychainStorage;
            let key = "barakah-test-roundtrip";
            storage.set(key, "secret").unwrap();
            assert_eq!(storage.get(key).unwrap().as_deref().map(String::as_str), Some("secret"));
            storage.delete(key).unwrap();
            assert!(storage.get(key).unwrap().is_none());
        }
    }
}

/// In-process storage for tests and headless runs.
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: DashMap<String, Zeroizing<String>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecureStorage for MemorySecureStorage {
    fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        self.entries
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        self.entries.remove(key);
        Ok(())
    }
}
