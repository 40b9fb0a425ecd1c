//! Secret storage backends
//!
//! Secrets are kept in the platform keychain (macOS Keychain, Windows
//! Credential Manager, Secret Service on Linux). Every operation is best
//! effort: failures are logged and reported as `false` / `None` so callers
//! can keep working from memory for the rest of the process.

use std::collections::HashMap;
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;

/// Names of the secrets this client owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKey {
    AccessToken,
    RefreshToken,
}

impl SecretKey {
    /// Every secret written by this client
    pub const ALL: [SecretKey; 2] = [SecretKey::AccessToken, SecretKey::RefreshToken];

    /// Account name used for the keychain entry
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKey::AccessToken => "access_token",
            SecretKey::RefreshToken => "refresh_token",
        }
    }
}

/// Durable storage for secret values
pub trait SecretStore: Send + Sync {
    /// Insert or update a secret
    fn save(&self, key: SecretKey, value: &[u8]) -> bool;

    /// Read a secret, `None` when it does not exist or cannot be read
    fn load(&self, key: SecretKey) -> Option<Vec<u8>>;

    /// Remove a secret; removing a missing secret succeeds
    fn delete(&self, key: SecretKey) -> bool;

    /// Remove every secret this client owns
    fn clear_all(&self) -> bool {
        SecretKey::ALL
            .iter()
            .fold(true, |ok, key| self.delete(*key) && ok)
    }
}

/// Secret store backed by the OS keychain
///
/// Each key's entry is opened once and reused for the life of the store.
#[derive(Debug)]
pub struct KeyringStore {
    service: String,
    entries: Mutex<HashMap<SecretKey, Arc<Entry>>>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: SecretKey) -> Option<Arc<Entry>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            return Some(entry.clone());
        }

        match Entry::new(&self.service, key.as_str()) {
            Ok(entry) => {
                let entry = Arc::new(entry);
                entries.insert(key, entry.clone());
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(service = %self.service, key = key.as_str(), "Failed to open keychain entry: {}", e);
                None
            }
        }
    }

    /// Collapse duplicate entries left behind by an older storage policy.
    ///
    /// Reads the first readable candidate, removes every candidate and writes
    /// the secret back through the current entry.
    fn migrate(&self, key: SecretKey, candidates: Vec<Box<keyring::credential::Credential>>) -> bool {
        tracing::info!(
            service = %self.service,
            key = key.as_str(),
            candidates = candidates.len(),
            "Migrating duplicate keychain entries"
        );

        let secret = candidates.iter().find_map(|c| c.get_secret().ok());
        for candidate in &candidates {
            if let Err(e) = candidate.delete_credential() {
                if !matches!(e, keyring::Error::NoEntry) {
                    tracing::warn!(key = key.as_str(), "Failed to remove stale keychain entry: {}", e);
                }
            }
        }

        match (secret, self.entry(key)) {
            (Some(secret), Some(entry)) => entry.set_secret(&secret).is_ok(),
            _ => false,
        }
    }

    fn read(&self, key: SecretKey) -> Result<Vec<u8>, keyring::Error> {
        match self.entry(key) {
            Some(entry) => entry.get_secret(),
            None => Err(keyring::Error::NoEntry),
        }
    }
}

impl SecretStore for KeyringStore {
    fn save(&self, key: SecretKey, value: &[u8]) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };

        match entry.set_secret(value) {
            Ok(()) => {
                tracing::debug!(service = %self.service, key = key.as_str(), "Secret stored");
                true
            }
            Err(keyring::Error::Ambiguous(candidates)) => {
                // Drop the duplicates, then write the new value over the survivor
                self.migrate(key, candidates) && entry.set_secret(value).is_ok()
            }
            Err(e) => {
                tracing::warn!(service = %self.service, key = key.as_str(), "Failed to store secret: {}", e);
                false
            }
        }
    }

    fn load(&self, key: SecretKey) -> Option<Vec<u8>> {
        let retry = match self.read(key) {
            Ok(secret) => return Some(secret),
            Err(keyring::Error::NoEntry) => return None,
            Err(keyring::Error::Ambiguous(candidates)) => self.migrate(key, candidates),
            Err(keyring::Error::NoStorageAccess(e)) | Err(keyring::Error::PlatformFailure(e)) => {
                tracing::debug!(key = key.as_str(), "Keychain read failed, retrying once: {}", e);
                true
            }
            Err(e) => {
                tracing::warn!(service = %self.service, key = key.as_str(), "Failed to read secret: {}", e);
                false
            }
        };

        if !retry {
            return None;
        }

        match self.read(key) {
            Ok(secret) => Some(secret),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!(service = %self.service, key = key.as_str(), "Failed to read secret after retry: {}", e);
                None
            }
        }
    }

    fn delete(&self, key: SecretKey) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::Ambiguous(candidates)) => candidates
                .iter()
                .all(|c| matches!(c.delete_credential(), Ok(()) | Err(keyring::Error::NoEntry))),
            Err(e) => {
                tracing::warn!(service = %self.service, key = key.as_str(), "Failed to delete secret: {}", e);
                false
            }
        }
    }
}

/// Process-local secret store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<SecretKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn save(&self, key: SecretKey, value: &[u8]) -> bool {
        self.secrets.lock().insert(key, value.to_vec());
        true
    }

    fn load(&self, key: SecretKey) -> Option<Vec<u8>> {
        self.secrets.lock().get(&key).cloned()
    }

    fn delete(&self, key: SecretKey) -> bool {
        self.secrets.lock().remove(&key);
        true
    }

    fn clear_all(&self) -> bool {
        self.secrets.lock().clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let secret = b"\x00binary\xffsecret".to_vec();

        assert!(store.save(SecretKey::AccessToken, &secret));
        assert_eq!(store.load(SecretKey::AccessToken), Some(secret));
        assert_eq!(store.load(SecretKey::RefreshToken), None);
    }

    #[test]
    fn test_memory_store_upsert() {
        let store = MemoryStore::new();
        assert!(store.save(SecretKey::RefreshToken, b"first"));
        assert!(store.save(SecretKey::RefreshToken, b"second"));
        assert_eq!(store.load(SecretKey::RefreshToken), Some(b"second".to_vec()));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.delete(SecretKey::AccessToken));
        assert!(store.save(SecretKey::AccessToken, b"token"));
        assert!(store.delete(SecretKey::AccessToken));
        assert!(store.delete(SecretKey::AccessToken));
        assert_eq!(store.load(SecretKey::AccessToken), None);
    }

    #[test]
    fn test_clear_all() {
        let store = MemoryStore::new();
        store.save(SecretKey::AccessToken, b"a");
        store.save(SecretKey::RefreshToken, b"r");
        assert!(store.clear_all());
        assert!(store.is_empty());
    }

    const SERVICE: &str = "marquee-test";

    fn mock_credential(key: SecretKey) -> Box<keyring::credential::Credential> {
        keyring::mock::default_credential_builder()
            .build(None, SERVICE, key.as_str())
            .unwrap()
    }

    /// Keychain store whose entries live in process memory
    fn mock_keyring() -> KeyringStore {
        let store = KeyringStore::new(SERVICE);
        {
            let mut entries = store.entries.lock();
            for key in SecretKey::ALL {
                entries.insert(key, Arc::new(Entry::new_with_credential(mock_credential(key))));
            }
        }
        store
    }

    /// Make the next keychain call for `key` fail with `error`
    fn fail_next(store: &KeyringStore, key: SecretKey, error: keyring::Error) {
        let entry = store.entry(key).unwrap();
        let mock: &keyring::mock::MockCredential = entry.get_credential().downcast_ref().unwrap();
        mock.set_error(error);
    }

    fn platform_failure() -> keyring::Error {
        keyring::Error::PlatformFailure(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "locked")))
    }

    #[test]
    fn test_keyring_round_trip() {
        let store = mock_keyring();

        assert_eq!(store.load(SecretKey::AccessToken), None);
        assert!(store.save(SecretKey::AccessToken, b"first"));
        assert!(store.save(SecretKey::AccessToken, b"second"));
        assert_eq!(store.load(SecretKey::AccessToken), Some(b"second".to_vec()));
        assert_eq!(store.load(SecretKey::RefreshToken), None);
    }

    #[test]
    fn test_keyring_delete_and_clear_all() {
        let store = mock_keyring();

        assert!(store.delete(SecretKey::AccessToken));
        store.save(SecretKey::AccessToken, b"a");
        store.save(SecretKey::RefreshToken, b"r");
        assert!(store.delete(SecretKey::AccessToken));
        assert_eq!(store.load(SecretKey::AccessToken), None);

        assert!(store.clear_all());
        assert_eq!(store.load(SecretKey::RefreshToken), None);
        assert!(store.clear_all());
    }

    #[test]
    fn test_keyring_delete_failure() {
        let store = mock_keyring();
        store.save(SecretKey::AccessToken, b"a");

        fail_next(&store, SecretKey::AccessToken, platform_failure());
        assert!(!store.delete(SecretKey::AccessToken));
        assert_eq!(store.load(SecretKey::AccessToken), Some(b"a".to_vec()));
    }

    #[test]
    fn test_keyring_load_retries_platform_failure_once() {
        let store = mock_keyring();
        store.save(SecretKey::RefreshToken, b"token");

        fail_next(&store, SecretKey::RefreshToken, platform_failure());
        assert_eq!(store.load(SecretKey::RefreshToken), Some(b"token".to_vec()));
    }

    #[test]
    fn test_keyring_load_does_not_retry_other_errors() {
        let store = mock_keyring();
        store.save(SecretKey::RefreshToken, b"token");

        fail_next(&store, SecretKey::RefreshToken, keyring::Error::BadEncoding(vec![0xff]));
        assert_eq!(store.load(SecretKey::RefreshToken), None);
        assert_eq!(store.load(SecretKey::RefreshToken), Some(b"token".to_vec()));
    }

    #[test]
    fn test_keyring_load_migrates_duplicate_entries() {
        let store = mock_keyring();
        let legacy = mock_credential(SecretKey::AccessToken);
        legacy.set_secret(b"legacy").unwrap();
        let empty = mock_credential(SecretKey::AccessToken);

        fail_next(&store, SecretKey::AccessToken, keyring::Error::Ambiguous(vec![legacy, empty]));
        assert_eq!(store.load(SecretKey::AccessToken), Some(b"legacy".to_vec()));
        // The surviving entry now holds the secret on its own
        assert_eq!(store.load(SecretKey::AccessToken), Some(b"legacy".to_vec()));
    }

    #[test]
    fn test_keyring_save_over_duplicate_entries() {
        let store = mock_keyring();
        let legacy = mock_credential(SecretKey::AccessToken);
        legacy.set_secret(b"legacy").unwrap();

        fail_next(&store, SecretKey::AccessToken, keyring::Error::Ambiguous(vec![legacy]));
        assert!(store.save(SecretKey::AccessToken, b"fresh"));
        assert_eq!(store.load(SecretKey::AccessToken), Some(b"fresh".to_vec()));
    }

    #[test]
    fn test_key_names_are_distinct() {
        assert_ne!(SecretKey::AccessToken.as_str(), SecretKey::RefreshToken.as_str());
    }
}
