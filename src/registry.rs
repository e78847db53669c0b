//! Authorization registry
//!
//! Records which local applications (by uid) may obtain auth tokens, plus an
//! append-only log of every package ever granted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{KeyValueStore, StorageError};

/// Key holding the append-only list of granted packages.
pub const PACKAGE_LIST_KEY: &str = "packageList";

const UID_KEY_PREFIX: &str = "appuid";

/// Host-assigned identity of a locally installed application.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Principal(pub u32);

impl Principal {
    /// Store key holding the package granted to this uid.
    pub fn storage_key(&self) -> String {
        format!("{}{}", UID_KEY_PREFIX, self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Principal {
    fn from(uid: u32) -> Self {
        Principal(uid)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(#[from] StorageError),
}

impl RegistryError {
    pub fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::RegistryUnavailable
    }
}

/// Grants are permanent: there is no revoke path.
pub struct AuthorizationRegistry {
    store: Arc<dyn KeyValueStore>,
    // Serializes the read-append-write cycle on the package list
    log_lock: Mutex<()>,
}

impl AuthorizationRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            log_lock: Mutex::new(()),
        }
    }

    /// Record that `uid` may request tokens on behalf of `package`.
    ///
    /// The uid mapping is last-write-wins; the package is always appended to
    /// the grant log, even if it is already there.
    ///
    /// The log is written before the mapping, so a failed grant never leaves
    /// the uid authorized.
    pub fn grant(&self, uid: Principal, package: &str) -> Result<(), RegistryError> {
        info!("Granting token access: uid={} package={}", uid, package);

        let _guard = self.log_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut packages = self.store.get_list(PACKAGE_LIST_KEY)?.unwrap_or_default();
        packages.push(package.to_string());
        self.store.put_list(PACKAGE_LIST_KEY, &packages)?;
        debug!("Grant log now holds {} entries", packages.len());

        self.store.put_value(&uid.storage_key(), package)?;
        Ok(())
    }

    /// Whether `uid` currently holds a grant. Read failures deny access.
    pub fn is_authorized(&self, uid: Principal) -> bool {
        self.granted_package(uid).is_some()
    }

    /// Package recorded for `uid`, if any. Read failures read as absent.
    pub fn granted_package(&self, uid: Principal) -> Option<String> {
        match self.store.get_value(&uid.storage_key()) {
            Ok(Some(package)) if !package.is_empty() => Some(package),
            Ok(_) => None,
            Err(e) => {
                warn!("Grant lookup for uid {} failed, denying: {}", uid, e);
                None
            }
        }
    }

    /// Every package ever granted, in grant order, duplicates included.
    pub fn granted_packages(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.get_list(PACKAGE_LIST_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// Store whose reads and writes can be switched off.
    struct FlakyStore {
        inner: MemoryStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        fail_list_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                fail_list_writes: AtomicBool::new(false),
            }
        }

        fn check(&self, flag: &AtomicBool) -> Result<(), StorageError> {
            if flag.load(Ordering::SeqCst) {
                Err(StorageError::Backend("disk unplugged".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.check(&self.fail_reads)?;
            self.inner.get_value(key)
        }
        fn put_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check(&self.fail_writes)?;
            self.inner.put_value(key, value)
        }
        fn get_list(&self, key: &str) -> Result<Option<Vec<String>>, StorageError> {
            self.check(&self.fail_reads)?;
            self.inner.get_list(key)
        }
        fn put_list(&self, key: &str, values: &[String]) -> Result<(), StorageError> {
            self.check(&self.fail_writes)?;
            self.check(&self.fail_list_writes)?;
            self.inner.put_list(key, values)
        }
    }

    fn registry() -> AuthorizationRegistry {
        AuthorizationRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_ungranted_uid_is_not_authorized() {
        let registry = registry();
        for uid in [0, 1, 5, 10_042, u32::MAX] {
            assert!(!registry.is_authorized(Principal(uid)));
        }
    }

    #[test]
    fn test_grant_authorizes_uid() {
        let registry = registry();
        registry.grant(Principal(10_042), "org.example.mail").unwrap();

        assert!(registry.is_authorized(Principal(10_042)));
        assert!(!registry.is_authorized(Principal(10_043)));
        assert_eq!(
            registry.granted_package(Principal(10_042)).as_deref(),
            Some("org.example.mail")
        );
    }

    #[test]
    fn test_repeated_grant_duplicates_log_entry() {
        let registry = registry();
        registry.grant(Principal(5), "com.x").unwrap();
        registry.grant(Principal(5), "com.x").unwrap();

        assert!(registry.is_authorized(Principal(5)));
        assert_eq!(registry.granted_packages().unwrap(), vec!["com.x", "com.x"]);
    }

    #[test]
    fn test_regrant_overwrites_mapping_but_keeps_log() {
        let registry = registry();
        registry.grant(Principal(5), "com.old").unwrap();
        registry.grant(Principal(5), "com.new").unwrap();

        assert_eq!(registry.granted_package(Principal(5)).as_deref(), Some("com.new"));
        assert_eq!(registry.granted_packages().unwrap(), vec!["com.old", "com.new"]);
    }

    #[test]
    fn test_uses_legacy_key_shapes() {
        let store = Arc::new(MemoryStore::new());
        let registry = AuthorizationRegistry::new(store.clone());
        registry.grant(Principal(12), "com.y").unwrap();

        assert_eq!(store.get_value("appuid12").unwrap().as_deref(), Some("com.y"));
        assert_eq!(store.get_list("packageList").unwrap(), Some(vec!["com.y".to_string()]));
    }

    #[test]
    fn test_empty_value_is_not_a_grant() {
        let store = Arc::new(MemoryStore::new());
        store.put_value("appuid3", "").unwrap();
        let registry = AuthorizationRegistry::new(store);

        assert!(!registry.is_authorized(Principal(3)));
    }

    #[test]
    fn test_read_failure_fails_closed() {
        let store = Arc::new(FlakyStore::new());
        let registry = AuthorizationRegistry::new(store.clone());
        registry.grant(Principal(9), "com.z").unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(!registry.is_authorized(Principal(9)));
        assert!(registry.granted_packages().is_err());

        store.fail_reads.store(false, Ordering::SeqCst);
        assert!(registry.is_authorized(Principal(9)));
    }

    #[test]
    fn test_write_failure_surfaces_registry_unavailable() {
        let store = Arc::new(FlakyStore::new());
        store.fail_writes.store(true, Ordering::SeqCst);
        let registry = AuthorizationRegistry::new(store);

        let err = registry.grant(Principal(9), "com.z").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RegistryUnavailable);
        assert!(!registry.is_authorized(Principal(9)));
    }

    #[test]
    fn test_failed_log_append_leaves_uid_unauthorized() {
        let store = Arc::new(FlakyStore::new());
        store.fail_list_writes.store(true, Ordering::SeqCst);
        let registry = AuthorizationRegistry::new(store.clone());

        let err = registry.grant(Principal(9), "com.z").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RegistryUnavailable);
        assert!(!registry.is_authorized(Principal(9)));
        assert_eq!(store.inner.get_value("appuid9").unwrap(), None);
    }

    #[test]
    fn test_failed_regrant_keeps_previous_package() {
        let store = Arc::new(FlakyStore::new());
        let registry = AuthorizationRegistry::new(store.clone());
        registry.grant(Principal(9), "com.old").unwrap();

        store.fail_list_writes.store(true, Ordering::SeqCst);
        assert!(registry.grant(Principal(9), "com.new").is_err());
        assert_eq!(registry.granted_package(Principal(9)).as_deref(), Some("com.old"));
        assert_eq!(registry.granted_packages().unwrap(), vec!["com.old"]);
    }

    #[test]
    fn test_concurrent_grants_for_one_uid() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..25u32 {
                        registry
                            .grant(Principal(77), &format!("pkg.{}.{}", worker, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = registry.granted_packages().unwrap();
        assert_eq!(log.len(), 200);
        assert_eq!(registry.granted_package(Principal(77)).as_ref(), log.last());
    }

    #[test]
    fn test_concurrent_grants_lose_no_log_entries() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..25u32 {
                        registry
                            .grant(Principal(worker * 100 + i), &format!("pkg.{}.{}", worker, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.granted_packages().unwrap().len(), 200);
        assert!(registry.is_authorized(Principal(724)));
    }
}
