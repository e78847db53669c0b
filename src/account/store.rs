//! Account storage and management
//!
//! Stand-in for the host platform's account subsystem: named accounts and the
//! auth tokens cached for them, keyed by token type.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

use super::types::WikiAccount;
use crate::storage::{KeyValueStore, StorageError};

const ACCOUNT_INDEX_KEY: &str = "accountList";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountStoreError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("corrupt account record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
    #[error("account table lock poisoned")]
    Poisoned,
}

/// What the credential flow and the token broker need from the host account
/// subsystem.
pub trait AccountSubsystem: Send + Sync {
    fn find_account(&self, name: &str, account_type: &str) -> Option<WikiAccount>;

    /// Returns `false` when the account already existed.
    fn add_account(&self, name: &str, account_type: &str) -> Result<bool, AccountStoreError>;

    fn set_auth_token(
        &self,
        name: &str,
        account_type: &str,
        token_type: &str,
        token: &str,
    ) -> Result<(), AccountStoreError>;

    fn peek_auth_token(&self, name: &str, account_type: &str, token_type: &str) -> Option<String> {
        self.find_account(name, account_type)
            .and_then(|account| account.auth_token(token_type).map(str::to_string))
    }
}

fn account_key(name: &str, account_type: &str) -> String {
    format!("account:{}:{}", account_type, name)
}

/// Account store for managing all accounts
pub struct AccountStore {
    accounts: RwLock<HashMap<String, WikiAccount>>,
    server_url: String,
    storage: Option<Arc<dyn KeyValueStore>>,
}

impl AccountStore {
    /// Create a new empty, volatile account store
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            server_url: server_url.into(),
            storage: None,
        }
    }

    /// Open a store persisted in `storage`, loading every indexed account.
    pub fn with_storage(
        storage: Arc<dyn KeyValueStore>,
        server_url: impl Into<String>,
    ) -> Result<Self, AccountStoreError> {
        let mut accounts = HashMap::new();
        for key in storage.get_list(ACCOUNT_INDEX_KEY)?.unwrap_or_default() {
            let Some(raw) = storage.get_value(&key)? else {
                continue;
            };
            let account: WikiAccount =
                serde_json::from_str(&raw).map_err(|e| AccountStoreError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            accounts.insert(key, account);
        }
        debug!("Loaded {} accounts from storage", accounts.len());

        Ok(Self {
            accounts: RwLock::new(accounts),
            server_url: server_url.into(),
            storage: Some(storage),
        })
    }

    /// Get all accounts
    pub fn all_accounts(&self) -> Vec<WikiAccount> {
        self.read()
            .map(|accounts| accounts.values().cloned().collect())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, WikiAccount>>, AccountStoreError> {
        self.accounts.read().map_err(|_| AccountStoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, WikiAccount>>, AccountStoreError> {
        self.accounts.write().map_err(|_| AccountStoreError::Poisoned)
    }

    fn persist(&self, key: &str, account: &WikiAccount) -> Result<(), AccountStoreError> {
        if let Some(storage) = &self.storage {
            let raw = serde_json::to_string(account).map_err(|e| AccountStoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            storage.put_value(key, &raw)?;
        }
        Ok(())
    }

    fn update<F>(&self, name: &str, account_type: &str, change: F) -> Result<(), AccountStoreError>
    where
        F: FnOnce(&mut WikiAccount),
    {
        let key = account_key(name, account_type);
        let mut accounts = self.write()?;
        let account = accounts
            .get_mut(&key)
            .ok_or_else(|| AccountStoreError::AccountNotFound(name.to_string()))?;

        let mut updated = account.clone();
        change(&mut updated);
        self.persist(&key, &updated)?;
        *account = updated;
        Ok(())
    }
}

impl AccountSubsystem for AccountStore {
    fn find_account(&self, name: &str, account_type: &str) -> Option<WikiAccount> {
        self.read().ok()?.get(&account_key(name, account_type)).cloned()
    }

    fn add_account(&self, name: &str, account_type: &str) -> Result<bool, AccountStoreError> {
        let key = account_key(name, account_type);
        let mut accounts = self.write()?;
        if accounts.contains_key(&key) {
            return Ok(false);
        }

        let account = WikiAccount::new(
            name.to_string(),
            account_type.to_string(),
            self.server_url.clone(),
        );
        self.persist(&key, &account)?;
        if let Some(storage) = &self.storage {
            let mut index = storage.get_list(ACCOUNT_INDEX_KEY)?.unwrap_or_default();
            index.push(key.clone());
            storage.put_list(ACCOUNT_INDEX_KEY, &index)?;
        }
        accounts.insert(key, account);
        info!("Added account '{}' ({})", name, account_type);
        Ok(true)
    }

    fn set_auth_token(
        &self,
        name: &str,
        account_type: &str,
        token_type: &str,
        token: &str,
    ) -> Result<(), AccountStoreError> {
        self.update(name, account_type, |account| {
            account
                .auth_tokens
                .insert(token_type.to_string(), token.to_string());
        })
    }
}
