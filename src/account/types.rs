//! Account request/result types shared by the flow, the broker and the CLI

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::registry::Principal;

/// Token type suffix used when the host system itself asks for a token.
pub const SYSTEM_UID_SUFFIX: &str = "android.uid.system";

/// Token type requested by the host system.
pub fn system_token_type(base: &str) -> String {
    format!("{}{}", base, SYSTEM_UID_SUFFIX)
}

/// Token type requested on behalf of an app.
pub fn token_type_for_uid(base: &str, uid: Principal) -> String {
    format!("{}{}", base, uid)
}

/// Who is asking, according to the token-type naming convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRequester {
    System,
    App(Principal),
}

/// Recover the requester from a token type built by [`system_token_type`] or
/// [`token_type_for_uid`].
pub fn parse_token_requester(base: &str, token_type: &str) -> Option<TokenRequester> {
    let suffix = token_type.strip_prefix(base)?;
    if suffix == SYSTEM_UID_SUFFIX {
        return Some(TokenRequester::System);
    }
    suffix.parse::<u32>().ok().map(|uid| TokenRequester::App(Principal(uid)))
}

/// How the flow was started.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// Add a new account from scratch
    NewAccount,
    /// Re-enter the password of an existing account; stores nothing
    ConfirmCredentials,
    /// Fetch a fresh token for an existing account, replacing cached ones
    Reauthenticate,
}

impl AuthMode {
    pub fn targets_existing_account(self) -> bool {
        !matches!(self, AuthMode::NewAccount)
    }
}

/// Input to the credential flow. Read-only once built.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccountRequest {
    pub account_type: String,
    pub token_type: String,
    pub mode: AuthMode,
    pub setting_sync_only: bool,
    /// Existing account for confirm / re-auth
    pub account_name: Option<String>,
}

impl AccountRequest {
    pub fn new_account(account_type: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            account_type: account_type.into(),
            token_type: token_type.into(),
            mode: AuthMode::NewAccount,
            setting_sync_only: false,
            account_name: None,
        }
    }

    pub fn for_existing(
        mode: AuthMode,
        account_name: impl Into<String>,
        account_type: impl Into<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            account_type: account_type.into(),
            token_type: token_type.into(),
            mode,
            setting_sync_only: false,
            account_name: Some(account_name.into()),
        }
    }

    pub fn with_setting_sync_only(mut self, setting_sync_only: bool) -> Self {
        self.setting_sync_only = setting_sync_only;
        self
    }
}

/// Terminal outcome of one flow. Produced exactly once per flow.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum AccountResult {
    Success {
        account_name: String,
        account_type: String,
        auth_token: String,
        token_type: String,
        setting_sync_only: bool,
    },
    Failure {
        reason: ErrorKind,
        setting_sync_only: bool,
    },
    Cancelled {
        setting_sync_only: bool,
    },
}

impl AccountResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AccountResult::Success { .. })
    }

    pub fn auth_token(&self) -> Option<&str> {
        match self {
            AccountResult::Success { auth_token, .. } => Some(auth_token),
            _ => None,
        }
    }

    /// `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            AccountResult::Success { .. } => None,
            AccountResult::Failure { reason, .. } => Some(*reason),
            AccountResult::Cancelled { .. } => Some(ErrorKind::Cancelled),
        }
    }

    pub fn setting_sync_only(&self) -> bool {
        match self {
            AccountResult::Success { setting_sync_only, .. }
            | AccountResult::Failure { setting_sync_only, .. }
            | AccountResult::Cancelled { setting_sync_only } => *setting_sync_only,
        }
    }
}

/// Account record held by the account subsystem.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WikiAccount {
    pub name: String,
    pub account_type: String,
    pub server_url: String,
    /// token type -> token
    pub auth_tokens: HashMap<String, String>,
    pub created_at: u64,
}

impl WikiAccount {
    pub fn new(name: String, account_type: String, server_url: String) -> Self {
        Self {
            name,
            account_type,
            server_url,
            auth_tokens: HashMap::new(),
            created_at: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    pub fn auth_token(&self, token_type: &str) -> Option<&str> {
        self.auth_tokens.get(token_type).map(String::as_str)
    }
}
