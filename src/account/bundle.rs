//! Host account-manager bundle encoding.
//!
//! The only place that knows the bundle key names; everything else works with
//! [`AccountRequest`] and [`AccountResult`].

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::types::{AccountRequest, AccountResult, AuthMode};

pub const KEY_ACCOUNT_NAME: &str = "accountName";
pub const KEY_ACCOUNT_TYPE: &str = "accountType";
pub const KEY_AUTHTOKEN: &str = "authtoken";
pub const KEY_AUTH_TOKEN_TYPE: &str = "authTokenType";
pub const KEY_IS_SETTING_SYNC_TYPE: &str = "isSettingSyncType";
pub const KEY_ERROR_CODE: &str = "errorCode";
pub const KEY_ERROR_MESSAGE: &str = "errorMessage";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("malformed request bundle: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("request bundle field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("mode {0:?} requires 'accountName'")]
    MissingAccountName(AuthMode),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestBundle {
    account_type: String,
    auth_token_type: String,
    #[serde(default)]
    is_setting_sync_type: bool,
    #[serde(default)]
    account_name: Option<String>,
}

impl AccountRequest {
    /// Decode the platform's initiation bundle. The mode comes from the entry
    /// point the platform called, not from the bundle.
    pub fn from_bundle(mode: AuthMode, bundle: &Value) -> Result<Self, BundleError> {
        let raw = RequestBundle::deserialize(bundle)?;
        if raw.account_type.is_empty() {
            return Err(BundleError::EmptyField(KEY_ACCOUNT_TYPE));
        }
        if raw.auth_token_type.is_empty() {
            return Err(BundleError::EmptyField(KEY_AUTH_TOKEN_TYPE));
        }
        let account_name = raw.account_name.filter(|name| !name.is_empty());
        if mode.targets_existing_account() && account_name.is_none() {
            return Err(BundleError::MissingAccountName(mode));
        }

        Ok(AccountRequest {
            account_type: raw.account_type,
            token_type: raw.auth_token_type,
            mode,
            setting_sync_only: raw.is_setting_sync_type,
            account_name,
        })
    }
}

impl AccountResult {
    /// Encode for the caller's authenticator response.
    pub fn to_bundle(&self) -> Value {
        match self {
            AccountResult::Success {
                account_name,
                account_type,
                auth_token,
                token_type,
                setting_sync_only,
            } => json!({
                KEY_ACCOUNT_NAME: account_name,
                KEY_ACCOUNT_TYPE: account_type,
                KEY_AUTHTOKEN: auth_token,
                KEY_AUTH_TOKEN_TYPE: token_type,
                KEY_IS_SETTING_SYNC_TYPE: setting_sync_only,
            }),
            AccountResult::Failure {
                reason,
                setting_sync_only,
            } => json!({
                KEY_ERROR_CODE: reason.error_code(),
                KEY_ERROR_MESSAGE: reason.to_string(),
                KEY_IS_SETTING_SYNC_TYPE: setting_sync_only,
            }),
            AccountResult::Cancelled { setting_sync_only } => {
                let kind = crate::error::ErrorKind::Cancelled;
                json!({
                    KEY_ERROR_CODE: kind.error_code(),
                    KEY_ERROR_MESSAGE: kind.to_string(),
                    KEY_IS_SETTING_SYNC_TYPE: setting_sync_only,
                })
            }
        }
    }
}
