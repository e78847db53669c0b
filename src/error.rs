use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::bundle::BundleError;
use crate::account::store::AccountStoreError;
use crate::broker::BrokerError;
use crate::client::TransportError;
use crate::registry::RegistryError;
use crate::storage::StorageError;

/// Why a flow or registry operation did not succeed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Collected credentials failed local validation (recoverable)
    InvalidInput,
    /// The wiki rejected the credentials (recoverable)
    AuthRejected,
    /// Timeout, unreachable server or malformed response (terminal)
    NetworkFailure,
    /// The key-value store failed during a registry write
    RegistryUnavailable,
    /// User-initiated, not an error
    Cancelled,
    /// Confirm/re-auth named an account the subsystem does not hold
    UnknownAccount,
    /// The account subsystem could not persist the new account or token
    AccountStorage,
}

impl ErrorKind {
    /// Numeric code used by the host account manager in result bundles.
    pub fn error_code(self) -> i32 {
        match self {
            ErrorKind::NetworkFailure => 3,
            ErrorKind::Cancelled => 4,
            ErrorKind::InvalidInput | ErrorKind::UnknownAccount => 7,
            ErrorKind::AuthRejected => 9,
            ErrorKind::RegistryUnavailable | ErrorKind::AccountStorage => 1,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::AuthRejected => "authentication rejected",
            ErrorKind::NetworkFailure => "network failure",
            ErrorKind::RegistryUnavailable => "registry unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::UnknownAccount => "unknown account",
            ErrorKind::AccountStorage => "account storage failure",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum AuthenticatorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Account store error: {0}")]
    AccountStore(#[from] AccountStoreError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),
    #[error("Token request refused: {0}")]
    Broker(#[from] BrokerError),
    #[error("Flow ended without a token: {0}")]
    Flow(ErrorKind),
}

impl AuthenticatorError {
    /// Failure kind reported to the host; its `error_code` is the exit status.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthenticatorError::Flow(kind) => *kind,
            AuthenticatorError::Registry(e) => e.kind(),
            AuthenticatorError::Storage(_) | AuthenticatorError::AccountStore(_) => {
                ErrorKind::AccountStorage
            }
            AuthenticatorError::Transport(_) => ErrorKind::NetworkFailure,
            AuthenticatorError::Bundle(_) => ErrorKind::InvalidInput,
            AuthenticatorError::Broker(BrokerError::UnknownAccount(_)) => ErrorKind::UnknownAccount,
            AuthenticatorError::Broker(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_account_manager() {
        assert_eq!(ErrorKind::Cancelled.error_code(), 4);
        assert_eq!(ErrorKind::NetworkFailure.error_code(), 3);
        assert_eq!(ErrorKind::AuthRejected.error_code(), 9);
        assert_eq!(ErrorKind::InvalidInput.error_code(), 7);
    }

    #[test]
    fn test_top_level_errors_map_to_kinds() {
        let registry: AuthenticatorError =
            RegistryError::Unavailable(StorageError::Backend("gone".to_string())).into();
        assert_eq!(registry.kind(), ErrorKind::RegistryUnavailable);
        assert_eq!(registry.kind().error_code(), 1);

        let unknown: AuthenticatorError = BrokerError::UnknownAccount("bob".to_string()).into();
        assert_eq!(unknown.kind(), ErrorKind::UnknownAccount);

        assert_eq!(AuthenticatorError::from(TransportError::Timeout).kind(), ErrorKind::NetworkFailure);
        assert_eq!(AuthenticatorError::Flow(ErrorKind::Cancelled).kind().error_code(), 4);
    }
}
