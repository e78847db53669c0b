// Remote authentication client
pub mod wiki_client;

use async_trait::async_trait;
use thiserror::Error;

pub use wiki_client::WikiClient;

/// Transport-level failure talking to the wiki. Always terminal for a flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One credential exchange.
#[derive(Clone, PartialEq)]
pub struct AuthRequest {
    pub account_type: String,
    pub username: String,
    pub secret: String,
    pub token_type: String,
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("account_type", &self.account_type)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthResponse {
    /// Identity confirmed
    Granted { token: String, account_name: String },
    /// Credentials refused
    Rejected { reason: String },
}

#[async_trait]
pub trait RemoteAuthClient: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResponse, TransportError>;
}
