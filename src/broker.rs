//! Token broker
//!
//! Front door for local applications asking for a wiki token. Apps must hold
//! a grant in the [`AuthorizationRegistry`]; the host system itself is always
//! served. A cached token is handed out directly, otherwise the caller gets
//! the [`AccountRequest`] it should drive a credential flow with.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::account::types::{
    parse_token_requester, system_token_type, token_type_for_uid, TokenRequester,
};
use crate::account::{AccountRequest, AccountSubsystem, AuthMode};
use crate::registry::{AuthorizationRegistry, Principal, RegistryError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("uid {0} has not been granted token access")]
    NotAuthorized(Principal),
    #[error("no account named '{0}'")]
    UnknownAccount(String),
    #[error("token type '{0}' does not name a requester")]
    UnknownTokenType(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenLookup {
    Cached { account_name: String, token: String },
    /// No usable token; run a flow with this request.
    NeedsCredentials(AccountRequest),
}

pub struct TokenBroker {
    registry: Arc<AuthorizationRegistry>,
    accounts: Arc<dyn AccountSubsystem>,
    account_type: String,
    base_token_type: String,
}

impl TokenBroker {
    pub fn new(
        registry: Arc<AuthorizationRegistry>,
        accounts: Arc<dyn AccountSubsystem>,
        account_type: impl Into<String>,
        base_token_type: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            accounts,
            account_type: account_type.into(),
            base_token_type: base_token_type.into(),
        }
    }

    pub fn token_type_for(&self, requester: TokenRequester) -> String {
        match requester {
            TokenRequester::System => system_token_type(&self.base_token_type),
            TokenRequester::App(uid) => token_type_for_uid(&self.base_token_type, uid),
        }
    }

    /// Record the user's consent for `uid`.
    pub fn grant(&self, uid: Principal, package: &str) -> Result<(), RegistryError> {
        self.registry.grant(uid, package)
    }

    pub fn authorize(&self, requester: TokenRequester) -> Result<(), BrokerError> {
        match requester {
            TokenRequester::System => Ok(()),
            TokenRequester::App(uid) if self.registry.is_authorized(uid) => Ok(()),
            TokenRequester::App(uid) => {
                warn!("Refusing token request from unauthorized uid {}", uid);
                Err(BrokerError::NotAuthorized(uid))
            }
        }
    }

    /// Request for adding a brand-new account on behalf of `requester`.
    pub fn new_account_request(&self, requester: TokenRequester) -> Result<AccountRequest, BrokerError> {
        self.authorize(requester)?;
        Ok(AccountRequest::new_account(
            self.account_type.clone(),
            self.token_type_for(requester),
        ))
    }

    /// Request for confirming or re-authenticating `account_name`.
    pub fn existing_account_request(
        &self,
        requester: TokenRequester,
        mode: AuthMode,
        account_name: &str,
    ) -> Result<AccountRequest, BrokerError> {
        self.authorize(requester)?;
        if self.accounts.find_account(account_name, &self.account_type).is_none() {
            return Err(BrokerError::UnknownAccount(account_name.to_string()));
        }
        Ok(AccountRequest::for_existing(
            mode,
            account_name,
            self.account_type.clone(),
            self.token_type_for(requester),
        ))
    }

    /// Vet a request decoded from a host bundle. Its token type identifies the
    /// requester, which must be authorized like any other.
    pub fn admit(&self, request: AccountRequest) -> Result<AccountRequest, BrokerError> {
        let requester = parse_token_requester(&self.base_token_type, &request.token_type)
            .ok_or_else(|| BrokerError::UnknownTokenType(request.token_type.clone()))?;
        self.authorize(requester)?;
        Ok(request)
    }

    pub fn request_token(
        &self,
        requester: TokenRequester,
        account_name: &str,
    ) -> Result<TokenLookup, BrokerError> {
        let request =
            self.existing_account_request(requester, AuthMode::Reauthenticate, account_name)?;

        match self
            .accounts
            .peek_auth_token(account_name, &self.account_type, &request.token_type)
        {
            Some(token) => {
                info!("Serving cached token for '{}' to {:?}", account_name, requester);
                Ok(TokenLookup::Cached {
                    account_name: account_name.to_string(),
                    token,
                })
            }
            None => {
                debug!("No cached '{}' token for '{}'", request.token_type, account_name);
                Ok(TokenLookup::NeedsCredentials(request))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStore;
    use crate::storage::MemoryStore;

    const WIKI: &str = "org.example.wiki";
    const BASE: &str = "full";

    fn broker() -> (TokenBroker, Arc<AccountStore>) {
        let registry = Arc::new(AuthorizationRegistry::new(Arc::new(MemoryStore::new())));
        let accounts = Arc::new(AccountStore::new("https://wiki.example.org/"));
        accounts.add_account("alice", WIKI).unwrap();
        (TokenBroker::new(registry, accounts.clone(), WIKI, BASE), accounts)
    }

    #[test]
    fn test_unauthorized_app_is_refused() {
        let (broker, _) = broker();
        let err = broker
            .request_token(TokenRequester::App(Principal(10_042)), "alice")
            .unwrap_err();
        assert_eq!(err, BrokerError::NotAuthorized(Principal(10_042)));
        assert!(broker.new_account_request(TokenRequester::App(Principal(10_042))).is_err());
    }

    #[test]
    fn test_granted_app_gets_cached_token() {
        let (broker, accounts) = broker();
        broker.grant(Principal(10_042), "org.example.mail").unwrap();
        accounts.set_auth_token("alice", WIKI, "full10042", "cookie").unwrap();

        let lookup = broker
            .request_token(TokenRequester::App(Principal(10_042)), "alice")
            .unwrap();
        assert_eq!(
            lookup,
            TokenLookup::Cached {
                account_name: "alice".to_string(),
                token: "cookie".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_token_asks_for_reauthentication() {
        let (broker, _) = broker();
        let lookup = broker.request_token(TokenRequester::System, "alice").unwrap();

        let request = match lookup {
            TokenLookup::NeedsCredentials(request) => request,
            other => panic!("expected a flow request, got {:?}", other),
        };
        assert_eq!(request.mode, AuthMode::Reauthenticate);
        assert_eq!(request.account_name.as_deref(), Some("alice"));
        assert_eq!(request.token_type, "fullandroid.uid.system");
    }

    #[test]
    fn test_tokens_are_scoped_per_requester() {
        let (broker, accounts) = broker();
        broker.grant(Principal(7), "com.seven").unwrap();
        accounts.set_auth_token("alice", WIKI, "fullandroid.uid.system", "system-cookie").unwrap();

        let lookup = broker.request_token(TokenRequester::App(Principal(7)), "alice").unwrap();
        assert!(matches!(lookup, TokenLookup::NeedsCredentials(_)));
    }

    #[test]
    fn test_admit_checks_requester_encoded_in_token_type() {
        let (broker, _) = broker();
        let system = AccountRequest::new_account(WIKI, "fullandroid.uid.system");
        assert_eq!(broker.admit(system.clone()).unwrap(), system);

        let app = AccountRequest::new_account(WIKI, "full10042");
        assert_eq!(
            broker.admit(app.clone()).unwrap_err(),
            BrokerError::NotAuthorized(Principal(10_042))
        );
        broker.grant(Principal(10_042), "org.example.mail").unwrap();
        assert_eq!(broker.admit(app.clone()).unwrap(), app);

        let foreign = AccountRequest::new_account(WIKI, "read-only");
        assert_eq!(
            broker.admit(foreign).unwrap_err(),
            BrokerError::UnknownTokenType("read-only".to_string())
        );
    }

    #[test]
    fn test_unknown_account() {
        let (broker, _) = broker();
        assert_eq!(
            broker.request_token(TokenRequester::System, "bob").unwrap_err(),
            BrokerError::UnknownAccount("bob".to_string())
        );
    }
}
