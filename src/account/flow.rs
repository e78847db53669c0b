//! Credential acquisition flow
//!
//! `Idle -> CollectingCredentials -> Authenticating -> {Succeeded | Failed | Cancelled}`
//!
//! The flow collects credentials via a [`CredentialCollector`], performs one
//! exchange per attempt through a [`RemoteAuthClient`], and on success hands
//! the account and token to the [`AccountSubsystem`]. Rejections loop back to
//! collection; transport failures and cancellation end the flow.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::store::AccountSubsystem;
use super::types::{AccountRequest, AccountResult, AuthMode};
use crate::client::{AuthRequest, AuthResponse, RemoteAuthClient};
use crate::error::ErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CollectingCredentials,
    Authenticating,
    Succeeded,
    Failed,
    Cancelled,
}

/// Identity material entered by the user.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What the collector should show for the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialPrompt {
    pub account_type: String,
    /// Pre-filled username, if any
    pub username: Option<String>,
    /// Only the password may be changed
    pub username_locked: bool,
    /// Message from the previous attempt
    pub error: Option<String>,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorInput {
    Submit(Credentials),
    Cancel,
}

/// Source of user-entered credentials (a form, a terminal, a test script).
#[async_trait]
pub trait CredentialCollector: Send {
    async fn collect(&mut self, prompt: &CredentialPrompt) -> CollectorInput;
}

/// Cancels the flow it was taken from. Cloneable and usable from any task.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Per-flow transient state. Lives only inside [`CredentialFlow::run`].
struct Session {
    username: Option<String>,
    username_locked: bool,
    error: Option<String>,
    attempts: u32,
}

impl Session {
    fn new(existing_username: Option<String>) -> Self {
        Self {
            username_locked: existing_username.is_some(),
            username: existing_username,
            error: None,
            attempts: 0,
        }
    }

    fn prompt(&self, account_type: &str) -> CredentialPrompt {
        CredentialPrompt {
            account_type: account_type.to_string(),
            username: self.username.clone(),
            username_locked: self.username_locked,
            error: self.error.clone(),
            attempt: self.attempts + 1,
        }
    }

    /// Locked usernames cannot be replaced by the collector.
    fn accept(&mut self, mut credentials: Credentials) -> Credentials {
        match (&self.username, self.username_locked) {
            (Some(locked), true) => credentials.username = locked.clone(),
            _ => {
                credentials.username = credentials.username.trim().to_string();
                self.username = Some(credentials.username.clone());
            }
        }
        credentials
    }
}

fn validate(credentials: &Credentials) -> Result<(), String> {
    if credentials.username.is_empty() {
        return Err("Username must not be empty".to_string());
    }
    if credentials.password.is_empty() {
        return Err("Password must not be empty".to_string());
    }
    Ok(())
}

/// Result of a finished flow plus the states it went through.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub result: AccountResult,
    pub history: Vec<FlowState>,
}

enum Exchange {
    Cancelled,
    Completed(Result<AuthResponse, crate::client::TransportError>),
}

pub struct CredentialFlow<C> {
    request: AccountRequest,
    collector: C,
    remote: Arc<dyn RemoteAuthClient>,
    accounts: Arc<dyn AccountSubsystem>,
    state: FlowState,
    history: Vec<FlowState>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel: CancelSignal,
}

impl<C: CredentialCollector> CredentialFlow<C> {
    pub fn new(
        request: AccountRequest,
        collector: C,
        remote: Arc<dyn RemoteAuthClient>,
        accounts: Arc<dyn AccountSubsystem>,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            request,
            collector,
            remote,
            accounts,
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
            cancel_tx: Arc::new(tx),
            cancel: CancelSignal { rx },
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Drive the flow to a terminal state. Consumes the flow, so the result
    /// is produced exactly once.
    pub async fn run(mut self) -> FlowOutcome {
        info!(
            "Starting {:?} flow for account type '{}'",
            self.request.mode, self.request.account_type
        );
        let result = self.drive().await;
        info!("Flow finished in state {:?}", self.state);
        FlowOutcome {
            result,
            history: self.history,
        }
    }

    async fn drive(&mut self) -> AccountResult {
        let existing = match self.existing_username() {
            Ok(existing) => existing,
            Err(kind) => return self.fail(kind),
        };
        let mut session = Session::new(existing);

        loop {
            if self.cancel.is_set() {
                return self.cancelled();
            }
            self.transition(FlowState::CollectingCredentials);

            let prompt = session.prompt(&self.request.account_type);
            let input = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => CollectorInput::Cancel,
                input = self.collector.collect(&prompt) => input,
            };
            let credentials = match input {
                CollectorInput::Cancel => return self.cancelled(),
                CollectorInput::Submit(credentials) => session.accept(credentials),
            };
            if let Err(message) = validate(&credentials) {
                debug!("Rejected input locally: {}", message);
                session.error = Some(message);
                continue;
            }

            self.transition(FlowState::Authenticating);
            session.attempts += 1;
            let auth_request = AuthRequest {
                account_type: self.request.account_type.clone(),
                username: credentials.username,
                secret: credentials.password,
                token_type: self.request.token_type.clone(),
            };

            let exchange = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Exchange::Cancelled,
                response = self.remote.authenticate(&auth_request) => Exchange::Completed(response),
            };

            match exchange {
                Exchange::Cancelled => {
                    info!("Cancelled while authenticating; discarding the pending login");
                    return self.cancelled();
                }
                Exchange::Completed(Ok(AuthResponse::Granted { token, account_name })) => {
                    return self.complete(account_name, token);
                }
                Exchange::Completed(Ok(AuthResponse::Rejected { reason })) => {
                    info!(
                        "Credentials for '{}' rejected (attempt {})",
                        auth_request.username, session.attempts
                    );
                    session.error = Some(reason);
                }
                Exchange::Completed(Err(e)) => {
                    warn!("Login exchange failed: {}", e);
                    return self.fail(ErrorKind::NetworkFailure);
                }
            }
        }
    }

    fn existing_username(&self) -> Result<Option<String>, ErrorKind> {
        if !self.request.mode.targets_existing_account() {
            return Ok(None);
        }
        let name = self
            .request
            .account_name
            .as_deref()
            .ok_or(ErrorKind::UnknownAccount)?;
        match self.accounts.find_account(name, &self.request.account_type) {
            Some(account) => Ok(Some(account.name)),
            None => {
                warn!("No stored account '{}' to {:?}", name, self.request.mode);
                Err(ErrorKind::UnknownAccount)
            }
        }
    }

    fn complete(&mut self, remote_name: String, token: String) -> AccountResult {
        let account_type = self.request.account_type.clone();
        let token_type = self.request.token_type.clone();
        let account_name = match (&self.request.account_name, self.request.mode) {
            (Some(existing), mode) if mode.targets_existing_account() => existing.clone(),
            _ => remote_name,
        };

        let persisted = match self.request.mode {
            AuthMode::NewAccount => self
                .accounts
                .add_account(&account_name, &account_type)
                .and_then(|created| {
                    if !created {
                        info!("Account '{}' already present; refreshing its token", account_name);
                    }
                    self.accounts
                        .set_auth_token(&account_name, &account_type, &token_type, &token)
                }),
            AuthMode::ConfirmCredentials => Ok(()),
            // Only the requester's token type is replaced; other apps keep theirs.
            AuthMode::Reauthenticate => self
                .accounts
                .set_auth_token(&account_name, &account_type, &token_type, &token),
        };
        if let Err(e) = persisted {
            error!("Could not store account '{}': {}", account_name, e);
            return self.fail(ErrorKind::AccountStorage);
        }

        self.transition(FlowState::Succeeded);
        AccountResult::Success {
            account_name,
            account_type,
            auth_token: token,
            token_type,
            setting_sync_only: self.request.setting_sync_only,
        }
    }

    fn fail(&mut self, reason: ErrorKind) -> AccountResult {
        self.transition(FlowState::Failed);
        AccountResult::Failure {
            reason,
            setting_sync_only: self.request.setting_sync_only,
        }
    }

    fn cancelled(&mut self) -> AccountResult {
        self.transition(FlowState::Cancelled);
        AccountResult::Cancelled {
            setting_sync_only: self.request.setting_sync_only,
        }
    }

    fn transition(&mut self, next: FlowState) {
        debug!("Flow {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}
