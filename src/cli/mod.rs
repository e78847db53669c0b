pub mod grants;
pub mod login;
pub mod prompt;

use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;

use crate::account::{AccountStore, AccountSubsystem, AuthMode};
use crate::broker::TokenBroker;
use crate::client::{RemoteAuthClient, WikiClient};
use crate::config::AuthenticatorConfig;
use crate::error::AuthenticatorError;
use crate::registry::AuthorizationRegistry;
use crate::storage::{KeyValueStore, Storage};

#[derive(Parser)]
#[command(name = "wiki_authenticator")]
#[command(about = "Wiki account authenticator and token broker", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "authenticator.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    New,
    Confirm,
    Reauth,
}

impl From<ModeArg> for AuthMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::New => AuthMode::NewAccount,
            ModeArg::Confirm => AuthMode::ConfirmCredentials,
            ModeArg::Reauth => AuthMode::Reauthenticate,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Allow an app (by uid) to request tokens
    Grant {
        #[arg(long)]
        uid: u32,
        #[arg(long)]
        package: String,
    },
    /// Show whether an app may request tokens
    Check {
        #[arg(long)]
        uid: u32,
    },
    /// List every package ever granted
    Packages,
    /// List stored accounts
    Accounts,
    /// Sign in to the wiki
    Login {
        #[arg(long, value_enum, default_value_t = ModeArg::New)]
        mode: ModeArg,
        /// Existing account (confirm / reauth)
        #[arg(long)]
        account: Option<String>,
        /// Request on behalf of this app instead of the system
        #[arg(long)]
        uid: Option<u32>,
        #[arg(long)]
        setting_sync: bool,
        /// Host request bundle (JSON) instead of the flags above
        #[arg(long, conflicts_with_all = ["account", "uid", "setting_sync"])]
        bundle: Option<String>,
    },
    /// Fetch a token for an app, signing in again if none is cached
    Token {
        #[arg(long)]
        uid: u32,
        #[arg(long)]
        account: String,
    },
}

/// Long-lived components, built once at startup and shared by reference.
pub struct Services {
    pub registry: Arc<AuthorizationRegistry>,
    pub accounts: Arc<AccountStore>,
    pub broker: TokenBroker,
    pub remote: Arc<dyn RemoteAuthClient>,
}

impl Services {
    pub fn open(config: &AuthenticatorConfig) -> Result<Self, AuthenticatorError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(Storage::open(&config.storage.db_path)?);
        Self::with_store(config, store)
    }

    pub fn with_store(
        config: &AuthenticatorConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, AuthenticatorError> {
        let registry = Arc::new(AuthorizationRegistry::new(store.clone()));
        let accounts = Arc::new(AccountStore::with_storage(store, config.server.url.clone())?);
        let remote: Arc<dyn RemoteAuthClient> = Arc::new(WikiClient::from_config(&config.server)?);
        let subsystem: Arc<dyn AccountSubsystem> = accounts.clone();
        let broker = TokenBroker::new(
            registry.clone(),
            subsystem,
            config.auth.account_type.clone(),
            config.auth.base_token_type.clone(),
        );

        Ok(Self {
            registry,
            accounts,
            broker,
            remote,
        })
    }
}

pub async fn run(cli: Cli, services: &Services) -> Result<(), AuthenticatorError> {
    match cli.command {
        Commands::Grant { uid, package } => grants::handle_grant(services, uid, &package),
        Commands::Check { uid } => {
            grants::handle_check(services, uid);
            Ok(())
        }
        Commands::Packages => grants::handle_packages(services),
        Commands::Accounts => {
            grants::handle_accounts(services);
            Ok(())
        }
        Commands::Login {
            mode,
            account,
            uid,
            setting_sync,
            bundle,
        } => match bundle {
            Some(json) => login::handle_bundle_login(services, mode, &json).await,
            None => login::handle_login(services, mode, account, uid, setting_sync).await,
        },
        Commands::Token { uid, account } => login::handle_token(services, uid, &account).await,
    }
}
