use serde_json::Value;
use tracing::{info, warn};

use super::prompt::TerminalCollector;
use super::{ModeArg, Services};
use crate::account::bundle::BundleError;
use crate::account::types::TokenRequester;
use crate::account::{AccountRequest, AccountResult, AuthMode, CredentialCollector, CredentialFlow};
use crate::broker::TokenLookup;
use crate::error::AuthenticatorError;
use crate::registry::Principal;

fn requester(uid: Option<u32>) -> TokenRequester {
    uid.map(|uid| TokenRequester::App(Principal(uid)))
        .unwrap_or(TokenRequester::System)
}

pub async fn handle_login(
    services: &Services,
    mode: ModeArg,
    account: Option<String>,
    uid: Option<u32>,
    setting_sync: bool,
) -> Result<(), AuthenticatorError> {
    let requester = requester(uid);
    let mode = AuthMode::from(mode);

    let request = if mode.targets_existing_account() {
        let name = account.ok_or(BundleError::MissingAccountName(mode))?;
        services.broker.existing_account_request(requester, mode, &name)?
    } else {
        services.broker.new_account_request(requester)?
    }
    .with_setting_sync_only(setting_sync);

    let result = run_flow(services, request, TerminalCollector).await;
    print_result(&result)
}

/// Start a flow from a host request bundle, e.g.
/// `{"accountType": "...", "authTokenType": "...", "accountName": "alice"}`.
pub async fn handle_bundle_login(
    services: &Services,
    mode: ModeArg,
    json: &str,
) -> Result<(), AuthenticatorError> {
    let bundle: Value = serde_json::from_str(json).map_err(BundleError::from)?;
    let request = AccountRequest::from_bundle(AuthMode::from(mode), &bundle)?;
    let request = services.broker.admit(request)?;

    let result = run_flow(services, request, TerminalCollector).await;
    print_result(&result)
}

pub async fn handle_token(services: &Services, uid: u32, account: &str) -> Result<(), AuthenticatorError> {
    match services
        .broker
        .request_token(TokenRequester::App(Principal(uid)), account)?
    {
        TokenLookup::Cached { token, .. } => {
            println!("{}", token);
            Ok(())
        }
        TokenLookup::NeedsCredentials(request) => {
            info!("No cached token for '{}', signing in again", account);
            let result = run_flow(services, request, TerminalCollector).await;
            print_result(&result)
        }
    }
}

/// Run one flow to completion. Ctrl-C cancels it.
pub async fn run_flow<C: CredentialCollector>(
    services: &Services,
    request: AccountRequest,
    collector: C,
) -> AccountResult {
    let flow = CredentialFlow::new(
        request,
        collector,
        services.remote.clone(),
        services.accounts.clone(),
    );

    let cancel = flow.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sign-in");
            cancel.cancel();
        }
    });

    let outcome = flow.run().await;
    interrupt.abort();

    info!("Flow finished after {:?}", outcome.history);
    outcome.result
}

fn print_result(result: &AccountResult) -> Result<(), AuthenticatorError> {
    let bundle = serde_json::to_string_pretty(&result.to_bundle()).map_err(BundleError::from)?;
    println!("{}", bundle);

    match result.error_kind() {
        None => Ok(()),
        Some(kind) => Err(AuthenticatorError::Flow(kind)),
    }
}
