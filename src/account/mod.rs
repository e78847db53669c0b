//! Account System Module
//!
//! - Typed account requests and results (with host bundle encoding)
//! - The credential acquisition flow
//! - The account subsystem that stores accounts and cached tokens

pub mod types;
pub mod bundle;
pub mod store;
pub mod flow;

pub use types::{AccountRequest, AccountResult, AuthMode, WikiAccount};
pub use store::{AccountStore, AccountSubsystem};
pub use flow::{
    CancelHandle, CollectorInput, CredentialCollector, CredentialFlow, CredentialPrompt,
    Credentials, FlowOutcome, FlowState,
};
