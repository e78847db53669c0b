pub mod account;
pub mod broker;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
