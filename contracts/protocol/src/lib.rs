//! aUSD Protocol
//!
//! One deployed instance of every component, sharing a single access
//! control table. Each entry point runs against a snapshot of the whole
//! protocol and leaves no partial writes behind when it fails.

pub mod config;
pub mod protocol;

#[cfg(test)]
mod integration_tests;

pub use config::{DeployConfig, ProtocolAccounts};
pub use protocol::{CollateralAsset, Protocol};
