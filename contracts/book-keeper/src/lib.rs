//! Book Keeper - accounting core of the aUSD protocol
//!
//! - **BookKeeper**: positions, free collateral, internal stablecoin and bad debt
//! - **CollateralPoolConfig**: per-pool risk parameters, owned by the ledger
//! - **SystemDebtEngine**: the protocol's own ledger account for fees and bad debt

pub mod ledger;
pub mod pool_config;
pub mod system_debt_engine;

pub use ledger::BookKeeper;
pub use pool_config::{CollateralPool, CollateralPoolConfig, CollateralPoolParams};
pub use system_debt_engine::SystemDebtEngine;
