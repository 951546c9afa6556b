//! Show Stopper - global settlement for the aUSD protocol
//!
//! Freezes the protocol and lets every stablecoin holder exit against the
//! remaining collateral at a fair, fixed price.

pub mod show_stopper;

pub use show_stopper::{CageTargets, SettlementState, ShowStopper};
