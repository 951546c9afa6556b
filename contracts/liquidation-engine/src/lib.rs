//! Liquidation Engine
//!
//! Liquidates unsafe positions at a fixed spread over the feed price.
//!
//! ## Flow
//!
//! 1. `LiquidationEngine::liquidate` accrues the pool fee and checks the
//!    position is unsafe
//! 2. `FixedSpreadLiquidationStrategy::execute` sizes the liquidation,
//!    confiscates the position and pays out collateral
//! 3. The liquidator (or a flash lending callee, after receiving the
//!    collateral) repays the debt in stablecoin tokens
//! 4. The engine checks the position lost exactly the confiscated debt share
//!
//! Seized debt is booked as bad debt of the system debt engine and the
//! repayment is credited to it, so any shortfall stays as bad debt.

pub mod engine;
pub mod flash;
pub mod strategy;

pub use engine::LiquidationEngine;
pub use flash::{FlashLendingCall, FlashLendingCallee};
pub use strategy::{
    FixedSpreadLiquidationStrategy, LiquidationContext, LiquidationOutcome, LiquidationRequest,
};
