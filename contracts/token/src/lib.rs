//! aUSD Token
//!
//! Minimal in-memory token ledgers for the stablecoin and collateral
//! tokens, and the adapters that move value between them and the
//! book keeper.

pub mod adapters;
pub mod token;

pub use adapters::{CollateralTokenAdapter, StablecoinAdapter};
pub use token::{Token, TokenMetadata};
