//! External collaborator interfaces
//!
//! The core only needs a price reading from a feed; everything else a feed
//! does (aggregation, staleness, operators) stays behind this trait.

use std::fmt::Debug;
use std::sync::Arc;

use crate::math::Rate;

/// Source of a collateral price, quoted in the reference currency
pub trait PriceFeed: Debug + Send + Sync {
    /// Current price and whether it may be used
    fn peek_price(&self) -> (Rate, bool);
}

/// Handle stored in pool configuration
pub type SharedPriceFeed = Arc<dyn PriceFeed + Send + Sync>;

/// Feed pinned to one price, always valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPriceFeed(pub Rate);

impl PriceFeed for FixedPriceFeed {
    fn peek_price(&self) -> (Rate, bool) {
        (self.0, true)
    }
}
