//! Price Oracle Contract
//!
//! Turns raw collateral prices into the `price_with_safety_margin` the
//! ledger checks positions against:
//!
//! ```text
//! price_with_safety_margin = feed_price / stablecoin_reference_price / liquidation_ratio
//! ```
//!
//! An invalid feed writes a zero price, which makes every indebted position
//! in the pool unsafe until the feed recovers.
//!
//! `SimplePriceFeed` is the trusted-operator feed used in tests and
//! deployments without an external aggregator.

pub mod feed;
pub mod oracle;

pub use feed::{FeedReading, SimplePriceFeed};
pub use oracle::PriceOracle;
