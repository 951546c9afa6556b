//! aUSD Common Library
//!
//! Shared types, constants, and utilities for all aUSD components:
//!
//! - **Fixed-point math**: `Amount` (1e18), `Rate` (1e27) and `Value` (1e45)
//!   newtypes over `U256` with floor rounding
//! - **Identifiers**: ledger accounts, collateral pools, sequential position ids
//! - **Errors**: one `AusdError` taxonomy for every component
//! - **Events**: indexable `AusdEvent`s collected per component
//! - **Access control**: injected role table shared by every component
//! - **Transactions**: snapshot / restore around multi-step operations

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod access_control;
pub mod interfaces;
pub mod transaction;

// Re-exports for convenience
pub use errors::{check_feed_price, AusdError, AusdResult, ErrorKind};
pub use types::*;
pub use math::{Amount, Rate, Value};
pub use events::*;
pub use access_control::{
    require_any_role, require_owner_or_gov, require_owner_or_show_stopper, require_role,
    AccessControl, AccessControlConfig, Role, SharedAccessControl,
};
pub use interfaces::{FixedPriceFeed, PriceFeed, SharedPriceFeed};
pub use transaction::transactional;
