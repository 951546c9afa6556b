//! Position Manager - user-facing handles over ledger positions
//!
//! Each position gets a sequential id and its own derived ledger account, so
//! one user can hold several independent positions in the same pool.

pub mod manager;

pub use manager::{OwnerPositions, PositionLink, PositionManager};
