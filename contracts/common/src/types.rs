//! Core Types for aUSD Protocol
//!
//! Identifiers and the small records shared by every component. Pool
//! configuration lives with the ledger in `ausd-book-keeper`.

use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::domains;
use crate::math::{Amount, Rate, Value};

// ============ Identifiers ============

/// 32-byte ledger account (user, contract or derived position account)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The zero account, never a valid owner
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic account for a named component or test actor
    pub fn from_label(label: &str) -> Self {
        Self(Sha256::digest(label.as_bytes()).into())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// Collateral pool identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct PoolId(pub [u8; 32]);

impl PoolId {
    /// Left-aligned ASCII symbol, zero padded (`"WBTC"` -> `57 42 54 43 00 ..`)
    pub fn from_symbol(symbol: &str) -> Self {
        let mut bytes = [0u8; 32];
        let len = symbol.len().min(32);
        bytes[..len].copy_from_slice(&symbol.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        match core::str::from_utf8(&self.0[..end]) {
            Ok(symbol) if !symbol.is_empty() && self.0[end..].iter().all(|b| *b == 0) => {
                f.write_str(symbol)
            }
            _ => write_hex(f, &self.0),
        }
    }
}

/// Sequential position identifier, starting at 1
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct PositionId(pub u64);

impl PositionId {
    /// Ledger account bound to this id under a given position manager
    pub fn derive_account(&self, manager: &AccountId) -> AccountId {
        let mut hasher = Sha256::new();
        hasher.update(domains::POSITION_ACCOUNT);
        hasher.update(manager.0);
        hasher.update(self.0.to_be_bytes());
        AccountId(hasher.finalize().into())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

// ============ Ledger Records ============

/// Locked collateral and normalized debt of one account in one pool
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Position {
    /// Collateral locked behind the debt
    pub locked_collateral: Amount,
    /// Normalized debt; owed value is `debt_share x debt_accumulated_rate`
    pub debt_share: Amount,
}

impl Position {
    pub fn is_empty(&self) -> bool {
        self.locked_collateral.is_zero() && self.debt_share.is_zero()
    }

    /// Debt value at the given accumulated rate
    pub fn debt_value(&self, debt_accumulated_rate: Rate) -> Value {
        self.debt_share * debt_accumulated_rate
    }

    /// Collateral value at the given price
    pub fn collateral_value(&self, price: Rate) -> Value {
        self.locked_collateral * price
    }

    /// `debt_share x rate <= locked_collateral x price`
    pub fn is_safe(&self, debt_accumulated_rate: Rate, price_with_safety_margin: Rate) -> bool {
        self.debt_value(debt_accumulated_rate) <= self.collateral_value(price_with_safety_margin)
    }
}

/// Position registered with a position manager
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct PositionHandle {
    pub pool_id: PoolId,
    /// Derived ledger account holding the position
    pub account: AccountId,
    pub owner: AccountId,
}
