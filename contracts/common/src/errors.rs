//! Error Types for aUSD Protocol
//!
//! Every failure is synchronous and aborts the whole operation. Variants are
//! grouped by `ErrorKind` so callers can tell a permission problem from a
//! state-machine problem without matching every variant.

use core::fmt;

use crate::access_control::Role;
use crate::math::{Amount, Rate, Value};
use crate::types::{AccountId, PoolId, PositionId};

/// Result type alias for aUSD operations
pub type AusdResult<T> = Result<T, AusdError>;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller is not owner, not whitelisted or lacks a role
    Authorization,
    /// Ceiling, floor, safety or arithmetic invariant would break
    Invariant,
    /// Operation not allowed in the current lifecycle phase
    StateMachine,
    /// Price feed reported invalid data
    ExternalData,
    /// Flash-lending callee failed or under-repaid
    Callback,
}

/// Main error enum for all aUSD protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AusdError {
    // ============ Authorization Errors ============
    /// Caller lacks the role required by the entry point
    MissingRole { role: Role, caller: AccountId },

    /// Caller lacks every role accepted by the entry point
    MissingAnyRole { roles: &'static [Role], caller: AccountId },

    /// Caller may not act on behalf of this ledger account
    NotAllowed { account: AccountId, caller: AccountId },

    /// Caller is neither owner nor delegate of the position
    PositionNotAllowed { position_id: PositionId, caller: AccountId },

    /// Caller was not granted migration permission by the account owner
    MigrationNotAllowed { owner: AccountId, caller: AccountId },

    // ============ Pool Errors ============
    /// Pool has not been initialised
    PoolNotInitialized { pool_id: PoolId },

    /// Pool was already initialised
    PoolAlreadyInitialized { pool_id: PoolId },

    /// Two positions or accounts belong to different pools
    NotSameCollateralPool { source: PoolId, destination: PoolId },

    /// Liquidation strategy for the pool is not this engine's strategy
    StrategyNotSet { pool_id: PoolId },

    /// Fee rate changes need the pool accrued up to the change
    StabilityFeeNotAccrued { pool_id: PoolId, accrued_to: u64, now: u64 },

    // ============ Ledger Invariants ============
    /// Pool debt would exceed its ceiling
    DebtCeilingExceeded { debt: Value, ceiling: Value },

    /// Total stablecoin issued would exceed the global ceiling
    TotalDebtCeilingExceeded { debt: Value, ceiling: Value },

    /// Position debt would exceed the per-position ceiling
    PositionDebtCeilingExceeded { debt: Value, ceiling: Value },

    /// Non-zero debt below the pool's debt floor
    DebtFloorNotMet { debt: Value, floor: Value },

    /// Worsening adjustment on a position without enough collateral value
    NotSafe { debt: Value, collateral_value: Value },

    /// Free or locked collateral too small for the operation
    InsufficientCollateral { available: Amount, requested: Amount },

    /// Stablecoin balance too small for the operation
    InsufficientStablecoin { available: Value, requested: Value },

    /// Debt share too small for the operation
    InsufficientDebtShare { available: Amount, requested: Amount },

    /// System bad debt too small for the operation
    InsufficientBadDebt { available: Value, requested: Value },

    /// Surplus cannot leave while bad debt is outstanding
    OutstandingBadDebt { bad_debt: Value },

    /// External token balance or allowance too small
    InsufficientTokenBalance { available: Amount, requested: Amount },

    // ============ Position Errors ============
    /// Position id was never allocated
    PositionNotFound { position_id: PositionId },

    /// Position is safe and cannot be liquidated
    PositionIsSafe { pool_id: PoolId, account: AccountId },

    /// Liquidation computed an empty seizure
    NothingToLiquidate,

    /// Position debt did not move by the confiscated share
    LiquidationMismatch { expected: Amount, actual: Amount },

    /// Position still carries debt
    DebtShareNotZero { debt_share: Amount },

    /// Source and destination of a position move are the same
    SamePosition { account: AccountId },

    /// Pool has no outstanding debt left to settle
    NoDebtToSettle { pool_id: PoolId },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Zero amount not allowed
    ZeroAmount,

    /// Invalid address (e.g., zero address)
    InvalidAddress { reason: &'static str },

    /// Parameter outside its accepted bounds
    InvalidParameter { param: &'static str, reason: &'static str },

    // ============ State Machine Errors ============
    /// Component is caged
    NotLive,

    /// Operation only valid after the system was caged
    StillLive,

    /// Pool already has a cage price
    PoolAlreadyCaged { pool_id: PoolId },

    /// Pool has no cage price yet
    CagePriceNotDefined { pool_id: PoolId },

    /// Debt was already finalized
    DebtAlreadyFinalized,

    /// Debt is not finalized yet
    DebtNotFinalized,

    /// Cash price for the pool was already computed
    CashPriceAlreadyDefined { pool_id: PoolId },

    /// Cash price for the pool is not computed yet
    CashPriceNotDefined { pool_id: PoolId },

    /// Cage cooldown has not elapsed
    CooldownNotElapsed { now: u64, available_at: u64 },

    /// System debt engine still holds surplus stablecoin
    SurplusNotSettled { surplus: Value },

    /// Caller has not accumulated enough stablecoin for the redemption
    InsufficientAccumulatedStablecoin { accumulated: Amount, requested: Amount },

    // ============ External Data Errors ============
    /// Price feed reported the price as invalid
    InvalidPrice { pool_id: PoolId },

    /// Price feed reported a zero price
    PriceNotPositive { pool_id: PoolId },

    // ============ Callback Errors ============
    /// Flash-lending callee returned an error
    FlashCallbackFailed { reason: &'static str },

    /// Flash-lending callee left too little stablecoin with the strategy
    InsufficientRepayment { expected: Amount, received: Amount },
}

impl AusdError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRole { .. } => "E001_MISSING_ROLE",
            Self::MissingAnyRole { .. } => "E002_MISSING_ANY_ROLE",
            Self::NotAllowed { .. } => "E003_NOT_ALLOWED",
            Self::PositionNotAllowed { .. } => "E004_POSITION_NOT_ALLOWED",
            Self::MigrationNotAllowed { .. } => "E005_MIGRATION_NOT_ALLOWED",
            Self::PoolNotInitialized { .. } => "E010_POOL_NOT_INIT",
            Self::PoolAlreadyInitialized { .. } => "E011_POOL_EXISTS",
            Self::NotSameCollateralPool { .. } => "E012_NOT_SAME_POOL",
            Self::StrategyNotSet { .. } => "E013_STRATEGY_NOT_SET",
            Self::StabilityFeeNotAccrued { .. } => "E014_FEE_NOT_ACCRUED",
            Self::DebtCeilingExceeded { .. } => "E020_CEILING_EXCEEDED",
            Self::TotalDebtCeilingExceeded { .. } => "E021_TOTAL_CEILING_EXCEEDED",
            Self::PositionDebtCeilingExceeded { .. } => "E022_POSITION_CEILING_EXCEEDED",
            Self::DebtFloorNotMet { .. } => "E023_DEBT_FLOOR",
            Self::NotSafe { .. } => "E024_NOT_SAFE",
            Self::InsufficientCollateral { .. } => "E025_INSUFFICIENT_COLL",
            Self::InsufficientStablecoin { .. } => "E026_INSUFFICIENT_STABLECOIN",
            Self::InsufficientDebtShare { .. } => "E027_INSUFFICIENT_DEBT_SHARE",
            Self::InsufficientBadDebt { .. } => "E028_INSUFFICIENT_BAD_DEBT",
            Self::InsufficientTokenBalance { .. } => "E029_INSUFFICIENT_TOKEN",
            Self::OutstandingBadDebt { .. } => "E035_OUTSTANDING_BAD_DEBT",
            Self::PositionNotFound { .. } => "E030_POSITION_NOT_FOUND",
            Self::PositionIsSafe { .. } => "E031_POSITION_SAFE",
            Self::NothingToLiquidate => "E032_NOTHING_TO_LIQ",
            Self::LiquidationMismatch { .. } => "E033_LIQ_MISMATCH",
            Self::DebtShareNotZero { .. } => "E034_DEBT_SHARE_NOT_ZERO",
            Self::SamePosition { .. } => "E036_SAME_POSITION",
            Self::NoDebtToSettle { .. } => "E037_NO_DEBT_TO_SETTLE",
            Self::Overflow => "E040_OVERFLOW",
            Self::Underflow => "E041_UNDERFLOW",
            Self::DivisionByZero => "E042_DIV_ZERO",
            Self::ZeroAmount => "E050_ZERO_AMOUNT",
            Self::InvalidAddress { .. } => "E051_INVALID_ADDRESS",
            Self::InvalidParameter { .. } => "E052_INVALID_PARAM",
            Self::NotLive => "E060_NOT_LIVE",
            Self::StillLive => "E061_STILL_LIVE",
            Self::PoolAlreadyCaged { .. } => "E062_POOL_CAGED",
            Self::CagePriceNotDefined { .. } => "E063_CAGE_PRICE_UNDEFINED",
            Self::DebtAlreadyFinalized => "E064_DEBT_FINALIZED",
            Self::DebtNotFinalized => "E065_DEBT_NOT_FINALIZED",
            Self::CashPriceAlreadyDefined { .. } => "E066_CASH_PRICE_DEFINED",
            Self::CashPriceNotDefined { .. } => "E067_CASH_PRICE_UNDEFINED",
            Self::CooldownNotElapsed { .. } => "E068_COOLDOWN",
            Self::SurplusNotSettled { .. } => "E069_SURPLUS_NOT_SETTLED",
            Self::InsufficientAccumulatedStablecoin { .. } => "E070_INSUFFICIENT_ACCUMULATED",
            Self::InvalidPrice { .. } => "E080_INVALID_PRICE",
            Self::PriceNotPositive { .. } => "E081_PRICE_NOT_POSITIVE",
            Self::FlashCallbackFailed { .. } => "E090_FLASH_CALLBACK_FAIL",
            Self::InsufficientRepayment { .. } => "E091_INSUFFICIENT_REPAYMENT",
        }
    }

    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingRole { .. }
            | Self::MissingAnyRole { .. }
            | Self::NotAllowed { .. }
            | Self::PositionNotAllowed { .. }
            | Self::MigrationNotAllowed { .. } => ErrorKind::Authorization,

            Self::NotLive
            | Self::StillLive
            | Self::PoolAlreadyCaged { .. }
            | Self::CagePriceNotDefined { .. }
            | Self::DebtAlreadyFinalized
            | Self::DebtNotFinalized
            | Self::CashPriceAlreadyDefined { .. }
            | Self::CashPriceNotDefined { .. }
            | Self::CooldownNotElapsed { .. }
            | Self::SurplusNotSettled { .. }
            | Self::NoDebtToSettle { .. }
            | Self::StabilityFeeNotAccrued { .. }
            | Self::PoolNotInitialized { .. }
            | Self::PoolAlreadyInitialized { .. } => ErrorKind::StateMachine,

            Self::InvalidPrice { .. } | Self::PriceNotPositive { .. } => ErrorKind::ExternalData,

            Self::FlashCallbackFailed { .. } | Self::InsufficientRepayment { .. } => {
                ErrorKind::Callback
            }

            _ => ErrorKind::Invariant,
        }
    }

    /// Returns true if retrying later can succeed without user action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrice { .. }
                | Self::PriceNotPositive { .. }
                | Self::CooldownNotElapsed { .. }
        )
    }
}

impl fmt::Display for AusdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.code(), self)
    }
}

impl std::error::Error for AusdError {}

/// Shorthand for "price was not usable" errors shared by every consumer of a feed
pub fn check_feed_price(pool_id: PoolId, price: Rate, ok: bool) -> AusdResult<Rate> {
    if !ok {
        return Err(AusdError::InvalidPrice { pool_id });
    }
    if price.is_zero() {
        return Err(AusdError::PriceNotPositive { pool_id });
    }
    Ok(price)
}
