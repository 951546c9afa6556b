//! Protocol Events for aUSD
//!
//! Events are emitted during execution and can be indexed off-chain.
//! Each component keeps its own `EventLog`; a failed operation never leaves
//! an event behind because the log is part of the restored state.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::math::{Amount, Rate, Value};
use crate::types::{AccountId, PoolId, PositionId};

/// Component affected by a cage / uncage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum Component {
    BookKeeper = 0,
    LiquidationEngine = 1,
    SystemDebtEngine = 2,
    PriceOracle = 3,
    ShowStopper = 4,
}

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    PositionOpened = 0x01,
    PositionAdjusted = 0x02,
    PositionMoved = 0x03,
    PositionExported = 0x04,
    PositionImported = 0x05,
    ManagePermissionChanged = 0x06,
    MigratePermissionChanged = 0x07,

    // Ledger Events (0x20 - 0x3F)
    CollateralPoolInitialized = 0x20,
    PoolParameterChanged = 0x21,
    StabilityFeeAccrued = 0x22,
    PositionConfiscated = 0x23,
    BadDebtSettled = 0x24,
    AccountWhitelisted = 0x25,
    SurplusWithdrawn = 0x26,

    // Token Events (0x40 - 0x5F)
    TokenTransfer = 0x40,
    TokenMint = 0x41,
    TokenBurn = 0x42,
    TokenApproval = 0x43,

    // Oracle Events (0x60 - 0x6F)
    PriceUpdated = 0x60,
    ReferencePriceUpdated = 0x61,

    // Liquidation Events (0x70 - 0x7F)
    LiquidationExecuted = 0x70,

    // Settlement Events (0x80 - 0x9F)
    SystemCaged = 0x80,
    SystemUncaged = 0x81,
    PoolCaged = 0x82,
    BadDebtAccumulated = 0x83,
    LockedCollateralRedeemed = 0x84,
    DebtFinalized = 0x85,
    CashPriceFinalized = 0x86,
    StablecoinAccumulated = 0x87,
    StablecoinRedeemed = 0x88,
}

/// Main event enum containing all observable protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AusdEvent {
    // ============ Position Events ============

    /// A position manager allocated a new position
    PositionOpened {
        position_id: PositionId,
        pool_id: PoolId,
        owner: AccountId,
        account: AccountId,
    },

    /// Collateral and / or debt of a position changed
    PositionAdjusted {
        pool_id: PoolId,
        account: AccountId,
        collateral_delta: i128,
        debt_share_delta: i128,
        locked_collateral: Amount,
        debt_share: Amount,
    },

    /// Collateral and debt moved between two positions of a pool
    PositionMoved {
        pool_id: PoolId,
        source: AccountId,
        destination: AccountId,
        collateral_delta: i128,
        debt_share_delta: i128,
    },

    /// A managed position was moved out to an external account
    PositionExported {
        position_id: PositionId,
        destination: AccountId,
    },

    /// An external position was merged into a managed position
    PositionImported {
        position_id: PositionId,
        source: AccountId,
    },

    /// Owner granted or revoked a delegate on one position
    ManagePermissionChanged {
        owner: AccountId,
        position_id: PositionId,
        delegate: AccountId,
        allowed: bool,
    },

    /// Account granted or revoked migration rights
    MigratePermissionChanged {
        owner: AccountId,
        migrant: AccountId,
        allowed: bool,
    },

    // ============ Ledger Events ============

    /// Pool created with its initial parameters
    CollateralPoolInitialized {
        pool_id: PoolId,
        debt_ceiling: Value,
        timestamp: u64,
    },

    /// Governance changed a pool parameter
    PoolParameterChanged {
        pool_id: PoolId,
        parameter: String,
    },

    /// Stability fee accrued on a pool
    StabilityFeeAccrued {
        pool_id: PoolId,
        debt_accumulated_rate: Rate,
        fee_value: Value,
        timestamp: u64,
    },

    /// Collateral and debt seized from a position
    PositionConfiscated {
        pool_id: PoolId,
        account: AccountId,
        collateral_creditor: AccountId,
        debt_debtor: AccountId,
        collateral_seized: Amount,
        debt_share_seized: Amount,
        bad_debt: Value,
    },

    /// An account cancelled bad debt against its own stablecoin
    BadDebtSettled {
        account: AccountId,
        value: Value,
    },

    /// Ledger-level delegation changed
    AccountWhitelisted {
        account: AccountId,
        delegate: AccountId,
        allowed: bool,
    },

    /// Surplus left the system debt engine
    SurplusWithdrawn {
        recipient: AccountId,
        stablecoin: Value,
        collateral: Amount,
    },

    // ============ Token Events ============

    TokenTransfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },

    TokenMint {
        to: AccountId,
        amount: Amount,
        new_total_supply: Amount,
    },

    TokenBurn {
        from: AccountId,
        amount: Amount,
        new_total_supply: Amount,
    },

    TokenApproval {
        owner: AccountId,
        spender: AccountId,
        amount: Amount,
    },

    // ============ Oracle Events ============

    /// Price with safety margin written to a pool
    PriceUpdated {
        pool_id: PoolId,
        feed_price: Rate,
        price_with_safety_margin: Rate,
        valid: bool,
    },

    ReferencePriceUpdated {
        reference_price: Rate,
    },

    // ============ Liquidation Events ============

    /// Fixed-spread liquidation completed
    LiquidationExecuted {
        pool_id: PoolId,
        account: AccountId,
        liquidator: AccountId,
        debt_share_liquidated: Amount,
        debt_value_repaid: Value,
        collateral_seized: Amount,
        collateral_to_liquidator: Amount,
        collateral_to_treasury: Amount,
        bad_debt: Value,
        flash: bool,
        timestamp: u64,
    },

    // ============ Settlement Events ============

    SystemCaged {
        component: Component,
    },

    SystemUncaged {
        component: Component,
    },

    /// Cage price fixed for a pool
    PoolCaged {
        pool_id: PoolId,
        cage_price: Rate,
        total_debt_share: Amount,
    },

    /// Position debt absorbed during settlement
    BadDebtAccumulated {
        pool_id: PoolId,
        account: AccountId,
        collateral_seized: Amount,
        debt_share: Amount,
        shortfall: Amount,
    },

    LockedCollateralRedeemed {
        pool_id: PoolId,
        account: AccountId,
        recipient: AccountId,
        amount: Amount,
    },

    DebtFinalized {
        debt: Value,
        timestamp: u64,
    },

    CashPriceFinalized {
        pool_id: PoolId,
        final_cash_price: Rate,
    },

    StablecoinAccumulated {
        account: AccountId,
        amount: Amount,
        total: Amount,
    },

    StablecoinRedeemed {
        pool_id: PoolId,
        account: AccountId,
        amount: Amount,
        collateral: Amount,
    },
}

impl AusdEvent {
    /// Get the event type for indexing
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PositionOpened { .. } => EventType::PositionOpened,
            Self::PositionAdjusted { .. } => EventType::PositionAdjusted,
            Self::PositionMoved { .. } => EventType::PositionMoved,
            Self::PositionExported { .. } => EventType::PositionExported,
            Self::PositionImported { .. } => EventType::PositionImported,
            Self::ManagePermissionChanged { .. } => EventType::ManagePermissionChanged,
            Self::MigratePermissionChanged { .. } => EventType::MigratePermissionChanged,
            Self::CollateralPoolInitialized { .. } => EventType::CollateralPoolInitialized,
            Self::PoolParameterChanged { .. } => EventType::PoolParameterChanged,
            Self::StabilityFeeAccrued { .. } => EventType::StabilityFeeAccrued,
            Self::PositionConfiscated { .. } => EventType::PositionConfiscated,
            Self::BadDebtSettled { .. } => EventType::BadDebtSettled,
            Self::AccountWhitelisted { .. } => EventType::AccountWhitelisted,
            Self::SurplusWithdrawn { .. } => EventType::SurplusWithdrawn,
            Self::TokenTransfer { .. } => EventType::TokenTransfer,
            Self::TokenMint { .. } => EventType::TokenMint,
            Self::TokenBurn { .. } => EventType::TokenBurn,
            Self::TokenApproval { .. } => EventType::TokenApproval,
            Self::PriceUpdated { .. } => EventType::PriceUpdated,
            Self::ReferencePriceUpdated { .. } => EventType::ReferencePriceUpdated,
            Self::LiquidationExecuted { .. } => EventType::LiquidationExecuted,
            Self::SystemCaged { .. } => EventType::SystemCaged,
            Self::SystemUncaged { .. } => EventType::SystemUncaged,
            Self::PoolCaged { .. } => EventType::PoolCaged,
            Self::BadDebtAccumulated { .. } => EventType::BadDebtAccumulated,
            Self::LockedCollateralRedeemed { .. } => EventType::LockedCollateralRedeemed,
            Self::DebtFinalized { .. } => EventType::DebtFinalized,
            Self::CashPriceFinalized { .. } => EventType::CashPriceFinalized,
            Self::StablecoinAccumulated { .. } => EventType::StablecoinAccumulated,
            Self::StablecoinRedeemed { .. } => EventType::StablecoinRedeemed,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events emitted by one component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<AusdEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: AusdEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[AusdEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<AusdEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&AusdEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<&AusdEvent> {
        self.events.last()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return every event emitted so far
    pub fn drain(&mut self) -> Vec<AusdEvent> {
        core::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = AusdEvent::PositionOpened {
            position_id: PositionId(1),
            pool_id: PoolId::from_symbol("WBTC"),
            owner: AccountId::from_label("alice"),
            account: AccountId::from_label("position"),
        };

        assert_eq!(event.event_type(), EventType::PositionOpened);
    }

    #[test]
    fn test_event_serialization() {
        let event = AusdEvent::StabilityFeeAccrued {
            pool_id: PoolId::from_symbol("WETH"),
            debt_accumulated_rate: Rate::from_ratio(21, 20),
            fee_value: Value::from_units(50),
            timestamp: 1_000,
        };

        let bytes = event.to_bytes();
        let restored = AusdEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();

        log.emit(AusdEvent::SystemCaged { component: Component::BookKeeper });
        log.emit(AusdEvent::TokenMint {
            to: AccountId::from_label("alice"),
            amount: Amount::from_units(100),
            new_total_supply: Amount::from_units(100),
        });

        assert_eq!(log.len(), 2);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::SystemCaged).len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }
}
