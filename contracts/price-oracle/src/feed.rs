//! Operator-updated price feed

use std::sync::{PoisonError, RwLock};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ausd_common::{
    errors::{AusdError, AusdResult},
    AccountId, PriceFeed, Rate,
};

/// Last value pushed by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeedReading {
    pub price: Rate,
    pub valid: bool,
    /// Time of the update, as passed by the operator
    pub updated_at: u64,
}

/// Feed whose price is pushed by a single trusted operator
///
/// Shared between the pool configuration and the operator through an
/// `Arc`, so updates go through an interior lock.
#[derive(Debug)]
pub struct SimplePriceFeed {
    operator: AccountId,
    reading: RwLock<FeedReading>,
}

impl SimplePriceFeed {
    /// Create a feed with an initial valid price
    pub fn new(operator: AccountId, price: Rate, now: u64) -> AusdResult<Self> {
        if operator.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "feed operator is zero" });
        }
        Ok(Self {
            operator,
            reading: RwLock::new(FeedReading { price, valid: true, updated_at: now }),
        })
    }

    pub fn operator(&self) -> AccountId {
        self.operator
    }

    pub fn reading(&self) -> FeedReading {
        *self.reading.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a new price; operator only
    pub fn set_price(&self, caller: &AccountId, price: Rate, valid: bool, now: u64) -> AusdResult<()> {
        if *caller != self.operator {
            return Err(AusdError::NotAllowed { account: self.operator, caller: *caller });
        }
        let mut reading = self.reading.write().unwrap_or_else(PoisonError::into_inner);
        *reading = FeedReading { price, valid, updated_at: now };
        debug!(%price, valid, now, "feed price pushed");
        Ok(())
    }
}

impl PriceFeed for SimplePriceFeed {
    fn peek_price(&self) -> (Rate, bool) {
        let reading = self.reading();
        (reading.price, reading.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_updates_price() {
        let operator = AccountId::from_label("operator");
        let feed = SimplePriceFeed::new(operator, Rate::from_units(100), 1).unwrap();
        assert_eq!(feed.peek_price(), (Rate::from_units(100), true));

        feed.set_price(&operator, Rate::from_units(90), false, 2).unwrap();
        assert_eq!(feed.peek_price(), (Rate::from_units(90), false));
        assert_eq!(feed.reading().updated_at, 2);
    }

    #[test]
    fn test_update_price_unauthorized() {
        let operator = AccountId::from_label("operator");
        let feed = SimplePriceFeed::new(operator, Rate::from_units(100), 1).unwrap();

        let result = feed.set_price(&AccountId::from_label("mallory"), Rate::ONE, true, 2);
        assert!(matches!(result, Err(AusdError::NotAllowed { .. })));
        assert_eq!(feed.peek_price().0, Rate::from_units(100));
    }

    #[test]
    fn test_zero_operator_rejected() {
        assert!(SimplePriceFeed::new(AccountId::ZERO, Rate::ONE, 0).is_err());
    }
}
