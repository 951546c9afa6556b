//! Price oracle
//!
//! Reads each pool's feed and writes the ledger's `price_with_safety_margin`.

use tracing::{info, warn};

use ausd_book_keeper::BookKeeper;
use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, Component, EventLog},
    require_owner_or_gov, require_owner_or_show_stopper, AccountId, PoolId, Rate,
    SharedAccessControl,
};

#[derive(Debug, Clone)]
pub struct PriceOracle {
    access: SharedAccessControl,
    /// Ledger identity; must hold the `PriceOracle` role
    account: AccountId,
    live: bool,
    /// Stablecoin price in the feeds' quote currency, 1.0 by default
    stablecoin_reference_price: Rate,
    events: EventLog,
}

impl PriceOracle {
    pub fn new(access: SharedAccessControl, account: AccountId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "price oracle account is zero" });
        }
        Ok(Self {
            access,
            account,
            live: true,
            stablecoin_reference_price: Rate::ONE,
            events: EventLog::new(),
        })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn stablecoin_reference_price(&self) -> Rate {
        self.stablecoin_reference_price
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Refresh one pool's price with safety margin; anyone may poke
    ///
    /// Returns the price written to the ledger.
    pub fn set_price(&mut self, book_keeper: &mut BookKeeper, pool_id: &PoolId) -> AusdResult<Rate> {
        // 1. Read pool and feed
        let pool = book_keeper.pool_config().pool(pool_id)?;
        let liquidation_ratio = pool.params.liquidation_ratio;
        let (feed_price, valid) = book_keeper.pool_config().price_feed(pool_id)?.peek_price();

        // 2. feed / reference / liquidation ratio, zero when unusable
        let price = if valid && !feed_price.is_zero() {
            feed_price
                .rdiv(self.stablecoin_reference_price)?
                .rdiv(liquidation_ratio)?
        } else {
            warn!(%pool_id, %feed_price, valid, "feed price unusable, zeroing pool price");
            Rate::ZERO
        };

        // 3. Write to ledger
        book_keeper
            .pool_config_mut()
            .set_price_with_safety_margin(&self.account, pool_id, price)?;

        self.events.emit(AusdEvent::PriceUpdated {
            pool_id: *pool_id,
            feed_price,
            price_with_safety_margin: price,
            valid,
        });
        Ok(price)
    }

    pub fn set_stablecoin_reference_price(&mut self, caller: &AccountId, price: Rate) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        if !self.live {
            return Err(AusdError::NotLive);
        }
        if price.is_zero() {
            return Err(AusdError::InvalidParameter {
                param: "stablecoin_reference_price",
                reason: "must be positive",
            });
        }
        self.stablecoin_reference_price = price;
        info!(%price, "stablecoin reference price set");
        self.events.emit(AusdEvent::ReferencePriceUpdated { reference_price: price });
        Ok(())
    }

    pub fn cage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if self.live {
            self.live = false;
            info!("price oracle caged");
            self.events.emit(AusdEvent::SystemCaged { component: Component::PriceOracle });
        }
        Ok(())
    }

    pub fn uncage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if !self.live {
            self.live = true;
            info!("price oracle uncaged");
            self.events.emit(AusdEvent::SystemUncaged { component: Component::PriceOracle });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SimplePriceFeed;
    use ausd_book_keeper::CollateralPoolParams;
    use ausd_common::{AccessControlConfig, Role};
    use std::sync::Arc;

    struct Setup {
        oracle: PriceOracle,
        book_keeper: BookKeeper,
        feed: Arc<SimplePriceFeed>,
        owner: AccountId,
        operator: AccountId,
        pool: PoolId,
    }

    fn setup() -> Setup {
        let owner = AccountId::from_label("owner");
        let operator = AccountId::from_label("feed-operator");
        let oracle_account = AccountId::from_label("price-oracle");
        let pool = PoolId::from_symbol("WBTC");

        let access = Arc::new(AccessControlConfig::new(owner));
        access.grant_role(&owner, Role::PriceOracle, oracle_account).unwrap();

        let feed = Arc::new(SimplePriceFeed::new(operator, Rate::from_units(30), 0).unwrap());
        let mut book_keeper = BookKeeper::new(access.clone(), AccountId::from_label("sde")).unwrap();
        let params = CollateralPoolParams { liquidation_ratio: Rate::from_bps(15_000), ..Default::default() };
        book_keeper
            .pool_config_mut()
            .init_collateral_pool(&owner, pool, params, feed.clone(), 0)
            .unwrap();

        Setup {
            oracle: PriceOracle::new(access, oracle_account).unwrap(),
            book_keeper,
            feed,
            owner,
            operator,
            pool,
        }
    }

    #[test]
    fn test_set_price_applies_safety_margin() {
        let mut s = setup();
        let price = s.oracle.set_price(&mut s.book_keeper, &s.pool).unwrap();

        // 30 / 1.0 / 1.5
        assert_eq!(price, Rate::from_units(20));
        assert_eq!(
            s.book_keeper.pool_config().pool(&s.pool).unwrap().price_with_safety_margin,
            Rate::from_units(20)
        );
        assert_eq!(s.oracle.events().len(), 1);
    }

    #[test]
    fn test_reference_price_scales_result() {
        let mut s = setup();
        s.oracle.set_stablecoin_reference_price(&s.owner, Rate::from_units(2)).unwrap();
        let price = s.oracle.set_price(&mut s.book_keeper, &s.pool).unwrap();
        assert_eq!(price, Rate::from_units(10));
    }

    #[test]
    fn test_invalid_feed_zeroes_price() {
        let mut s = setup();
        s.oracle.set_price(&mut s.book_keeper, &s.pool).unwrap();
        s.feed.set_price(&s.operator, Rate::from_units(30), false, 1).unwrap();

        let price = s.oracle.set_price(&mut s.book_keeper, &s.pool).unwrap();
        assert!(price.is_zero());
        assert!(s.book_keeper.pool_config().pool(&s.pool).unwrap().price_with_safety_margin.is_zero());
    }

    #[test]
    fn test_oracle_needs_role() {
        let mut s = setup();
        let access = Arc::new(AccessControlConfig::new(s.owner));
        let mut rogue = PriceOracle::new(access, AccountId::from_label("rogue")).unwrap();
        let result = rogue.set_price(&mut s.book_keeper, &s.pool);
        assert!(matches!(result, Err(AusdError::MissingRole { role: Role::PriceOracle, .. })));
    }

    #[test]
    fn test_cage_blocks_reference_price() {
        let mut s = setup();
        let stranger = AccountId::from_label("stranger");
        assert!(s.oracle.cage(&stranger).is_err());

        s.oracle.cage(&s.owner).unwrap();
        s.oracle.cage(&s.owner).unwrap();
        assert!(!s.oracle.live());
        assert_eq!(
            s.oracle.set_stablecoin_reference_price(&s.owner, Rate::ONE),
            Err(AusdError::NotLive)
        );

        s.oracle.uncage(&s.owner).unwrap();
        assert!(s.oracle.live());
    }

    #[test]
    fn test_unknown_pool() {
        let mut s = setup();
        let result = s.oracle.set_price(&mut s.book_keeper, &PoolId::from_symbol("ETH"));
        assert!(matches!(result, Err(AusdError::PoolNotInitialized { .. })));
    }
}
