//! Collateral Pool Registry
//!
//! Per-pool risk parameters plus the two fields the ledger writes while
//! accruing fees and adjusting positions (`debt_accumulated_rate` and
//! `total_debt_share`). Governance writes parameters, the price oracle writes
//! `price_with_safety_margin`, and nothing caches a pool across operations.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ausd_common::{
    constants::{fees, liquidation},
    errors::{AusdError, AusdResult},
    events::{AusdEvent, EventLog},
    require_owner_or_gov, require_role, AccountId, Amount, PoolId, Rate, Role,
    SharedAccessControl, SharedPriceFeed, Value,
};

// ============ Parameters ============

/// Governance-controlled risk parameters of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralPoolParams {
    /// Maximum pool debt value
    pub debt_ceiling: Value,
    /// Minimum non-zero position debt value
    pub debt_floor: Value,
    /// Maximum debt value of a single position
    pub position_debt_ceiling: Value,
    /// Collateral value required per unit of debt (1.5 = 150%)
    pub liquidation_ratio: Rate,
    /// Per-second compounding fee factor, at least 1.0
    pub stability_fee_rate: Rate,
    /// Share of a position's debt one liquidation may repay
    pub close_factor_bps: u64,
    /// Collateral paid per unit of repaid debt (10500 = 5% bonus)
    pub liquidator_incentive_bps: u64,
    /// Cut of the seized collateral routed to the system debt engine
    pub treasury_fees_bps: u64,
    /// Collateral token adapter
    pub adapter: AccountId,
    /// Liquidation strategy
    pub strategy: AccountId,
}

impl Default for CollateralPoolParams {
    fn default() -> Self {
        Self {
            debt_ceiling: Value::from_units(10_000_000),
            debt_floor: Value::from_units(100),
            position_debt_ceiling: Value::from_units(1_000_000),
            liquidation_ratio: Rate::from_ratio(3, 2),
            stability_fee_rate: Rate::ONE,
            close_factor_bps: liquidation::DEFAULT_CLOSE_FACTOR_BPS,
            liquidator_incentive_bps: liquidation::DEFAULT_LIQUIDATOR_INCENTIVE_BPS,
            treasury_fees_bps: liquidation::DEFAULT_TREASURY_FEES_BPS,
            adapter: AccountId::ZERO,
            strategy: AccountId::ZERO,
        }
    }
}

impl CollateralPoolParams {
    /// Checks every bound a pool must satisfy
    pub fn validate(&self) -> AusdResult<()> {
        if self.close_factor_bps == 0 || self.close_factor_bps > fees::BPS_DENOMINATOR {
            return Err(AusdError::InvalidParameter {
                param: "close_factor_bps",
                reason: "must be in (0, 10000]",
            });
        }
        if self.liquidator_incentive_bps < fees::BPS_DENOMINATOR
            || self.liquidator_incentive_bps > fees::MAX_LIQUIDATOR_INCENTIVE_BPS
        {
            return Err(AusdError::InvalidParameter {
                param: "liquidator_incentive_bps",
                reason: "must be in [10000, 19000]",
            });
        }
        if self.treasury_fees_bps > self.liquidator_incentive_bps - fees::BPS_DENOMINATOR {
            return Err(AusdError::InvalidParameter {
                param: "treasury_fees_bps",
                reason: "must not exceed the incentive margin",
            });
        }
        if self.liquidation_ratio < Rate::ONE {
            return Err(AusdError::InvalidParameter {
                param: "liquidation_ratio",
                reason: "must be at least 1.0",
            });
        }
        if self.stability_fee_rate < Rate::ONE {
            return Err(AusdError::InvalidParameter {
                param: "stability_fee_rate",
                reason: "must be at least 1.0",
            });
        }
        if self.debt_floor > self.position_debt_ceiling {
            return Err(AusdError::InvalidParameter {
                param: "debt_floor",
                reason: "must not exceed position_debt_ceiling",
            });
        }
        Ok(())
    }
}

// ============ Pool State ============

/// One collateral pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralPool {
    pub pool_id: PoolId,
    pub params: CollateralPoolParams,
    /// Feed price / reference price / liquidation ratio; zero while the feed is invalid
    pub price_with_safety_margin: Rate,
    /// Compounded stability fee since initialisation; never decreases
    pub debt_accumulated_rate: Rate,
    /// Sum of every position's debt share
    pub total_debt_share: Amount,
    pub last_accumulation_time: u64,
}

impl CollateralPool {
    /// Total pool debt at the current rate
    pub fn total_debt_value(&self) -> AusdResult<Value> {
        self.total_debt_share.mul_rate(self.debt_accumulated_rate)
    }

    /// Rate after compounding the fee up to `now`; unchanged if `now` is not later
    pub fn accrued_rate(&self, now: u64) -> AusdResult<Rate> {
        if now <= self.last_accumulation_time {
            return Ok(self.debt_accumulated_rate);
        }
        let elapsed = now - self.last_accumulation_time;
        self.params
            .stability_fee_rate
            .rpow(elapsed)?
            .rmul(self.debt_accumulated_rate)
    }
}

// ============ Registry ============

/// Registry of every collateral pool
#[derive(Debug, Clone)]
pub struct CollateralPoolConfig {
    access: SharedAccessControl,
    pools: BTreeMap<PoolId, CollateralPool>,
    price_feeds: BTreeMap<PoolId, SharedPriceFeed>,
    events: EventLog,
}

impl CollateralPoolConfig {
    pub fn new(access: SharedAccessControl) -> Self {
        Self {
            access,
            pools: BTreeMap::new(),
            price_feeds: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    /// Registers a new pool; owner only
    pub fn init_collateral_pool(
        &mut self,
        caller: &AccountId,
        pool_id: PoolId,
        params: CollateralPoolParams,
        price_feed: SharedPriceFeed,
        now: u64,
    ) -> AusdResult<()> {
        // 1. Authorization
        require_role(self.access.as_ref(), Role::Owner, caller)?;

        // 2. Identity
        if pool_id.is_zero() {
            return Err(AusdError::InvalidParameter { param: "pool_id", reason: "zero pool id" });
        }
        if self.pools.contains_key(&pool_id) {
            return Err(AusdError::PoolAlreadyInitialized { pool_id });
        }

        // 3. Bounds
        params.validate()?;

        let debt_ceiling = params.debt_ceiling;
        self.pools.insert(
            pool_id,
            CollateralPool {
                pool_id,
                params,
                price_with_safety_margin: Rate::ZERO,
                debt_accumulated_rate: Rate::ONE,
                total_debt_share: Amount::ZERO,
                last_accumulation_time: now,
            },
        );
        self.price_feeds.insert(pool_id, price_feed);

        info!(%pool_id, %debt_ceiling, "collateral pool initialised");
        self.events.emit(AusdEvent::CollateralPoolInitialized {
            pool_id,
            debt_ceiling,
            timestamp: now,
        });
        Ok(())
    }

    // ============ Queries ============

    pub fn is_initialized(&self, pool_id: &PoolId) -> bool {
        self.pools.contains_key(pool_id)
    }

    pub fn pool(&self, pool_id: &PoolId) -> AusdResult<&CollateralPool> {
        self.pools
            .get(pool_id)
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })
    }

    pub fn price_feed(&self, pool_id: &PoolId) -> AusdResult<SharedPriceFeed> {
        self.price_feeds
            .get(pool_id)
            .cloned()
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })
    }

    pub fn pool_ids(&self) -> impl Iterator<Item = &PoolId> {
        self.pools.keys()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Ledger-only write access to accrual fields
    pub(crate) fn pool_mut(&mut self, pool_id: &PoolId) -> AusdResult<&mut CollateralPool> {
        self.pools
            .get_mut(pool_id)
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })
    }

    // ============ Governance Setters ============

    fn update_params<F>(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        parameter: &'static str,
        apply: F,
    ) -> AusdResult<()>
    where
        F: FnOnce(&mut CollateralPoolParams),
    {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        let pool = self.pool_mut(pool_id)?;

        let mut candidate = pool.params.clone();
        apply(&mut candidate);
        candidate.validate()?;
        pool.params = candidate;

        debug!(%pool_id, parameter, "pool parameter updated");
        self.events.emit(AusdEvent::PoolParameterChanged {
            pool_id: *pool_id,
            parameter: parameter.to_string(),
        });
        Ok(())
    }

    pub fn set_debt_ceiling(&mut self, caller: &AccountId, pool_id: &PoolId, value: Value) -> AusdResult<()> {
        self.update_params(caller, pool_id, "debt_ceiling", |p| p.debt_ceiling = value)
    }

    pub fn set_debt_floor(&mut self, caller: &AccountId, pool_id: &PoolId, value: Value) -> AusdResult<()> {
        self.update_params(caller, pool_id, "debt_floor", |p| p.debt_floor = value)
    }

    pub fn set_position_debt_ceiling(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        value: Value,
    ) -> AusdResult<()> {
        self.update_params(caller, pool_id, "position_debt_ceiling", |p| {
            p.position_debt_ceiling = value
        })
    }

    pub fn set_liquidation_ratio(&mut self, caller: &AccountId, pool_id: &PoolId, ratio: Rate) -> AusdResult<()> {
        self.update_params(caller, pool_id, "liquidation_ratio", |p| p.liquidation_ratio = ratio)
    }

    /// The pool must already be accrued up to `now`, so the old rate covers
    /// everything before the change
    pub fn set_stability_fee_rate(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        rate: Rate,
        now: u64,
    ) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        let accrued_to = self.pool(pool_id)?.last_accumulation_time;
        if accrued_to != now {
            return Err(AusdError::StabilityFeeNotAccrued { pool_id: *pool_id, accrued_to, now });
        }
        self.update_params(caller, pool_id, "stability_fee_rate", |p| p.stability_fee_rate = rate)
    }

    pub fn set_close_factor_bps(&mut self, caller: &AccountId, pool_id: &PoolId, bps: u64) -> AusdResult<()> {
        self.update_params(caller, pool_id, "close_factor_bps", |p| p.close_factor_bps = bps)
    }

    pub fn set_liquidator_incentive_bps(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        bps: u64,
    ) -> AusdResult<()> {
        self.update_params(caller, pool_id, "liquidator_incentive_bps", |p| {
            p.liquidator_incentive_bps = bps
        })
    }

    pub fn set_treasury_fees_bps(&mut self, caller: &AccountId, pool_id: &PoolId, bps: u64) -> AusdResult<()> {
        self.update_params(caller, pool_id, "treasury_fees_bps", |p| p.treasury_fees_bps = bps)
    }

    pub fn set_adapter(&mut self, caller: &AccountId, pool_id: &PoolId, adapter: AccountId) -> AusdResult<()> {
        self.update_params(caller, pool_id, "adapter", |p| p.adapter = adapter)
    }

    pub fn set_strategy(&mut self, caller: &AccountId, pool_id: &PoolId, strategy: AccountId) -> AusdResult<()> {
        self.update_params(caller, pool_id, "strategy", |p| p.strategy = strategy)
    }

    pub fn set_price_feed(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        price_feed: SharedPriceFeed,
    ) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        self.pool(pool_id)?;
        self.price_feeds.insert(*pool_id, price_feed);
        self.events.emit(AusdEvent::PoolParameterChanged {
            pool_id: *pool_id,
            parameter: "price_feed".to_string(),
        });
        Ok(())
    }

    /// Written by the price oracle only
    pub fn set_price_with_safety_margin(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        price: Rate,
    ) -> AusdResult<()> {
        require_role(self.access.as_ref(), Role::PriceOracle, caller)?;
        let pool = self.pool_mut(pool_id)?;
        pool.price_with_safety_margin = price;
        debug!(%pool_id, %price, "price with safety margin set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ausd_common::{AccessControlConfig, FixedPriceFeed};
    use std::sync::Arc;

    fn setup() -> (CollateralPoolConfig, Arc<AccessControlConfig>, AccountId) {
        let owner = AccountId::from_label("owner");
        let access = Arc::new(AccessControlConfig::new(owner));
        (CollateralPoolConfig::new(access.clone()), access, owner)
    }

    fn feed() -> SharedPriceFeed {
        Arc::new(FixedPriceFeed(Rate::ONE))
    }

    #[test]
    fn test_init_pool() {
        let (mut config, _, owner) = setup();
        let pool_id = PoolId::from_symbol("WBTC");

        config
            .init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 100)
            .unwrap();

        let pool = config.pool(&pool_id).unwrap();
        assert_eq!(pool.debt_accumulated_rate, Rate::ONE);
        assert_eq!(pool.last_accumulation_time, 100);
        assert!(pool.total_debt_share.is_zero());

        let again = config.init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 100);
        assert_eq!(again, Err(AusdError::PoolAlreadyInitialized { pool_id }));
    }

    #[test]
    fn test_init_pool_requires_owner() {
        let (mut config, _, _) = setup();
        let stranger = AccountId::from_label("stranger");
        let result = config.init_collateral_pool(
            &stranger,
            PoolId::from_symbol("WETH"),
            CollateralPoolParams::default(),
            feed(),
            0,
        );
        assert!(matches!(result, Err(AusdError::MissingRole { role: Role::Owner, .. })));
    }

    #[test]
    fn test_bps_bounds() {
        let (mut config, access, owner) = setup();
        let gov = AccountId::from_label("gov");
        access.grant_role(&owner, Role::Gov, gov).unwrap();
        let pool_id = PoolId::from_symbol("WBTC");
        config
            .init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 0)
            .unwrap();

        assert!(config.set_close_factor_bps(&gov, &pool_id, 0).is_err());
        assert!(config.set_close_factor_bps(&gov, &pool_id, 10_001).is_err());
        assert!(config.set_close_factor_bps(&gov, &pool_id, 10_000).is_ok());

        assert!(config.set_liquidator_incentive_bps(&gov, &pool_id, 9_999).is_err());
        assert!(config.set_liquidator_incentive_bps(&gov, &pool_id, 19_001).is_err());

        // treasury cut must fit inside the 5% margin
        assert!(config.set_treasury_fees_bps(&gov, &pool_id, 501).is_err());
        assert!(config.set_treasury_fees_bps(&gov, &pool_id, 500).is_ok());

        // lowering the incentive below treasury + 10000 is rejected too
        assert!(config.set_liquidator_incentive_bps(&gov, &pool_id, 10_400).is_err());
        assert_eq!(config.pool(&pool_id).unwrap().params.liquidator_incentive_bps, 10_500);
    }

    #[test]
    fn test_ratio_and_floor_bounds() {
        let (mut config, _, owner) = setup();
        let pool_id = PoolId::from_symbol("WBTC");
        config
            .init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 0)
            .unwrap();

        assert!(config.set_liquidation_ratio(&owner, &pool_id, Rate::from_ratio(99, 100)).is_err());
        assert!(config.set_stability_fee_rate(&owner, &pool_id, Rate::from_ratio(99, 100), 0).is_err());
        assert!(config
            .set_debt_floor(&owner, &pool_id, Value::from_units(2_000_000))
            .is_err());
        assert!(config.set_debt_floor(&owner, &pool_id, Value::from_units(10)).is_ok());
    }

    #[test]
    fn test_fee_rate_change_needs_accrued_pool() {
        let (mut config, _, owner) = setup();
        let pool_id = PoolId::from_symbol("WBTC");
        config
            .init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 10)
            .unwrap();
        let rate = Rate::from_ratio(11, 10);

        assert_eq!(
            config.set_stability_fee_rate(&owner, &pool_id, rate, 25),
            Err(AusdError::StabilityFeeNotAccrued { pool_id, accrued_to: 10, now: 25 })
        );
        assert_eq!(config.pool(&pool_id).unwrap().params.stability_fee_rate, Rate::ONE);

        config.set_stability_fee_rate(&owner, &pool_id, rate, 10).unwrap();
        assert_eq!(config.pool(&pool_id).unwrap().params.stability_fee_rate, rate);
    }

    #[test]
    fn test_price_requires_oracle_role() {
        let (mut config, access, owner) = setup();
        let oracle = AccountId::from_label("oracle");
        let pool_id = PoolId::from_symbol("WBTC");
        config
            .init_collateral_pool(&owner, pool_id, CollateralPoolParams::default(), feed(), 0)
            .unwrap();

        assert!(config.set_price_with_safety_margin(&owner, &pool_id, Rate::ONE).is_err());
        access.grant_role(&owner, Role::PriceOracle, oracle).unwrap();
        config.set_price_with_safety_margin(&oracle, &pool_id, Rate::ONE).unwrap();
        assert_eq!(config.pool(&pool_id).unwrap().price_with_safety_margin, Rate::ONE);
    }

    #[test]
    fn test_accrued_rate() {
        let (mut config, _, owner) = setup();
        let pool_id = PoolId::from_symbol("WBTC");
        let params = CollateralPoolParams {
            stability_fee_rate: Rate::from_ratio(11, 10),
            ..CollateralPoolParams::default()
        };
        config.init_collateral_pool(&owner, pool_id, params, feed(), 10).unwrap();

        let pool = config.pool(&pool_id).unwrap();
        assert_eq!(pool.accrued_rate(10).unwrap(), Rate::ONE);
        assert_eq!(pool.accrued_rate(5).unwrap(), Rate::ONE);
        assert_eq!(pool.accrued_rate(12).unwrap(), Rate::from_ratio(121, 100));
    }
}
