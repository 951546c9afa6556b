//! Show Stopper
//!
//! Winds the protocol down in a fixed order:
//!
//! ```text
//! Live -> Caged -> PoolCaged (per pool) -> DebtFinalized
//!      -> CashPriceFinalized (per pool) -> Redeeming
//! ```
//!
//! After `cage` nothing can add debt. Each pool is frozen at a cage price,
//! indebted positions give up the collateral covering their debt, and once
//! the cooldown has passed and the system debt engine holds no surplus, the
//! remaining collateral is split pro rata among stablecoin holders.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ausd_book_keeper::{BookKeeper, SystemDebtEngine};
use ausd_common::{
    check_feed_price,
    constants::settlement::{MAX_CAGE_COOLDOWN, MIN_CAGE_COOLDOWN},
    errors::{AusdError, AusdResult},
    events::{AusdEvent, Component, EventLog},
    require_any_role, AccountId, Amount, PoolId, Rate, Role, SharedAccessControl, Value,
};
use ausd_liquidation_engine::LiquidationEngine;
use ausd_price_oracle::PriceOracle;

/// Components frozen by `cage`
#[derive(Debug)]
pub struct CageTargets<'a> {
    pub book_keeper: &'a mut BookKeeper,
    pub liquidation_engine: &'a mut LiquidationEngine,
    pub system_debt_engine: &'a mut SystemDebtEngine,
    pub price_oracle: &'a mut PriceOracle,
}

/// Settlement bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SettlementState {
    pub caged: bool,
    pub caged_at: u64,
    pub cage_cooldown: u64,
    /// Stablecoin outstanding at finalization
    pub debt: Option<Value>,
    /// Collateral per stablecoin at cage time
    pub cage_price: BTreeMap<PoolId, Rate>,
    /// Pool debt share when the pool was caged
    pub total_debt_share: BTreeMap<PoolId, Amount>,
    /// Collateral owed by positions beyond what they had locked
    pub bad_debt_accumulator: BTreeMap<PoolId, Amount>,
    /// Collateral paid per stablecoin on redemption
    pub final_cash_price: BTreeMap<PoolId, Rate>,
    pub stablecoin_accumulator: BTreeMap<AccountId, Amount>,
    pub redeemed_stablecoin: BTreeMap<(PoolId, AccountId), Amount>,
}

#[derive(Debug, Clone)]
pub struct ShowStopper {
    access: SharedAccessControl,
    /// Holds the `ShowStopper` role; collects confiscated collateral and
    /// accumulated stablecoin
    account: AccountId,
    system_debt_engine: AccountId,
    state: SettlementState,
    events: EventLog,
}

impl ShowStopper {
    pub fn new(
        access: SharedAccessControl,
        account: AccountId,
        system_debt_engine: AccountId,
    ) -> AusdResult<Self> {
        if account.is_zero() || system_debt_engine.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "show stopper accounts cannot be zero" });
        }
        Ok(Self {
            access,
            account,
            system_debt_engine,
            state: SettlementState::default(),
            events: EventLog::new(),
        })
    }

    // ============ Queries ============

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn live(&self) -> bool {
        !self.state.caged
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn debt(&self) -> Option<Value> {
        self.state.debt
    }

    pub fn cage_price(&self, pool_id: &PoolId) -> Option<Rate> {
        self.state.cage_price.get(pool_id).copied()
    }

    pub fn final_cash_price(&self, pool_id: &PoolId) -> Option<Rate> {
        self.state.final_cash_price.get(pool_id).copied()
    }

    pub fn bad_debt_accumulator(&self, pool_id: &PoolId) -> Amount {
        self.state.bad_debt_accumulator.get(pool_id).copied().unwrap_or_default()
    }

    pub fn stablecoin_accumulator(&self, account: &AccountId) -> Amount {
        self.state.stablecoin_accumulator.get(account).copied().unwrap_or_default()
    }

    pub fn redeemed_stablecoin(&self, pool_id: &PoolId, account: &AccountId) -> Amount {
        self.state.redeemed_stablecoin.get(&(*pool_id, *account)).copied().unwrap_or_default()
    }

    fn require_caged(&self) -> AusdResult<()> {
        if self.state.caged {
            Ok(())
        } else {
            Err(AusdError::StillLive)
        }
    }

    fn require_cage_price(&self, pool_id: &PoolId) -> AusdResult<Rate> {
        self.cage_price(pool_id)
            .ok_or(AusdError::CagePriceNotDefined { pool_id: *pool_id })
    }

    // ============ Shutdown ============

    /// Freezes the whole system; owner, governance or show stopper role
    pub fn cage(
        &mut self,
        caller: &AccountId,
        targets: CageTargets<'_>,
        cooldown: u64,
        now: u64,
    ) -> AusdResult<()> {
        // 1. Authorization and lifecycle
        require_any_role(self.access.as_ref(), &[Role::Owner, Role::Gov, Role::ShowStopper], caller)?;
        if self.state.caged {
            return Err(AusdError::NotLive);
        }
        if !(MIN_CAGE_COOLDOWN..=MAX_CAGE_COOLDOWN).contains(&cooldown) {
            return Err(AusdError::InvalidParameter {
                param: "cooldown",
                reason: "must be between 1 and 13 weeks",
            });
        }

        // 2. Freeze every component
        targets.book_keeper.cage(&self.account)?;
        targets.liquidation_engine.cage(&self.account)?;
        targets.system_debt_engine.cage(&self.account, targets.book_keeper)?;
        targets.price_oracle.cage(&self.account)?;

        // 3. Record
        self.state.caged = true;
        self.state.caged_at = now;
        self.state.cage_cooldown = cooldown;

        info!(%caller, cooldown, now, "system caged");
        self.events.emit(AusdEvent::SystemCaged { component: Component::ShowStopper });
        Ok(())
    }

    /// Fixes a pool's cage price from its feed; the pool must still carry debt
    pub fn cage_pool(
        &mut self,
        book_keeper: &BookKeeper,
        price_oracle: &PriceOracle,
        pool_id: &PoolId,
    ) -> AusdResult<Rate> {
        self.require_caged()?;
        if self.state.cage_price.contains_key(pool_id) {
            return Err(AusdError::PoolAlreadyCaged { pool_id: *pool_id });
        }
        let pool = book_keeper.pool_config().pool(pool_id)?;
        if pool.total_debt_share.is_zero() {
            return Err(AusdError::NoDebtToSettle { pool_id: *pool_id });
        }
        let (price, ok) = book_keeper.pool_config().price_feed(pool_id)?.peek_price();
        let feed_price = check_feed_price(*pool_id, price, ok)?;

        let cage_price = price_oracle.stablecoin_reference_price().rdiv(feed_price)?;
        let total_debt_share = pool.total_debt_share;
        self.state.cage_price.insert(*pool_id, cage_price);
        self.state.total_debt_share.insert(*pool_id, total_debt_share);

        info!(%pool_id, %cage_price, %total_debt_share, "pool caged");
        self.events.emit(AusdEvent::PoolCaged {
            pool_id: *pool_id,
            cage_price,
            total_debt_share,
        });
        Ok(cage_price)
    }

    /// Takes the collateral covering a position's debt at the cage price
    ///
    /// The whole debt share moves to the system debt engine; collateral the
    /// position could not cover is tracked against the pool.
    pub fn accumulate_bad_debt(
        &mut self,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        position_account: &AccountId,
    ) -> AusdResult<()> {
        let cage_price = self.require_cage_price(pool_id)?;
        let rate = book_keeper.pool_config().pool(pool_id)?.debt_accumulated_rate;
        let position = book_keeper.position(pool_id, position_account);

        let owe = position.debt_share.rmul(rate)?.rmul(cage_price)?;
        let seized = owe.min(position.locked_collateral);
        let shortfall = owe.checked_sub(seized)?;
        let accumulated = self.bad_debt_accumulator(pool_id).checked_add(shortfall)?;

        book_keeper.confiscate_position(
            &self.account,
            pool_id,
            position_account,
            &self.account,
            &self.system_debt_engine,
            seized.to_negative_delta()?,
            position.debt_share.to_negative_delta()?,
        )?;
        self.state.bad_debt_accumulator.insert(*pool_id, accumulated);

        debug!(%pool_id, account = %position_account, %seized, %shortfall, "bad debt accumulated");
        self.events.emit(AusdEvent::BadDebtAccumulated {
            pool_id: *pool_id,
            account: *position_account,
            collateral_seized: seized,
            debt_share: position.debt_share,
            shortfall,
        });
        Ok(())
    }

    /// Returns the leftover collateral of a debt-free position
    pub fn redeem_locked_collateral(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        position_account: &AccountId,
        recipient: &AccountId,
    ) -> AusdResult<Amount> {
        self.require_caged()?;
        let position = book_keeper.position(pool_id, position_account);
        if !position.debt_share.is_zero() {
            return Err(AusdError::DebtShareNotZero { debt_share: position.debt_share });
        }
        if !book_keeper.is_allowed(position_account, caller) {
            return Err(AusdError::NotAllowed { account: *position_account, caller: *caller });
        }

        let amount = position.locked_collateral;
        book_keeper.confiscate_position(
            &self.account,
            pool_id,
            position_account,
            recipient,
            &self.system_debt_engine,
            amount.to_negative_delta()?,
            0,
        )?;

        debug!(%pool_id, account = %position_account, %recipient, %amount, "locked collateral redeemed");
        self.events.emit(AusdEvent::LockedCollateralRedeemed {
            pool_id: *pool_id,
            account: *position_account,
            recipient: *recipient,
            amount,
        });
        Ok(amount)
    }

    /// Fixes the outstanding stablecoin once the cooldown has passed and the
    /// system debt engine has no surplus left
    pub fn finalize_debt(&mut self, book_keeper: &BookKeeper, now: u64) -> AusdResult<Value> {
        self.require_caged()?;
        if self.state.debt.is_some() {
            return Err(AusdError::DebtAlreadyFinalized);
        }
        let surplus = book_keeper.stablecoin(&self.system_debt_engine);
        if !surplus.is_zero() {
            return Err(AusdError::SurplusNotSettled { surplus });
        }
        let available_at = self.state.caged_at.saturating_add(self.state.cage_cooldown);
        if now < available_at {
            return Err(AusdError::CooldownNotElapsed { now, available_at });
        }

        let debt = book_keeper.total_stablecoin_issued();
        self.state.debt = Some(debt);

        info!(%debt, now, "debt finalized");
        self.events.emit(AusdEvent::DebtFinalized { debt, timestamp: now });
        Ok(debt)
    }

    /// Collateral paid per unit of stablecoin redeemed from `pool_id`
    pub fn finalize_cash_price(&mut self, book_keeper: &BookKeeper, pool_id: &PoolId) -> AusdResult<Rate> {
        let debt = self.state.debt.ok_or(AusdError::DebtNotFinalized)?;
        let cage_price = self.require_cage_price(pool_id)?;
        if self.state.final_cash_price.contains_key(pool_id) {
            return Err(AusdError::CashPriceAlreadyDefined { pool_id: *pool_id });
        }

        let rate = book_keeper.pool_config().pool(pool_id)?.debt_accumulated_rate;
        let total_debt_share = self.state.total_debt_share.get(pool_id).copied().unwrap_or_default();
        let collateral = total_debt_share
            .rmul(rate)?
            .rmul(cage_price)?
            .saturating_sub(self.bad_debt_accumulator(pool_id));
        let final_cash_price = collateral.ratio(debt.to_amount())?;
        self.state.final_cash_price.insert(*pool_id, final_cash_price);

        info!(%pool_id, %final_cash_price, "cash price finalized");
        self.events.emit(AusdEvent::CashPriceFinalized { pool_id: *pool_id, final_cash_price });
        Ok(final_cash_price)
    }

    /// Locks the caller's ledger stablecoin for redemption
    pub fn accumulate_stablecoin(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        amount: Amount,
    ) -> AusdResult<()> {
        if self.state.debt.is_none() {
            return Err(AusdError::DebtNotFinalized);
        }
        if amount.is_zero() {
            return Err(AusdError::ZeroAmount);
        }
        let total = self.stablecoin_accumulator(caller).checked_add(amount)?;
        book_keeper.move_stablecoin(caller, caller, &self.account, amount.to_value()?)?;
        self.state.stablecoin_accumulator.insert(*caller, total);

        debug!(account = %caller, %amount, %total, "stablecoin accumulated");
        self.events.emit(AusdEvent::StablecoinAccumulated { account: *caller, amount, total });
        Ok(())
    }

    /// Pays out collateral of `pool_id` for accumulated stablecoin
    ///
    /// Each pool tracks its own redemptions, so accumulated stablecoin can be
    /// redeemed once against every pool.
    pub fn redeem_stablecoin(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        amount: Amount,
    ) -> AusdResult<Amount> {
        let final_cash_price = self
            .final_cash_price(pool_id)
            .ok_or(AusdError::CashPriceNotDefined { pool_id: *pool_id })?;
        if amount.is_zero() {
            return Err(AusdError::ZeroAmount);
        }
        let redeemed = self.redeemed_stablecoin(pool_id, caller).checked_add(amount)?;
        let accumulated = self.stablecoin_accumulator(caller);
        if redeemed > accumulated {
            return Err(AusdError::InsufficientAccumulatedStablecoin { accumulated, requested: redeemed });
        }

        let collateral = amount.rmul(final_cash_price)?;
        book_keeper.move_collateral(&self.account, pool_id, &self.account, caller, collateral)?;
        self.state.redeemed_stablecoin.insert((*pool_id, *caller), redeemed);

        debug!(%pool_id, account = %caller, %amount, %collateral, "stablecoin redeemed");
        self.events.emit(AusdEvent::StablecoinRedeemed {
            pool_id: *pool_id,
            account: *caller,
            amount,
            collateral,
        });
        Ok(collateral)
    }
}
