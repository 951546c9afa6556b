//! Book Keeper - collateral and debt ledger
//!
//! The single source of truth for positions, free collateral, internal
//! stablecoin balances and system bad debt. Every other component mutates
//! accounting state exclusively through the primitives below.
//!
//! ## Primitives
//!
//! - **adjust_position**: lock / free collateral, mint / burn debt
//! - **move_collateral / move_stablecoin**: pure transfers
//! - **move_position**: shift collateral and debt between two accounts of a pool
//! - **confiscate_position**: seize collateral and debt (liquidation, settlement)
//! - **accrue_stability_fee**: compound the pool's debt rate
//! - **mint_unbacked_stablecoin / settle_system_bad_debt**: protocol-level value
//!
//! Each primitive validates everything first and only then writes, so a
//! rejected call never leaves partial state behind.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, Component, EventLog},
    require_any_role, require_owner_or_gov, require_owner_or_show_stopper, require_role,
    AccountId, Amount, PoolId, Position, Role, SharedAccessControl, Value,
};

use crate::pool_config::CollateralPoolConfig;

/// Collateral and debt ledger
#[derive(Debug, Clone)]
pub struct BookKeeper {
    access: SharedAccessControl,
    pool_config: CollateralPoolConfig,
    positions: BTreeMap<(PoolId, AccountId), Position>,
    collateral_token: BTreeMap<(PoolId, AccountId), Amount>,
    stablecoin: BTreeMap<AccountId, Value>,
    system_bad_debt: BTreeMap<AccountId, Value>,
    /// `(account, delegate)`: delegate may act for account
    whitelist: BTreeSet<(AccountId, AccountId)>,
    total_stablecoin_issued: Value,
    total_unbacked_stablecoin: Value,
    total_debt_ceiling: Value,
    stability_fee_recipient: AccountId,
    live: bool,
    events: EventLog,
}

impl BookKeeper {
    /// Creates a live ledger whose stability fees go to `stability_fee_recipient`
    pub fn new(access: SharedAccessControl, stability_fee_recipient: AccountId) -> AusdResult<Self> {
        if stability_fee_recipient.is_zero() {
            return Err(AusdError::InvalidAddress {
                reason: "stability fee recipient cannot be zero",
            });
        }
        Ok(Self {
            pool_config: CollateralPoolConfig::new(access.clone()),
            access,
            positions: BTreeMap::new(),
            collateral_token: BTreeMap::new(),
            stablecoin: BTreeMap::new(),
            system_bad_debt: BTreeMap::new(),
            whitelist: BTreeSet::new(),
            total_stablecoin_issued: Value::ZERO,
            total_unbacked_stablecoin: Value::ZERO,
            total_debt_ceiling: Value::ZERO,
            stability_fee_recipient,
            live: true,
            events: EventLog::new(),
        })
    }

    // ============ Queries ============

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn pool_config(&self) -> &CollateralPoolConfig {
        &self.pool_config
    }

    /// Governance and oracle writes go through the registry's own role checks
    pub fn pool_config_mut(&mut self) -> &mut CollateralPoolConfig {
        &mut self.pool_config
    }

    pub fn position(&self, pool_id: &PoolId, account: &AccountId) -> Position {
        self.positions.get(&(*pool_id, *account)).copied().unwrap_or_default()
    }

    pub fn collateral_token(&self, pool_id: &PoolId, account: &AccountId) -> Amount {
        self.collateral_token.get(&(*pool_id, *account)).copied().unwrap_or_default()
    }

    pub fn stablecoin(&self, account: &AccountId) -> Value {
        self.stablecoin.get(account).copied().unwrap_or_default()
    }

    pub fn system_bad_debt(&self, account: &AccountId) -> Value {
        self.system_bad_debt.get(account).copied().unwrap_or_default()
    }

    pub fn total_stablecoin_issued(&self) -> Value {
        self.total_stablecoin_issued
    }

    pub fn total_unbacked_stablecoin(&self) -> Value {
        self.total_unbacked_stablecoin
    }

    pub fn total_debt_ceiling(&self) -> Value {
        self.total_debt_ceiling
    }

    pub fn stability_fee_recipient(&self) -> AccountId {
        self.stability_fee_recipient
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Caller is the account itself or whitelisted by it
    pub fn is_allowed(&self, account: &AccountId, caller: &AccountId) -> bool {
        account == caller || self.whitelist.contains(&(*account, *caller))
    }

    /// Sum of locked collateral over every position of a pool
    pub fn total_locked_collateral(&self, pool_id: &PoolId) -> AusdResult<Amount> {
        self.positions
            .range((*pool_id, AccountId::ZERO)..=(*pool_id, AccountId([0xff; 32])))
            .try_fold(Amount::ZERO, |acc, (_, p)| acc.checked_add(p.locked_collateral))
    }

    /// Sum of free collateral over every account of a pool
    pub fn total_free_collateral(&self, pool_id: &PoolId) -> AusdResult<Amount> {
        self.collateral_token
            .range((*pool_id, AccountId::ZERO)..=(*pool_id, AccountId([0xff; 32])))
            .try_fold(Amount::ZERO, |acc, (_, amount)| acc.checked_add(*amount))
    }

    fn require_allowed(&self, account: &AccountId, caller: &AccountId) -> AusdResult<()> {
        if self.is_allowed(account, caller) {
            Ok(())
        } else {
            Err(AusdError::NotAllowed { account: *account, caller: *caller })
        }
    }

    // ============ Delegation ============

    /// Lets `delegate` act for the caller's account
    pub fn whitelist(&mut self, caller: &AccountId, delegate: AccountId) -> AusdResult<()> {
        if delegate.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "delegate cannot be zero" });
        }
        if self.whitelist.insert((*caller, delegate)) {
            self.events.emit(AusdEvent::AccountWhitelisted {
                account: *caller,
                delegate,
                allowed: true,
            });
        }
        Ok(())
    }

    /// Revokes a delegate of the caller's account
    pub fn blacklist(&mut self, caller: &AccountId, delegate: AccountId) -> AusdResult<()> {
        if self.whitelist.remove(&(*caller, delegate)) {
            self.events.emit(AusdEvent::AccountWhitelisted {
                account: *caller,
                delegate,
                allowed: false,
            });
        }
        Ok(())
    }

    // ============ Position Adjustment ============

    /// Moves collateral between `collateral_owner`'s free balance and the
    /// position, and mints or burns debt against `stablecoin_owner`
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_position(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        position_account: &AccountId,
        collateral_owner: &AccountId,
        stablecoin_owner: &AccountId,
        collateral_delta: i128,
        debt_share_delta: i128,
    ) -> AusdResult<()> {
        let pool = self.pool_config.pool(pool_id)?;
        let rate = pool.debt_accumulated_rate;
        let worsening = debt_share_delta > 0 || collateral_delta < 0;

        // 1. Lifecycle
        if !self.live && worsening {
            return Err(AusdError::NotLive);
        }

        // 2. Resulting position and pool totals
        let current = self.position(pool_id, position_account);
        let locked_collateral = current.locked_collateral.add_signed(collateral_delta).map_err(|_| {
            AusdError::InsufficientCollateral {
                available: current.locked_collateral,
                requested: Amount::from_signed_abs(collateral_delta),
            }
        })?;
        let debt_share = current.debt_share.add_signed(debt_share_delta).map_err(|_| {
            AusdError::InsufficientDebtShare {
                available: current.debt_share,
                requested: Amount::from_signed_abs(debt_share_delta),
            }
        })?;
        let updated = Position { locked_collateral, debt_share };
        let total_debt_share = pool.total_debt_share.add_signed(debt_share_delta)?;

        let debt_value_delta = Amount::from_signed_abs(debt_share_delta).mul_rate(rate)?;
        let total_stablecoin_issued = if debt_share_delta >= 0 {
            self.total_stablecoin_issued.checked_add(debt_value_delta)?
        } else {
            self.total_stablecoin_issued.checked_sub(debt_value_delta)?
        };

        let position_debt = updated.debt_share.mul_rate(rate)?;
        let pool_debt = total_debt_share.mul_rate(rate)?;

        // 3. Ceilings, only when debt grows
        if debt_share_delta > 0 {
            if pool_debt > pool.params.debt_ceiling {
                return Err(AusdError::DebtCeilingExceeded {
                    debt: pool_debt,
                    ceiling: pool.params.debt_ceiling,
                });
            }
            if total_stablecoin_issued > self.total_debt_ceiling {
                return Err(AusdError::TotalDebtCeilingExceeded {
                    debt: total_stablecoin_issued,
                    ceiling: self.total_debt_ceiling,
                });
            }
            if position_debt > pool.params.position_debt_ceiling {
                return Err(AusdError::PositionDebtCeilingExceeded {
                    debt: position_debt,
                    ceiling: pool.params.position_debt_ceiling,
                });
            }
        }

        // 4. Safety, only when the position gets riskier
        if worsening {
            let collateral_value = updated.locked_collateral.mul_rate(pool.price_with_safety_margin)?;
            if position_debt > collateral_value {
                return Err(AusdError::NotSafe { debt: position_debt, collateral_value });
            }
        }

        // 5. Consent
        if worsening {
            self.require_allowed(position_account, caller)?;
        }
        if collateral_delta > 0 {
            self.require_allowed(collateral_owner, caller)?;
        }
        if debt_share_delta < 0 {
            self.require_allowed(stablecoin_owner, caller)?;
        }

        // 6. Dust
        if !updated.debt_share.is_zero() && position_debt < pool.params.debt_floor {
            return Err(AusdError::DebtFloorNotMet {
                debt: position_debt,
                floor: pool.params.debt_floor,
            });
        }

        // 7. Counter-balances
        let free_collateral = self.collateral_token(pool_id, collateral_owner);
        let free_collateral = free_collateral.add_signed(-collateral_delta).map_err(|_| {
            AusdError::InsufficientCollateral {
                available: free_collateral,
                requested: Amount::from_signed_abs(collateral_delta),
            }
        })?;
        let stablecoin = self.stablecoin(stablecoin_owner);
        let stablecoin = if debt_share_delta >= 0 {
            stablecoin.checked_add(debt_value_delta)?
        } else {
            stablecoin.checked_sub(debt_value_delta).map_err(|_| AusdError::InsufficientStablecoin {
                available: stablecoin,
                requested: debt_value_delta,
            })?
        };

        // 8. Commit
        self.pool_config.pool_mut(pool_id)?.total_debt_share = total_debt_share;
        self.positions.insert((*pool_id, *position_account), updated);
        self.collateral_token.insert((*pool_id, *collateral_owner), free_collateral);
        self.stablecoin.insert(*stablecoin_owner, stablecoin);
        self.total_stablecoin_issued = total_stablecoin_issued;

        debug!(
            %pool_id,
            account = %position_account,
            collateral_delta,
            debt_share_delta,
            "position adjusted"
        );
        self.events.emit(AusdEvent::PositionAdjusted {
            pool_id: *pool_id,
            account: *position_account,
            collateral_delta,
            debt_share_delta,
            locked_collateral: updated.locked_collateral,
            debt_share: updated.debt_share,
        });
        Ok(())
    }

    // ============ Transfers ============

    /// Moves free collateral; needs consent of `src`
    pub fn move_collateral(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        src: &AccountId,
        dst: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        self.require_allowed(src, caller)?;
        let available = self.collateral_token(pool_id, src);
        let src_balance = available
            .checked_sub(amount)
            .map_err(|_| AusdError::InsufficientCollateral { available, requested: amount })?;
        self.collateral_token.insert((*pool_id, *src), src_balance);

        let dst_balance = self.collateral_token(pool_id, dst).checked_add(amount)?;
        self.collateral_token.insert((*pool_id, *dst), dst_balance);

        debug!(%pool_id, %src, %dst, %amount, "collateral moved");
        Ok(())
    }

    /// Moves internal stablecoin; needs consent of `src`
    pub fn move_stablecoin(
        &mut self,
        caller: &AccountId,
        src: &AccountId,
        dst: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        self.require_allowed(src, caller)?;
        let available = self.stablecoin(src);
        let src_balance = available
            .checked_sub(value)
            .map_err(|_| AusdError::InsufficientStablecoin { available, requested: value })?;
        self.stablecoin.insert(*src, src_balance);

        let dst_balance = self.stablecoin(dst).checked_add(value)?;
        self.stablecoin.insert(*dst, dst_balance);

        debug!(%src, %dst, %value, "stablecoin moved");
        Ok(())
    }

    /// Shifts locked collateral and debt share from `src` to `dst` within a
    /// pool; needs consent of both, and both results must be safe and non-dust
    pub fn move_position(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        src: &AccountId,
        dst: &AccountId,
        collateral_delta: i128,
        debt_share_delta: i128,
    ) -> AusdResult<()> {
        // Both sides are written back under one key otherwise
        if src == dst {
            return Err(AusdError::SamePosition { account: *src });
        }
        let pool = self.pool_config.pool(pool_id)?;
        let rate = pool.debt_accumulated_rate;
        let price = pool.price_with_safety_margin;
        let floor = pool.params.debt_floor;

        let source = self.position(pool_id, src);
        let destination = self.position(pool_id, dst);

        let moved_source = Position {
            locked_collateral: source.locked_collateral.add_signed(-collateral_delta).map_err(|_| {
                AusdError::InsufficientCollateral {
                    available: source.locked_collateral,
                    requested: Amount::from_signed_abs(collateral_delta),
                }
            })?,
            debt_share: source.debt_share.add_signed(-debt_share_delta).map_err(|_| {
                AusdError::InsufficientDebtShare {
                    available: source.debt_share,
                    requested: Amount::from_signed_abs(debt_share_delta),
                }
            })?,
        };
        let moved_destination = Position {
            locked_collateral: destination.locked_collateral.add_signed(collateral_delta).map_err(|_| {
                AusdError::InsufficientCollateral {
                    available: destination.locked_collateral,
                    requested: Amount::from_signed_abs(collateral_delta),
                }
            })?,
            debt_share: destination.debt_share.add_signed(debt_share_delta).map_err(|_| {
                AusdError::InsufficientDebtShare {
                    available: destination.debt_share,
                    requested: Amount::from_signed_abs(debt_share_delta),
                }
            })?,
        };

        // 1. Consent of both sides
        self.require_allowed(src, caller)?;
        self.require_allowed(dst, caller)?;

        // 2. Safety and dust on both sides
        for result in [&moved_source, &moved_destination] {
            let debt = result.debt_share.mul_rate(rate)?;
            let collateral_value = result.locked_collateral.mul_rate(price)?;
            if debt > collateral_value {
                return Err(AusdError::NotSafe { debt, collateral_value });
            }
            if !result.debt_share.is_zero() && debt < floor {
                return Err(AusdError::DebtFloorNotMet { debt, floor });
            }
        }

        // 3. Commit
        self.positions.insert((*pool_id, *src), moved_source);
        self.positions.insert((*pool_id, *dst), moved_destination);

        debug!(%pool_id, %src, %dst, collateral_delta, debt_share_delta, "position moved");
        self.events.emit(AusdEvent::PositionMoved {
            pool_id: *pool_id,
            source: *src,
            destination: *dst,
            collateral_delta,
            debt_share_delta,
        });
        Ok(())
    }

    // ============ Seizure ============

    /// Seizes collateral into `collateral_creditor`'s free balance and books
    /// the seized debt as bad debt of `debt_debtor`; deltas must not be positive
    #[allow(clippy::too_many_arguments)]
    pub fn confiscate_position(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        position_account: &AccountId,
        collateral_creditor: &AccountId,
        debt_debtor: &AccountId,
        collateral_delta: i128,
        debt_share_delta: i128,
    ) -> AusdResult<()> {
        require_any_role(
            self.access.as_ref(),
            &[Role::LiquidationEngine, Role::ShowStopper],
            caller,
        )?;
        if collateral_delta > 0 || debt_share_delta > 0 {
            return Err(AusdError::InvalidParameter {
                param: "delta",
                reason: "confiscation deltas must not be positive",
            });
        }

        let pool = self.pool_config.pool(pool_id)?;
        let rate = pool.debt_accumulated_rate;

        let collateral_seized = Amount::from_signed_abs(collateral_delta);
        let debt_share_seized = Amount::from_signed_abs(debt_share_delta);

        let current = self.position(pool_id, position_account);
        let updated = Position {
            locked_collateral: current.locked_collateral.checked_sub(collateral_seized).map_err(|_| {
                AusdError::InsufficientCollateral {
                    available: current.locked_collateral,
                    requested: collateral_seized,
                }
            })?,
            debt_share: current.debt_share.checked_sub(debt_share_seized).map_err(|_| {
                AusdError::InsufficientDebtShare {
                    available: current.debt_share,
                    requested: debt_share_seized,
                }
            })?,
        };
        let total_debt_share = pool.total_debt_share.checked_sub(debt_share_seized)?;
        let bad_debt = debt_share_seized.mul_rate(rate)?;

        let creditor_balance = self
            .collateral_token(pool_id, collateral_creditor)
            .checked_add(collateral_seized)?;
        let debtor_bad_debt = self.system_bad_debt(debt_debtor).checked_add(bad_debt)?;
        let total_unbacked = self.total_unbacked_stablecoin.checked_add(bad_debt)?;

        self.pool_config.pool_mut(pool_id)?.total_debt_share = total_debt_share;
        self.positions.insert((*pool_id, *position_account), updated);
        self.collateral_token.insert((*pool_id, *collateral_creditor), creditor_balance);
        self.system_bad_debt.insert(*debt_debtor, debtor_bad_debt);
        self.total_unbacked_stablecoin = total_unbacked;

        debug!(
            %pool_id,
            account = %position_account,
            %collateral_seized,
            %debt_share_seized,
            "position confiscated"
        );
        self.events.emit(AusdEvent::PositionConfiscated {
            pool_id: *pool_id,
            account: *position_account,
            collateral_creditor: *collateral_creditor,
            debt_debtor: *debt_debtor,
            collateral_seized,
            debt_share_seized,
            bad_debt,
        });
        Ok(())
    }

    // ============ Stability Fee ============

    /// Compounds the pool's stability fee up to `now` and credits the fee to
    /// the stability fee recipient; returns the fee value (zero when `now`
    /// is not later than the last accrual)
    pub fn accrue_stability_fee(&mut self, pool_id: &PoolId, now: u64) -> AusdResult<Value> {
        if !self.live {
            return Err(AusdError::NotLive);
        }
        let pool = self.pool_config.pool(pool_id)?;
        if now <= pool.last_accumulation_time {
            return Ok(Value::ZERO);
        }

        let old_rate = pool.debt_accumulated_rate;
        let new_rate = pool.accrued_rate(now)?;
        let rate_delta = new_rate.checked_sub(old_rate)?;
        let fee = pool.total_debt_share.mul_rate(rate_delta)?;

        let recipient = self.stability_fee_recipient;
        let recipient_balance = self.stablecoin(&recipient).checked_add(fee)?;
        let total_issued = self.total_stablecoin_issued.checked_add(fee)?;

        let pool = self.pool_config.pool_mut(pool_id)?;
        pool.debt_accumulated_rate = new_rate;
        pool.last_accumulation_time = now;
        self.stablecoin.insert(recipient, recipient_balance);
        self.total_stablecoin_issued = total_issued;

        debug!(%pool_id, %new_rate, %fee, now, "stability fee accrued");
        self.events.emit(AusdEvent::StabilityFeeAccrued {
            pool_id: *pool_id,
            debt_accumulated_rate: new_rate,
            fee_value: fee,
            timestamp: now,
        });
        Ok(fee)
    }

    // ============ Protocol-level Value ============

    /// Creates stablecoin for `to` backed by bad debt of `from`; Mintable role
    pub fn mint_unbacked_stablecoin(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        require_role(self.access.as_ref(), Role::Mintable, caller)?;

        let bad_debt = self.system_bad_debt(from).checked_add(value)?;
        let balance = self.stablecoin(to).checked_add(value)?;
        let unbacked = self.total_unbacked_stablecoin.checked_add(value)?;
        let issued = self.total_stablecoin_issued.checked_add(value)?;

        self.system_bad_debt.insert(*from, bad_debt);
        self.stablecoin.insert(*to, balance);
        self.total_unbacked_stablecoin = unbacked;
        self.total_stablecoin_issued = issued;

        debug!(%from, %to, %value, "unbacked stablecoin minted");
        Ok(())
    }

    /// Cancels the caller's bad debt against the caller's own stablecoin
    pub fn settle_system_bad_debt(&mut self, caller: &AccountId, value: Value) -> AusdResult<()> {
        let bad_debt = self.system_bad_debt(caller);
        let bad_debt = bad_debt
            .checked_sub(value)
            .map_err(|_| AusdError::InsufficientBadDebt { available: bad_debt, requested: value })?;
        let balance = self.stablecoin(caller);
        let balance = balance
            .checked_sub(value)
            .map_err(|_| AusdError::InsufficientStablecoin { available: balance, requested: value })?;
        let unbacked = self.total_unbacked_stablecoin.checked_sub(value)?;
        let issued = self.total_stablecoin_issued.checked_sub(value)?;

        self.system_bad_debt.insert(*caller, bad_debt);
        self.stablecoin.insert(*caller, balance);
        self.total_unbacked_stablecoin = unbacked;
        self.total_stablecoin_issued = issued;

        debug!(account = %caller, %value, "system bad debt settled");
        self.events.emit(AusdEvent::BadDebtSettled { account: *caller, value });
        Ok(())
    }

    /// Credits or debits free collateral from a token adapter; Adapter role
    pub fn add_collateral(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        account: &AccountId,
        delta: i128,
    ) -> AusdResult<()> {
        require_role(self.access.as_ref(), Role::Adapter, caller)?;
        self.pool_config.pool(pool_id)?;

        let current = self.collateral_token(pool_id, account);
        let updated = current.add_signed(delta).map_err(|err| match err {
            AusdError::Underflow => AusdError::InsufficientCollateral {
                available: current,
                requested: Amount::from_signed_abs(delta),
            },
            other => other,
        })?;
        self.collateral_token.insert((*pool_id, *account), updated);

        debug!(%pool_id, %account, delta, "collateral added");
        Ok(())
    }

    // ============ Governance ============

    pub fn set_total_debt_ceiling(&mut self, caller: &AccountId, value: Value) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        self.total_debt_ceiling = value;
        info!(%value, "total debt ceiling set");
        Ok(())
    }

    /// Freezes debt creation; idempotent
    pub fn cage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if self.live {
            self.live = false;
            info!("book keeper caged");
            self.events.emit(AusdEvent::SystemCaged { component: Component::BookKeeper });
        }
        Ok(())
    }

    /// Lifts a cage; idempotent
    pub fn uncage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if !self.live {
            self.live = true;
            info!("book keeper uncaged");
            self.events.emit(AusdEvent::SystemUncaged { component: Component::BookKeeper });
        }
        Ok(())
    }
}
