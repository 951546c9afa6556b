//! Liquidation engine
//!
//! Entry point for liquidators. Checks lifecycle, accrues the pool, confirms
//! the position is unsafe and delegates sizing and settlement to the pool's
//! strategy.

use tracing::{info, warn};

use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, Component, EventLog},
    require_owner_or_show_stopper, AccountId, Amount, PoolId, SharedAccessControl,
};

use crate::flash::FlashLendingCallee;
use crate::strategy::{
    FixedSpreadLiquidationStrategy, LiquidationContext, LiquidationOutcome, LiquidationRequest,
};

#[derive(Debug, Clone)]
pub struct LiquidationEngine {
    access: SharedAccessControl,
    /// Holds the `LiquidationEngine` role towards the strategy
    account: AccountId,
    strategy: FixedSpreadLiquidationStrategy,
    live: bool,
    events: EventLog,
}

impl LiquidationEngine {
    pub fn new(
        access: SharedAccessControl,
        account: AccountId,
        strategy: FixedSpreadLiquidationStrategy,
    ) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "liquidation engine account is zero" });
        }
        Ok(Self { access, account, strategy, live: true, events: EventLog::new() })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn strategy(&self) -> &FixedSpreadLiquidationStrategy {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut FixedSpreadLiquidationStrategy {
        &mut self.strategy
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Liquidates part or all of an unsafe position
    ///
    /// Without a callee the caller pays `ceil(debt value)` stablecoin tokens,
    /// approved to the strategy, and receives the collateral. With a callee
    /// the collateral goes to the callee first and the callee repays.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        caller: &AccountId,
        ctx: &mut LiquidationContext<'_>,
        pool_id: &PoolId,
        position_account: &AccountId,
        debt_share_to_repay: Amount,
        max_collateral_to_sell: Amount,
        flash_callee: Option<&mut dyn FlashLendingCallee>,
        data: &[u8],
        now: u64,
    ) -> AusdResult<LiquidationOutcome> {
        // 1. Lifecycle
        if !self.live {
            return Err(AusdError::NotLive);
        }

        // 2. Debt at the current rate
        ctx.book_keeper.accrue_stability_fee(pool_id, now)?;

        // 3. Pool must route to this engine's strategy
        let pool = ctx.book_keeper.pool_config().pool(pool_id)?;
        if pool.params.strategy != self.strategy.account() {
            return Err(AusdError::StrategyNotSet { pool_id: *pool_id });
        }

        // 4. Position must be unsafe
        let position = ctx.book_keeper.position(pool_id, position_account);
        if position.is_safe(pool.debt_accumulated_rate, pool.price_with_safety_margin) {
            warn!(%pool_id, account = %position_account, "liquidation rejected, position is safe");
            return Err(AusdError::PositionIsSafe { pool_id: *pool_id, account: *position_account });
        }

        // 5. Strategy
        let request = LiquidationRequest {
            pool_id: *pool_id,
            position_account: *position_account,
            liquidator: *caller,
            debt_share_to_repay,
            max_collateral_to_sell,
            data,
        };
        let strategy = &self.strategy;
        let account = self.account;
        let outcome = ctx.transactional(|ctx| {
            let outcome = strategy.execute(&account, ctx, &request, flash_callee)?;

            // 6. Confiscated share must match
            let remaining = ctx.book_keeper.position(pool_id, position_account).debt_share;
            check_confiscated(position.debt_share, remaining, outcome.debt_share_liquidated)?;
            Ok(outcome)
        })?;

        info!(
            %pool_id,
            account = %position_account,
            liquidator = %caller,
            debt_share = %outcome.debt_share_liquidated,
            collateral = %outcome.collateral_seized,
            flash = outcome.flash,
            "position liquidated"
        );
        self.events.emit(AusdEvent::LiquidationExecuted {
            pool_id: *pool_id,
            account: *position_account,
            liquidator: *caller,
            debt_share_liquidated: outcome.debt_share_liquidated,
            debt_value_repaid: outcome.debt_value_repaid,
            collateral_seized: outcome.collateral_seized,
            collateral_to_liquidator: outcome.collateral_to_liquidator,
            collateral_to_treasury: outcome.collateral_to_treasury,
            bad_debt: outcome.bad_debt,
            flash: outcome.flash,
            timestamp: now,
        });
        Ok(outcome)
    }

    pub fn cage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if self.live {
            self.live = false;
            info!("liquidation engine caged");
            self.events.emit(AusdEvent::SystemCaged { component: Component::LiquidationEngine });
        }
        Ok(())
    }

    pub fn uncage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if !self.live {
            self.live = true;
            info!("liquidation engine uncaged");
            self.events.emit(AusdEvent::SystemUncaged { component: Component::LiquidationEngine });
        }
        Ok(())
    }
}

/// Position must have lost exactly the share the strategy reports
fn check_confiscated(before: Amount, after: Amount, expected: Amount) -> AusdResult<()> {
    let actual = before.saturating_sub(after);
    if actual != expected {
        return Err(AusdError::LiquidationMismatch { expected, actual });
    }
    Ok(())
}
