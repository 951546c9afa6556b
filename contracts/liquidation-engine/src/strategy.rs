//! Fixed-spread liquidation strategy
//!
//! The liquidator buys collateral at `feed_price / liquidator_incentive`:
//! for every unit of debt value repaid it receives `incentive_bps / 10000`
//! worth of collateral, minus the treasury's cut.

use tracing::{debug, warn};

use ausd_book_keeper::BookKeeper;
use ausd_common::{
    check_feed_price,
    constants::fees::BPS_DENOMINATOR,
    errors::{AusdError, AusdResult},
    require_owner_or_gov, require_role, AccountId, Amount, PoolId, Rate, Role, SharedAccessControl,
    Value,
};
use ausd_token::{StablecoinAdapter, Token};

use crate::flash::{FlashLendingCall, FlashLendingCallee};

/// Components a liquidation touches
#[derive(Debug)]
pub struct LiquidationContext<'a> {
    pub book_keeper: &'a mut BookKeeper,
    pub stablecoin: &'a mut Token,
    pub stablecoin_adapter: &'a StablecoinAdapter,
    /// Receives treasury collateral and the repayment, carries the bad debt
    pub system_debt_engine: AccountId,
    pub stablecoin_reference_price: Rate,
}

impl LiquidationContext<'_> {
    /// Runs `op`; on error ledger and stablecoin token are put back as they
    /// were before the call
    pub fn transactional<T, F>(&mut self, op: F) -> AusdResult<T>
    where
        F: FnOnce(&mut Self) -> AusdResult<T>,
    {
        let snapshot = (self.book_keeper.clone(), self.stablecoin.clone());
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(code = err.code(), "rolling back liquidation");
                let (book_keeper, stablecoin) = snapshot;
                *self.book_keeper = book_keeper;
                *self.stablecoin = stablecoin;
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationRequest<'d> {
    pub pool_id: PoolId,
    pub position_account: AccountId,
    pub liquidator: AccountId,
    pub debt_share_to_repay: Amount,
    pub max_collateral_to_sell: Amount,
    pub data: &'d [u8],
}

/// What a liquidation confiscated and paid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub debt_share_liquidated: Amount,
    pub debt_value_repaid: Value,
    pub collateral_seized: Amount,
    pub collateral_to_liquidator: Amount,
    pub collateral_to_treasury: Amount,
    /// Seized debt value not covered by the repayment
    pub bad_debt: Value,
    pub flash: bool,
}

/// Sized liquidation before any state is touched
#[derive(Debug, Clone, Copy)]
struct LiquidationInfo {
    debt_share: Amount,
    debt_value: Value,
    collateral: Amount,
}

#[derive(Debug, Clone)]
pub struct FixedSpreadLiquidationStrategy {
    access: SharedAccessControl,
    /// Ledger and token account; holds the `LiquidationEngine` role
    account: AccountId,
    flash_lending_enabled: bool,
}

impl FixedSpreadLiquidationStrategy {
    pub fn new(access: SharedAccessControl, account: AccountId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "strategy account is zero" });
        }
        Ok(Self { access, account, flash_lending_enabled: true })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn flash_lending_enabled(&self) -> bool {
        self.flash_lending_enabled
    }

    pub fn set_flash_lending_enabled(&mut self, caller: &AccountId, enabled: bool) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        self.flash_lending_enabled = enabled;
        Ok(())
    }

    /// Sizes, confiscates, pays out and collects the repayment
    ///
    /// Ledger and stablecoin token are restored if anything fails after the
    /// confiscation.
    pub fn execute(
        &self,
        caller: &AccountId,
        ctx: &mut LiquidationContext<'_>,
        request: &LiquidationRequest<'_>,
        callee: Option<&mut dyn FlashLendingCallee>,
    ) -> AusdResult<LiquidationOutcome> {
        // 1. Authorization and inputs
        require_role(self.access.as_ref(), Role::LiquidationEngine, caller)?;
        if request.position_account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "position account is zero" });
        }
        if request.debt_share_to_repay.is_zero() || request.max_collateral_to_sell.is_zero() {
            return Err(AusdError::ZeroAmount);
        }
        let position = ctx.book_keeper.position(&request.pool_id, &request.position_account);
        if position.debt_share.is_zero() || position.locked_collateral.is_zero() {
            return Err(AusdError::NothingToLiquidate);
        }
        if callee.is_some() && !self.flash_lending_enabled {
            return Err(AusdError::InvalidParameter {
                param: "flash_callee",
                reason: "flash lending disabled",
            });
        }

        // 2. Feed price in stablecoin terms
        let (price, ok) = ctx.book_keeper.pool_config().price_feed(&request.pool_id)?.peek_price();
        let feed_price = check_feed_price(request.pool_id, price, ok)?
            .rdiv(ctx.stablecoin_reference_price)?;
        if feed_price.is_zero() {
            return Err(AusdError::PriceNotPositive { pool_id: request.pool_id });
        }

        // 3-4. Size the liquidation
        let pool = ctx.book_keeper.pool_config().pool(&request.pool_id)?;
        let params = pool.params.clone();
        let info = size_liquidation(
            position.debt_share,
            position.locked_collateral,
            pool.debt_accumulated_rate,
            feed_price,
            request,
            params.close_factor_bps,
            params.liquidator_incentive_bps,
            params.debt_floor,
        )?;
        let treasury = info
            .collateral
            .mul_div(params.treasury_fees_bps, params.liquidator_incentive_bps)?;
        let to_liquidator = info.collateral.checked_sub(treasury)?;
        let repayment = info.debt_value.to_amount_ceil();
        let bad_debt = info
            .debt_share
            .mul_rate(pool.debt_accumulated_rate)?
            .saturating_sub(info.debt_value);

        debug!(
            pool_id = %request.pool_id,
            account = %request.position_account,
            debt_share = %info.debt_share,
            debt_value = %info.debt_value,
            collateral = %info.collateral,
            %treasury,
            "liquidation sized"
        );

        // 5-7. Everything below is undone on failure
        let flash = callee.is_some();
        let result = ctx.transactional(|ctx| {
            self.settle(ctx, request, callee, &info, treasury, to_liquidator, repayment)
        });
        if let Err(err) = result {
            warn!(pool_id = %request.pool_id, account = %request.position_account, %err, "liquidation reverted");
            return Err(err);
        }

        Ok(LiquidationOutcome {
            debt_share_liquidated: info.debt_share,
            debt_value_repaid: info.debt_value,
            collateral_seized: info.collateral,
            collateral_to_liquidator: to_liquidator,
            collateral_to_treasury: treasury,
            bad_debt,
            flash,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        ctx: &mut LiquidationContext<'_>,
        request: &LiquidationRequest<'_>,
        callee: Option<&mut dyn FlashLendingCallee>,
        info: &LiquidationInfo,
        treasury: Amount,
        to_liquidator: Amount,
        repayment: Amount,
    ) -> AusdResult<()> {
        let pool_id = &request.pool_id;

        // 5. Seize into the strategy, debt to the system debt engine
        ctx.book_keeper.confiscate_position(
            &self.account,
            pool_id,
            &request.position_account,
            &self.account,
            &ctx.system_debt_engine,
            info.collateral.to_negative_delta()?,
            info.debt_share.to_negative_delta()?,
        )?;

        // 6. Pay out collateral
        if !treasury.is_zero() {
            ctx.book_keeper
                .move_collateral(&self.account, pool_id, &self.account, &ctx.system_debt_engine, treasury)?;
        }
        match callee {
            Some(callee) => {
                let recipient = callee.account();
                ctx.book_keeper
                    .move_collateral(&self.account, pool_id, &self.account, &recipient, to_liquidator)?;

                let before = ctx.stablecoin.balance_of(&self.account);
                callee
                    .flash_lending_call(FlashLendingCall::new(
                        &mut *ctx.book_keeper,
                        &mut *ctx.stablecoin,
                        recipient,
                        self.account,
                        request.liquidator,
                        *pool_id,
                        to_liquidator,
                        info.debt_value,
                        repayment,
                        request.data,
                    ))
                    .map_err(|err| {
                        warn!(%recipient, %err, "flash lending callee failed");
                        AusdError::FlashCallbackFailed { reason: "callee returned an error" }
                    })?;

                let received = ctx.stablecoin.balance_of(&self.account).saturating_sub(before);
                if received < repayment {
                    warn!(%recipient, %received, expected = %repayment, "flash lending callee under-repaid");
                    return Err(AusdError::InsufficientRepayment { expected: repayment, received });
                }
            }
            None => {
                ctx.book_keeper.move_collateral(
                    &self.account,
                    pool_id,
                    &self.account,
                    &request.liquidator,
                    to_liquidator,
                )?;
                ctx.stablecoin
                    .transfer_from(&self.account, &request.liquidator, &self.account, repayment)?;
            }
        }

        // 7. Repayment to the system debt engine
        let adapter = ctx.stablecoin_adapter;
        ctx.stablecoin.approve(&self.account, &adapter.account(), repayment)?;
        adapter.deposit_value(
            &self.account,
            ctx.book_keeper,
            ctx.stablecoin,
            &ctx.system_debt_engine,
            info.debt_value,
        )?;
        Ok(())
    }
}

/// Debt and collateral to liquidate, following close factor, dust and caps
#[allow(clippy::too_many_arguments)]
fn size_liquidation(
    position_debt_share: Amount,
    position_collateral: Amount,
    rate: Rate,
    feed_price: Rate,
    request: &LiquidationRequest<'_>,
    close_factor_bps: u64,
    incentive_bps: u64,
    debt_floor: Value,
) -> AusdResult<LiquidationInfo> {
    let collateral_for = |value: Value| -> AusdResult<Amount> {
        value.mul_div(incentive_bps, BPS_DENOMINATOR)?.div_rate(feed_price)
    };
    let value_for = |collateral: Amount| -> AusdResult<Value> {
        collateral.mul_rate(feed_price)?.mul_div(BPS_DENOMINATOR, incentive_bps)
    };

    let position_debt = position_debt_share.mul_rate(rate)?;
    let max_debt = position_debt.mul_bps(close_factor_bps)?;
    let requested = request.debt_share_to_repay.mul_rate(rate)?;
    let debt_value = requested.min(max_debt);

    let mut info = if position_debt.saturating_sub(debt_value) < debt_floor {
        // Leftover would be dust: take the whole debt
        LiquidationInfo {
            debt_share: position_debt_share,
            debt_value: position_debt,
            collateral: collateral_for(position_debt)?,
        }
    } else {
        let debt_share = debt_value.div_rate(rate)?;
        let debt_value = debt_share.mul_rate(rate)?;
        LiquidationInfo { debt_share, debt_value, collateral: collateral_for(debt_value)? }
    };

    // Not enough collateral: seize all of it, the whole debt share goes with it
    if info.collateral > position_collateral {
        info = LiquidationInfo {
            debt_share: position_debt_share,
            debt_value: value_for(position_collateral)?,
            collateral: position_collateral,
        };
    }

    if info.collateral > request.max_collateral_to_sell {
        let collateral = request.max_collateral_to_sell;
        let debt_share = value_for(collateral)?.div_rate(rate)?;
        let debt_value = debt_share.mul_rate(rate)?;
        let remaining = position_debt.saturating_sub(debt_value);
        if !remaining.is_zero() && remaining < debt_floor {
            return Err(AusdError::DebtFloorNotMet { debt: remaining, floor: debt_floor });
        }
        info = LiquidationInfo { debt_share, debt_value, collateral };
    }

    if info.debt_share.is_zero() || info.collateral.is_zero() {
        return Err(AusdError::NothingToLiquidate);
    }
    Ok(info)
}
