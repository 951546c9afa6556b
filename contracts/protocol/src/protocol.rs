//! Protocol
//!
//! Owns every component of one deployment and exposes the user, keeper and
//! governance entry points. Components never hold references to each other;
//! the protocol lends each call exactly the components it touches.
//!
//! Every mutating entry point goes through [`Protocol::transact`]: the whole
//! protocol is snapshotted and written back if the call fails. Roles live in
//! the shared access table, outside the snapshot, so entry points grant
//! roles only as their last step.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use ausd_book_keeper::{BookKeeper, CollateralPoolConfig, CollateralPoolParams, SystemDebtEngine};
use ausd_common::{
    errors::{AusdError, AusdResult},
    transactional, AccessControlConfig, AccountId, Amount, PoolId, PositionId, Rate, Role,
    SharedPriceFeed, Value,
};
use ausd_liquidation_engine::{
    FixedSpreadLiquidationStrategy, FlashLendingCallee, LiquidationContext, LiquidationEngine,
    LiquidationOutcome,
};
use ausd_position_manager::PositionManager;
use ausd_price_oracle::PriceOracle;
use ausd_show_stopper::{CageTargets, ShowStopper};
use ausd_token::{CollateralTokenAdapter, StablecoinAdapter, Token};

use crate::config::{DeployConfig, ProtocolAccounts};

/// Collateral token of one pool and its ledger adapter
#[derive(Debug, Clone)]
pub struct CollateralAsset {
    pub token: Token,
    pub adapter: CollateralTokenAdapter,
}

#[derive(Debug, Clone)]
pub struct Protocol {
    access: Arc<AccessControlConfig>,
    owner: AccountId,
    accounts: ProtocolAccounts,
    book_keeper: BookKeeper,
    system_debt_engine: SystemDebtEngine,
    price_oracle: PriceOracle,
    position_manager: PositionManager,
    liquidation_engine: LiquidationEngine,
    show_stopper: ShowStopper,
    stablecoin: Token,
    stablecoin_adapter: StablecoinAdapter,
    collaterals: BTreeMap<PoolId, CollateralAsset>,
}

impl Protocol {
    /// Creates every component and grants the roles they act under
    pub fn deploy(config: DeployConfig) -> AusdResult<Self> {
        let owner = config.owner;
        if owner.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "protocol owner is zero" });
        }
        let accounts = ProtocolAccounts::derive(&owner);
        let access = Arc::new(AccessControlConfig::new(owner));

        // 1. Components
        let mut book_keeper = BookKeeper::new(access.clone(), accounts.system_debt_engine)?;
        book_keeper.set_total_debt_ceiling(&owner, config.total_debt_ceiling)?;
        let strategy = FixedSpreadLiquidationStrategy::new(access.clone(), accounts.liquidation_strategy)?;

        let protocol = Self {
            system_debt_engine: SystemDebtEngine::new(access.clone(), accounts.system_debt_engine)?,
            price_oracle: PriceOracle::new(access.clone(), accounts.price_oracle)?,
            position_manager: PositionManager::new(accounts.position_manager)?,
            liquidation_engine: LiquidationEngine::new(access.clone(), accounts.liquidation_engine, strategy)?,
            show_stopper: ShowStopper::new(access.clone(), accounts.show_stopper, accounts.system_debt_engine)?,
            stablecoin: Token::new(access.clone(), &config.stablecoin_name, &config.stablecoin_symbol),
            stablecoin_adapter: StablecoinAdapter::new(accounts.stablecoin_adapter)?,
            collaterals: BTreeMap::new(),
            book_keeper,
            access,
            owner,
            accounts,
        };

        // 2. Roles
        let grants = [
            (Role::PriceOracle, accounts.price_oracle),
            (Role::LiquidationEngine, accounts.liquidation_engine),
            (Role::LiquidationEngine, accounts.liquidation_strategy),
            (Role::ShowStopper, accounts.show_stopper),
            (Role::Mintable, accounts.stablecoin_adapter),
        ];
        for (role, account) in grants {
            protocol.access.grant_role(&owner, role, account)?;
        }

        info!(%owner, "protocol deployed");
        Ok(protocol)
    }

    /// Runs `op` against the whole protocol, restoring it if `op` fails
    pub fn transact<T, F>(&mut self, op: F) -> AusdResult<T>
    where
        F: FnOnce(&mut Self) -> AusdResult<T>,
    {
        transactional(self, op)
    }

    // ============ Queries ============

    /// Role table shared by every component
    pub fn access(&self) -> &Arc<AccessControlConfig> {
        &self.access
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn accounts(&self) -> &ProtocolAccounts {
        &self.accounts
    }

    pub fn book_keeper(&self) -> &BookKeeper {
        &self.book_keeper
    }

    pub fn system_debt_engine(&self) -> &SystemDebtEngine {
        &self.system_debt_engine
    }

    pub fn price_oracle(&self) -> &PriceOracle {
        &self.price_oracle
    }

    pub fn position_manager(&self) -> &PositionManager {
        &self.position_manager
    }

    pub fn liquidation_engine(&self) -> &LiquidationEngine {
        &self.liquidation_engine
    }

    pub fn show_stopper(&self) -> &ShowStopper {
        &self.show_stopper
    }

    pub fn stablecoin(&self) -> &Token {
        &self.stablecoin
    }

    pub fn stablecoin_adapter(&self) -> &StablecoinAdapter {
        &self.stablecoin_adapter
    }

    pub fn collateral(&self, pool_id: &PoolId) -> AusdResult<&CollateralAsset> {
        self.collaterals
            .get(pool_id)
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })
    }

    /// Ledger account behind a managed position
    pub fn position_account(&self, position_id: PositionId) -> AusdResult<AccountId> {
        Ok(self.position_manager.handle(position_id)?.account)
    }

    // ============ Governance ============

    /// Registers a collateral pool, its token and its adapter
    ///
    /// The pool's adapter and strategy are always the ones of this
    /// deployment, whatever `params` carries.
    pub fn add_collateral_pool(
        &mut self,
        caller: &AccountId,
        symbol: &str,
        token_name: &str,
        params: CollateralPoolParams,
        price_feed: SharedPriceFeed,
        now: u64,
    ) -> AusdResult<PoolId> {
        let pool_id = PoolId::from_symbol(symbol);
        if self.collaterals.contains_key(&pool_id) {
            return Err(AusdError::PoolAlreadyInitialized { pool_id });
        }
        let adapter = CollateralTokenAdapter::new(ProtocolAccounts::collateral_adapter(&self.owner, symbol), pool_id)?;
        let params = CollateralPoolParams {
            adapter: adapter.account(),
            strategy: self.accounts.liquidation_strategy,
            ..params
        };

        self.transact(|p| {
            p.book_keeper
                .pool_config_mut()
                .init_collateral_pool(caller, pool_id, params, price_feed, now)?;
            let token = Token::new(p.access.clone(), token_name, symbol);
            p.collaterals.insert(pool_id, CollateralAsset { token, adapter });
            p.access.grant_role(caller, Role::Adapter, adapter.account())
        })?;

        info!(%pool_id, adapter = %adapter.account(), "collateral pool added");
        Ok(pool_id)
    }

    /// Parameter setters of the pool registry; each checks its own role
    pub fn pool_config_mut(&mut self) -> &mut CollateralPoolConfig {
        self.book_keeper.pool_config_mut()
    }

    /// Accrues the pool at the old rate up to `now`, then switches rates
    pub fn set_stability_fee_rate(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        rate: Rate,
        now: u64,
    ) -> AusdResult<()> {
        self.transact(|p| {
            if p.book_keeper.live() {
                p.book_keeper.accrue_stability_fee(pool_id, now)?;
            }
            p.book_keeper.pool_config_mut().set_stability_fee_rate(caller, pool_id, rate, now)
        })
    }

    pub fn set_total_debt_ceiling(&mut self, caller: &AccountId, value: Value) -> AusdResult<()> {
        self.book_keeper.set_total_debt_ceiling(caller, value)
    }

    pub fn set_stablecoin_reference_price(&mut self, caller: &AccountId, price: Rate) -> AusdResult<()> {
        self.price_oracle.set_stablecoin_reference_price(caller, price)
    }

    pub fn set_flash_lending_enabled(&mut self, caller: &AccountId, enabled: bool) -> AusdResult<()> {
        self.liquidation_engine.strategy_mut().set_flash_lending_enabled(caller, enabled)
    }

    pub fn set_surplus_buffer(&mut self, caller: &AccountId, value: Value) -> AusdResult<()> {
        self.system_debt_engine.set_surplus_buffer(caller, value)
    }

    /// Mints collateral tokens; the caller needs the Mintable role
    pub fn mint_collateral(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        to: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        let asset = self
            .collaterals
            .get_mut(pool_id)
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })?;
        asset.token.mint(caller, to, amount)
    }

    /// Brings caged components back, as long as settlement has not started
    pub fn uncage(&mut self, caller: &AccountId) -> AusdResult<()> {
        if !self.show_stopper.live() {
            return Err(AusdError::NotLive);
        }
        self.transact(|p| {
            p.book_keeper.uncage(caller)?;
            p.liquidation_engine.uncage(caller)?;
            p.system_debt_engine.uncage(caller)?;
            p.price_oracle.uncage(caller)
        })
    }

    // ============ Tokens ============

    pub fn approve_stablecoin(&mut self, caller: &AccountId, spender: &AccountId, amount: Amount) -> AusdResult<()> {
        self.stablecoin.approve(caller, spender, amount)
    }

    pub fn transfer_stablecoin(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> AusdResult<()> {
        self.stablecoin.transfer(caller, to, amount)
    }

    pub fn approve_collateral(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        spender: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        let asset = self
            .collaterals
            .get_mut(pool_id)
            .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })?;
        asset.token.approve(caller, spender, amount)
    }

    /// Collateral tokens of the caller into `account`'s free collateral
    pub fn deposit_collateral(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        account: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        self.transact(|p| {
            let asset = p
                .collaterals
                .get_mut(pool_id)
                .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })?;
            asset.adapter.deposit(caller, &mut p.book_keeper, &mut asset.token, account, amount)
        })
    }

    /// The caller's free collateral out to collateral tokens
    pub fn withdraw_collateral(&mut self, caller: &AccountId, pool_id: &PoolId, amount: Amount) -> AusdResult<()> {
        self.transact(|p| {
            let asset = p
                .collaterals
                .get_mut(pool_id)
                .ok_or(AusdError::PoolNotInitialized { pool_id: *pool_id })?;
            asset.adapter.withdraw(caller, &mut p.book_keeper, &mut asset.token, caller, amount)
        })
    }

    /// Stablecoin tokens of the caller into its ledger balance
    pub fn deposit_stablecoin(&mut self, caller: &AccountId, amount: Amount) -> AusdResult<()> {
        self.transact(|p| {
            p.stablecoin_adapter
                .deposit(caller, &mut p.book_keeper, &mut p.stablecoin, caller, amount)
        })
    }

    /// The caller's ledger stablecoin out to stablecoin tokens
    pub fn withdraw_stablecoin(&mut self, caller: &AccountId, amount: Amount) -> AusdResult<()> {
        self.transact(|p| {
            p.stablecoin_adapter
                .withdraw(caller, &mut p.book_keeper, &mut p.stablecoin, caller, amount)
        })
    }

    // ============ Ledger ============

    /// Lets `delegate` act for the caller's ledger account
    pub fn whitelist(&mut self, caller: &AccountId, delegate: AccountId) -> AusdResult<()> {
        self.book_keeper.whitelist(caller, delegate)
    }

    pub fn blacklist(&mut self, caller: &AccountId, delegate: AccountId) -> AusdResult<()> {
        self.book_keeper.blacklist(caller, delegate)
    }

    /// Refreshes a pool's price with safety margin from its feed
    pub fn set_price(&mut self, pool_id: &PoolId) -> AusdResult<Rate> {
        self.transact(|p| p.price_oracle.set_price(&mut p.book_keeper, pool_id))
    }

    pub fn accrue_stability_fee(&mut self, pool_id: &PoolId, now: u64) -> AusdResult<Value> {
        self.book_keeper.accrue_stability_fee(pool_id, now)
    }

    // ============ Positions ============

    pub fn open_position(&mut self, caller: &AccountId, pool_id: &PoolId, owner: &AccountId) -> AusdResult<PositionId> {
        self.transact(|p| p.position_manager.open(caller, &mut p.book_keeper, pool_id, owner))
    }

    pub fn adjust_position(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        collateral_delta: i128,
        debt_share_delta: i128,
        now: u64,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager.adjust_position(
                caller,
                &mut p.book_keeper,
                position_id,
                collateral_delta,
                debt_share_delta,
                now,
            )
        })
    }

    /// Deposits collateral tokens, locks them and mints `debt_share`
    ///
    /// The minted stablecoin leaves as tokens to the caller; sub-token dust
    /// stays in the caller's ledger balance. Returns the tokens received.
    pub fn lock_and_mint(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        collateral: Amount,
        debt_share: Amount,
        now: u64,
    ) -> AusdResult<Amount> {
        self.transact(|p| {
            let handle = p.position_manager.handle(position_id)?;

            // 1. Tokens into the position account
            if !collateral.is_zero() {
                let asset = p
                    .collaterals
                    .get_mut(&handle.pool_id)
                    .ok_or(AusdError::PoolNotInitialized { pool_id: handle.pool_id })?;
                asset
                    .adapter
                    .deposit(caller, &mut p.book_keeper, &mut asset.token, &handle.account, collateral)?;
            }

            // 2. Lock and mint
            p.position_manager.adjust_position(
                caller,
                &mut p.book_keeper,
                position_id,
                collateral.to_delta()?,
                debt_share.to_delta()?,
                now,
            )?;
            if debt_share.is_zero() {
                return Ok(Amount::ZERO);
            }

            // 3. Minted stablecoin out as tokens
            let rate = p.book_keeper.pool_config().pool(&handle.pool_id)?.debt_accumulated_rate;
            let minted = debt_share.mul_rate(rate)?;
            p.position_manager
                .move_stablecoin(caller, &mut p.book_keeper, position_id, caller, minted)?;
            let tokens = minted.to_amount();
            if !tokens.is_zero() {
                p.stablecoin_adapter
                    .withdraw(caller, &mut p.book_keeper, &mut p.stablecoin, caller, tokens)?;
            }
            Ok(tokens)
        })
    }

    /// Repays `debt_share` with stablecoin tokens, unlocks `collateral` and
    /// pays it out as collateral tokens
    ///
    /// The caller must have approved the stablecoin adapter for the
    /// repayment, rounded up to whole token units.
    pub fn repay_and_unlock(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        debt_share: Amount,
        collateral: Amount,
        now: u64,
    ) -> AusdResult<()> {
        self.transact(|p| {
            let handle = p.position_manager.handle(position_id)?;
            if p.book_keeper.live() {
                p.book_keeper.accrue_stability_fee(&handle.pool_id, now)?;
            }

            // 1. Stablecoin tokens into the position account
            if !debt_share.is_zero() {
                let rate = p.book_keeper.pool_config().pool(&handle.pool_id)?.debt_accumulated_rate;
                let owed = debt_share.mul_rate(rate)?;
                p.stablecoin_adapter
                    .deposit_value(caller, &mut p.book_keeper, &mut p.stablecoin, &handle.account, owed)?;
            }

            // 2. Repay and unlock
            p.position_manager.adjust_position(
                caller,
                &mut p.book_keeper,
                position_id,
                collateral.to_negative_delta()?,
                debt_share.to_negative_delta()?,
                now,
            )?;

            // 3. Collateral out as tokens
            if !collateral.is_zero() {
                p.position_manager
                    .move_collateral(caller, &mut p.book_keeper, position_id, caller, collateral)?;
                let asset = p
                    .collaterals
                    .get_mut(&handle.pool_id)
                    .ok_or(AusdError::PoolNotInitialized { pool_id: handle.pool_id })?;
                asset
                    .adapter
                    .withdraw(caller, &mut p.book_keeper, &mut asset.token, caller, collateral)?;
            }
            Ok(())
        })
    }

    pub fn move_collateral(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        dst: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager
                .move_collateral(caller, &mut p.book_keeper, position_id, dst, amount)
        })
    }

    pub fn move_collateral_between(
        &mut self,
        caller: &AccountId,
        src_id: PositionId,
        dst_id: PositionId,
        amount: Amount,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager
                .move_collateral_between(caller, &mut p.book_keeper, src_id, dst_id, amount)
        })
    }

    pub fn move_stablecoin(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        dst: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager
                .move_stablecoin(caller, &mut p.book_keeper, position_id, dst, value)
        })
    }

    pub fn move_position(&mut self, caller: &AccountId, src_id: PositionId, dst_id: PositionId) -> AusdResult<()> {
        self.transact(|p| p.position_manager.move_position(caller, &mut p.book_keeper, src_id, dst_id))
    }

    pub fn allow_manage_position(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        delegate: &AccountId,
        allowed: bool,
    ) -> AusdResult<()> {
        self.position_manager.allow_manage_position(caller, position_id, delegate, allowed)
    }

    pub fn allow_migrate_position(&mut self, caller: &AccountId, migrant: &AccountId, allowed: bool) -> AusdResult<()> {
        self.position_manager.allow_migrate_position(caller, migrant, allowed)
    }

    pub fn export_position(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        destination: &AccountId,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager
                .export_position(caller, &mut p.book_keeper, position_id, destination)
        })
    }

    pub fn import_position(&mut self, caller: &AccountId, source: &AccountId, position_id: PositionId) -> AusdResult<()> {
        self.transact(|p| {
            p.position_manager
                .import_position(caller, &mut p.book_keeper, source, position_id)
        })
    }

    // ============ Liquidation ============

    /// Liquidates a managed position
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        debt_share_to_repay: Amount,
        max_collateral_to_sell: Amount,
        flash_callee: Option<&mut dyn FlashLendingCallee>,
        data: &[u8],
        now: u64,
    ) -> AusdResult<LiquidationOutcome> {
        let handle = self.position_manager.handle(position_id)?;
        self.liquidate_account(
            caller,
            &handle.pool_id,
            &handle.account,
            debt_share_to_repay,
            max_collateral_to_sell,
            flash_callee,
            data,
            now,
        )
    }

    /// Liquidates any ledger position, managed or not
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate_account(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        position_account: &AccountId,
        debt_share_to_repay: Amount,
        max_collateral_to_sell: Amount,
        flash_callee: Option<&mut dyn FlashLendingCallee>,
        data: &[u8],
        now: u64,
    ) -> AusdResult<LiquidationOutcome> {
        self.transact(|p| {
            let mut ctx = LiquidationContext {
                book_keeper: &mut p.book_keeper,
                stablecoin: &mut p.stablecoin,
                stablecoin_adapter: &p.stablecoin_adapter,
                system_debt_engine: p.accounts.system_debt_engine,
                stablecoin_reference_price: p.price_oracle.stablecoin_reference_price(),
            };
            p.liquidation_engine.liquidate(
                caller,
                &mut ctx,
                pool_id,
                position_account,
                debt_share_to_repay,
                max_collateral_to_sell,
                flash_callee,
                data,
                now,
            )
        })
    }

    // ============ System Debt ============

    /// Nets the system debt engine's stablecoin against its bad debt
    pub fn settle_system_bad_debt(&mut self, value: Value) -> AusdResult<()> {
        self.transact(|p| p.system_debt_engine.settle_system_bad_debt(&mut p.book_keeper, value))
    }

    pub fn withdraw_stablecoin_surplus(
        &mut self,
        caller: &AccountId,
        recipient: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.system_debt_engine
                .withdraw_stablecoin_surplus(caller, &mut p.book_keeper, recipient, value)
        })
    }

    pub fn withdraw_collateral_surplus(
        &mut self,
        caller: &AccountId,
        pool_id: &PoolId,
        recipient: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        self.transact(|p| {
            p.system_debt_engine
                .withdraw_collateral_surplus(caller, &mut p.book_keeper, pool_id, recipient, amount)
        })
    }

    // ============ Settlement ============

    /// Freezes the ledger, liquidations, surplus withdrawals and prices
    pub fn cage(&mut self, caller: &AccountId, cage_cooldown: u64, now: u64) -> AusdResult<()> {
        self.transact(|p| {
            let targets = CageTargets {
                book_keeper: &mut p.book_keeper,
                liquidation_engine: &mut p.liquidation_engine,
                system_debt_engine: &mut p.system_debt_engine,
                price_oracle: &mut p.price_oracle,
            };
            p.show_stopper.cage(caller, targets, cage_cooldown, now)
        })
    }

    pub fn cage_pool(&mut self, pool_id: &PoolId) -> AusdResult<Rate> {
        self.transact(|p| p.show_stopper.cage_pool(&p.book_keeper, &p.price_oracle, pool_id))
    }

    pub fn accumulate_bad_debt(&mut self, pool_id: &PoolId, position_account: &AccountId) -> AusdResult<()> {
        self.transact(|p| {
            p.show_stopper
                .accumulate_bad_debt(&mut p.book_keeper, pool_id, position_account)
        })
    }

    /// Claims the leftover collateral of a settled managed position
    pub fn redeem_locked_collateral(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        recipient: &AccountId,
    ) -> AusdResult<Amount> {
        self.transact(|p| {
            p.position_manager.redeem_locked_collateral(
                caller,
                &mut p.book_keeper,
                &mut p.show_stopper,
                position_id,
                recipient,
            )
        })
    }

    pub fn finalize_debt(&mut self, now: u64) -> AusdResult<Value> {
        self.transact(|p| p.show_stopper.finalize_debt(&p.book_keeper, now))
    }

    pub fn finalize_cash_price(&mut self, pool_id: &PoolId) -> AusdResult<Rate> {
        self.transact(|p| p.show_stopper.finalize_cash_price(&p.book_keeper, pool_id))
    }

    pub fn accumulate_stablecoin(&mut self, caller: &AccountId, amount: Amount) -> AusdResult<()> {
        self.transact(|p| p.show_stopper.accumulate_stablecoin(caller, &mut p.book_keeper, amount))
    }

    pub fn redeem_stablecoin(&mut self, caller: &AccountId, pool_id: &PoolId, amount: Amount) -> AusdResult<Amount> {
        self.transact(|p| {
            p.show_stopper
                .redeem_stablecoin(caller, &mut p.book_keeper, pool_id, amount)
        })
    }
}
