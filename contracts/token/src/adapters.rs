//! Token adapters
//!
//! Bridges between external token balances and the ledger's internal
//! balances. Each call runs its token and ledger legs together: the token
//! ledger is restored if the ledger leg fails, and the ledger leg only writes
//! after validating, so neither side is left half-transferred.

use tracing::debug;

use ausd_book_keeper::BookKeeper;
use ausd_common::{
    errors::{AusdError, AusdResult},
    transactional, AccountId, Amount, PoolId, Value,
};

use crate::token::Token;

// ============ Stablecoin ============

/// Converts between stablecoin tokens (`Amount`) and ledger stablecoin (`Value`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StablecoinAdapter {
    account: AccountId,
}

impl StablecoinAdapter {
    pub fn new(account: AccountId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "stablecoin adapter account is zero" });
        }
        Ok(Self { account })
    }

    /// Ledger account and token spender of the adapter
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Burns `amount` tokens of the caller and credits `amount x 1e27` to
    /// `account` on the ledger; the caller must have approved the adapter
    pub fn deposit(
        &self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        token: &mut Token,
        account: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        let value = amount.to_value()?;
        transactional(token, |token| {
            token.burn(&self.account, caller, amount)?;
            book_keeper.move_stablecoin(&self.account, &self.account, account, value)
        })?;
        debug!(%caller, %account, %amount, "stablecoin deposited");
        Ok(())
    }

    /// Credits exactly `value` to `account`, burning `ceil(value / 1e27)`
    /// tokens of the caller
    pub fn deposit_value(
        &self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        token: &mut Token,
        account: &AccountId,
        value: Value,
    ) -> AusdResult<Amount> {
        let amount = value.to_amount_ceil();
        transactional(token, |token| {
            token.burn(&self.account, caller, amount)?;
            book_keeper.move_stablecoin(&self.account, &self.account, account, value)
        })?;
        debug!(%caller, %account, %value, %amount, "stablecoin value deposited");
        Ok(amount)
    }

    /// Debits `amount x 1e27` from the caller on the ledger and mints
    /// `amount` tokens to `recipient`
    pub fn withdraw(
        &self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        token: &mut Token,
        recipient: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        let value = amount.to_value()?;
        transactional(token, |token| {
            token.mint(&self.account, recipient, amount)?;
            book_keeper.move_stablecoin(caller, caller, &self.account, value)
        })?;
        debug!(%caller, %recipient, %amount, "stablecoin withdrawn");
        Ok(())
    }
}

// ============ Collateral ============

/// Moves collateral tokens in and out of one pool's free balances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralTokenAdapter {
    account: AccountId,
    pool_id: PoolId,
}

impl CollateralTokenAdapter {
    pub fn new(account: AccountId, pool_id: PoolId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "collateral adapter account is zero" });
        }
        Ok(Self { account, pool_id })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Pulls `amount` tokens from the caller and credits `account`'s free
    /// collateral; the caller must have approved the adapter
    pub fn deposit(
        &self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        token: &mut Token,
        account: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        if amount.is_zero() {
            return Err(AusdError::ZeroAmount);
        }
        let delta = amount.to_delta()?;
        transactional(token, |token| {
            token.transfer_from(&self.account, caller, &self.account, amount)?;
            book_keeper.add_collateral(&self.account, &self.pool_id, account, delta)
        })?;
        debug!(pool_id = %self.pool_id, %caller, %account, %amount, "collateral deposited");
        Ok(())
    }

    /// Debits the caller's free collateral and sends `amount` tokens to `recipient`
    pub fn withdraw(
        &self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        token: &mut Token,
        recipient: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        if amount.is_zero() {
            return Err(AusdError::ZeroAmount);
        }
        let delta = amount.to_negative_delta()?;
        transactional(token, |token| {
            token.transfer(&self.account, recipient, amount)?;
            book_keeper.add_collateral(&self.account, &self.pool_id, caller, delta)
        })?;
        debug!(pool_id = %self.pool_id, %caller, %recipient, %amount, "collateral withdrawn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ausd_book_keeper::CollateralPoolParams;
    use ausd_common::{AccessControlConfig, FixedPriceFeed, Rate, Role};
    use std::sync::Arc;

    struct Fixture {
        book_keeper: BookKeeper,
        stablecoin: Token,
        collateral: Token,
        stablecoin_adapter: StablecoinAdapter,
        collateral_adapter: CollateralTokenAdapter,
        faucet: AccountId,
        alice: AccountId,
        pool: PoolId,
    }

    fn fixture() -> Fixture {
        let owner = AccountId::from_label("owner");
        let faucet = AccountId::from_label("faucet");
        let alice = AccountId::from_label("alice");
        let pool = PoolId::from_symbol("WBTC");
        let stablecoin_adapter = StablecoinAdapter::new(AccountId::from_label("stablecoin-adapter")).unwrap();
        let collateral_adapter =
            CollateralTokenAdapter::new(AccountId::from_label("wbtc-adapter"), pool).unwrap();

        let access = Arc::new(AccessControlConfig::new(owner));
        access.grant_role(&owner, Role::Mintable, faucet).unwrap();
        access.grant_role(&owner, Role::Mintable, stablecoin_adapter.account()).unwrap();
        access.grant_role(&owner, Role::Adapter, collateral_adapter.account()).unwrap();

        let mut book_keeper = BookKeeper::new(access.clone(), AccountId::from_label("sde")).unwrap();
        book_keeper
            .pool_config_mut()
            .init_collateral_pool(
                &owner,
                pool,
                CollateralPoolParams::default(),
                Arc::new(FixedPriceFeed(Rate::ONE)),
                0,
            )
            .unwrap();

        Fixture {
            book_keeper,
            stablecoin: Token::new(access.clone(), "aUSD Stablecoin", "AUSD"),
            collateral: Token::new(access, "Wrapped BTC", "WBTC"),
            stablecoin_adapter,
            collateral_adapter,
            faucet,
            alice,
            pool,
        }
    }

    #[test]
    fn test_collateral_round_trip() {
        let mut f = fixture();
        f.collateral.mint(&f.faucet, &f.alice, Amount::from_units(10)).unwrap();
        f.collateral
            .approve(&f.alice, &f.collateral_adapter.account(), Amount::from_units(10))
            .unwrap();

        f.collateral_adapter
            .deposit(&f.alice, &mut f.book_keeper, &mut f.collateral, &f.alice, Amount::from_units(10))
            .unwrap();
        assert_eq!(f.book_keeper.collateral_token(&f.pool, &f.alice), Amount::from_units(10));
        assert!(f.collateral.balance_of(&f.alice).is_zero());

        f.collateral_adapter
            .withdraw(&f.alice, &mut f.book_keeper, &mut f.collateral, &f.alice, Amount::from_units(4))
            .unwrap();
        assert_eq!(f.book_keeper.collateral_token(&f.pool, &f.alice), Amount::from_units(6));
        assert_eq!(f.collateral.balance_of(&f.alice), Amount::from_units(4));
    }

    #[test]
    fn test_collateral_withdraw_over_balance_restores_token() {
        let mut f = fixture();
        f.collateral.mint(&f.faucet, &f.alice, Amount::from_units(10)).unwrap();
        f.collateral
            .approve(&f.alice, &f.collateral_adapter.account(), Amount::from_units(10))
            .unwrap();
        f.collateral_adapter
            .deposit(&f.alice, &mut f.book_keeper, &mut f.collateral, &f.alice, Amount::from_units(10))
            .unwrap();

        let bob = AccountId::from_label("bob");
        let result = f.collateral_adapter.withdraw(
            &bob,
            &mut f.book_keeper,
            &mut f.collateral,
            &bob,
            Amount::from_units(1),
        );
        assert!(matches!(result, Err(AusdError::InsufficientCollateral { .. })));
        assert!(f.collateral.balance_of(&bob).is_zero());
        assert_eq!(f.collateral.balance_of(&f.collateral_adapter.account()), Amount::from_units(10));
    }

    #[test]
    fn test_stablecoin_round_trip() {
        let mut f = fixture();
        f.stablecoin.mint(&f.faucet, &f.alice, Amount::from_units(3)).unwrap();
        let adapter = f.stablecoin_adapter.account();
        let minter = AccountId::from_label("minter");

        // adapter needs ledger stablecoin to hand out on deposit
        let unbacked = f.book_keeper.mint_unbacked_stablecoin(&f.faucet, &minter, &adapter, Value::from_units(3));
        assert!(unbacked.is_ok());

        f.stablecoin.approve(&f.alice, &adapter, Amount::from_units(3)).unwrap();
        f.stablecoin_adapter
            .deposit(&f.alice, &mut f.book_keeper, &mut f.stablecoin, &f.alice, Amount::from_units(3))
            .unwrap();
        assert_eq!(f.book_keeper.stablecoin(&f.alice), Value::from_units(3));
        assert!(f.stablecoin.total_supply().is_zero());

        f.stablecoin_adapter
            .withdraw(&f.alice, &mut f.book_keeper, &mut f.stablecoin, &f.alice, Amount::from_units(2))
            .unwrap();
        assert_eq!(f.book_keeper.stablecoin(&f.alice), Value::from_units(1));
        assert_eq!(f.stablecoin.balance_of(&f.alice), Amount::from_units(2));
    }

    #[test]
    fn test_deposit_value_burns_ceiling() {
        let mut f = fixture();
        let adapter = f.stablecoin_adapter.account();
        f.book_keeper
            .mint_unbacked_stablecoin(&f.faucet, &f.faucet, &adapter, Value::from_units(5))
            .unwrap();
        f.stablecoin.mint(&f.faucet, &f.alice, Amount::from_units(5)).unwrap();
        f.stablecoin.approve(&f.alice, &adapter, Amount::from_units(5)).unwrap();

        let one_raw = Amount::from_wad(1).mul_rate(Rate::from_ray(1)).unwrap();
        let value = Value::from_units(2).checked_add(one_raw).unwrap();
        let burned = f
            .stablecoin_adapter
            .deposit_value(&f.alice, &mut f.book_keeper, &mut f.stablecoin, &f.alice, value)
            .unwrap();
        assert_eq!(burned, Amount::from_wad(2_000_000_000_000_000_001));
        assert_eq!(f.book_keeper.stablecoin(&f.alice), value);
    }

    #[test]
    fn test_withdraw_without_ledger_balance_restores_token() {
        let mut f = fixture();
        let result = f.stablecoin_adapter.withdraw(
            &f.alice,
            &mut f.book_keeper,
            &mut f.stablecoin,
            &f.alice,
            Amount::from_units(1),
        );
        assert!(matches!(result, Err(AusdError::InsufficientStablecoin { .. })));
        assert!(f.stablecoin.total_supply().is_zero());
    }
}
