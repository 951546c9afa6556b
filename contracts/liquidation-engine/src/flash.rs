//! Flash lending callback
//!
//! A flash liquidation hands the collateral to the callee before any
//! stablecoin is paid. The callee is untrusted: it only gets a handle that
//! acts as its own account on the ledger and the stablecoin token, and must
//! leave `repayment` tokens with the strategy account before returning.

use ausd_book_keeper::BookKeeper;
use ausd_common::{errors::AusdResult, AccountId, Amount, PoolId, Value};
use ausd_token::Token;

/// Everything a callee sees during the callback
#[derive(Debug)]
pub struct FlashLendingCall<'a> {
    book_keeper: &'a mut BookKeeper,
    stablecoin: &'a mut Token,
    callee: AccountId,
    /// Account that must receive the repayment tokens
    pub strategy: AccountId,
    pub liquidator: AccountId,
    pub pool_id: PoolId,
    /// Free collateral already credited to the callee
    pub collateral_amount: Amount,
    pub debt_value_to_repay: Value,
    /// Tokens the strategy must hold from the callee on return
    pub repayment: Amount,
    pub data: &'a [u8],
}

impl<'a> FlashLendingCall<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        book_keeper: &'a mut BookKeeper,
        stablecoin: &'a mut Token,
        callee: AccountId,
        strategy: AccountId,
        liquidator: AccountId,
        pool_id: PoolId,
        collateral_amount: Amount,
        debt_value_to_repay: Value,
        repayment: Amount,
        data: &'a [u8],
    ) -> Self {
        Self {
            book_keeper,
            stablecoin,
            callee,
            strategy,
            liquidator,
            pool_id,
            collateral_amount,
            debt_value_to_repay,
            repayment,
            data,
        }
    }

    /// Account every operation below acts as
    pub fn callee(&self) -> AccountId {
        self.callee
    }

    /// Callee's free collateral in the liquidated pool
    pub fn collateral(&self) -> Amount {
        self.book_keeper.collateral_token(&self.pool_id, &self.callee)
    }

    /// Callee's internal stablecoin balance
    pub fn stablecoin(&self) -> Value {
        self.book_keeper.stablecoin(&self.callee)
    }

    /// Callee's stablecoin token balance
    pub fn token_balance(&self) -> Amount {
        self.stablecoin.balance_of(&self.callee)
    }

    /// Sends free collateral of the callee to `dst`
    pub fn move_collateral(&mut self, dst: &AccountId, amount: Amount) -> AusdResult<()> {
        let pool_id = self.pool_id;
        self.book_keeper
            .move_collateral(&self.callee, &pool_id, &self.callee, dst, amount)
    }

    /// Sends internal stablecoin of the callee to `dst`
    pub fn move_stablecoin(&mut self, dst: &AccountId, value: Value) -> AusdResult<()> {
        self.book_keeper.move_stablecoin(&self.callee, &self.callee, dst, value)
    }

    /// Sends stablecoin tokens of the callee to `to`
    pub fn transfer(&mut self, to: &AccountId, amount: Amount) -> AusdResult<()> {
        self.stablecoin.transfer(&self.callee, to, amount)
    }

    /// Pays `amount` stablecoin tokens to the strategy
    pub fn repay(&mut self, amount: Amount) -> AusdResult<()> {
        let strategy = self.strategy;
        self.stablecoin.transfer(&self.callee, &strategy, amount)
    }
}

pub trait FlashLendingCallee {
    /// Ledger and token account receiving the collateral
    fn account(&self) -> AccountId;

    fn flash_lending_call(&mut self, call: FlashLendingCall<'_>) -> AusdResult<()>;
}
