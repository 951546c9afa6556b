//! System Debt Engine
//!
//! Ledger account that receives stability fees, liquidation repayments and
//! treasury collateral, and that carries the bad debt of confiscated
//! positions.

use tracing::info;

use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, Component, EventLog},
    require_owner_or_gov, require_owner_or_show_stopper, AccountId, Amount, PoolId,
    SharedAccessControl, Value,
};

use crate::ledger::BookKeeper;

#[derive(Debug, Clone)]
pub struct SystemDebtEngine {
    access: SharedAccessControl,
    account: AccountId,
    /// Stablecoin kept back from surplus withdrawals
    surplus_buffer: Value,
    live: bool,
    events: EventLog,
}

impl SystemDebtEngine {
    pub fn new(access: SharedAccessControl, account: AccountId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "system debt engine account is zero" });
        }
        Ok(Self {
            access,
            account,
            surplus_buffer: Value::ZERO,
            live: true,
            events: EventLog::new(),
        })
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn surplus_buffer(&self) -> Value {
        self.surplus_buffer
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn set_surplus_buffer(&mut self, caller: &AccountId, value: Value) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        self.surplus_buffer = value;
        Ok(())
    }

    /// Cancels `value` of the engine's bad debt against its stablecoin
    pub fn settle_system_bad_debt(&mut self, book_keeper: &mut BookKeeper, value: Value) -> AusdResult<()> {
        book_keeper.settle_system_bad_debt(&self.account, value)
    }

    /// Pays out stablecoin above the surplus buffer; only while no bad debt is outstanding
    pub fn withdraw_stablecoin_surplus(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        recipient: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        if !self.live {
            return Err(AusdError::NotLive);
        }
        let bad_debt = book_keeper.system_bad_debt(&self.account);
        if !bad_debt.is_zero() {
            return Err(AusdError::OutstandingBadDebt { bad_debt });
        }
        let balance = book_keeper.stablecoin(&self.account);
        let withdrawable = balance.saturating_sub(self.surplus_buffer);
        if value > withdrawable {
            return Err(AusdError::InsufficientStablecoin { available: withdrawable, requested: value });
        }

        book_keeper.move_stablecoin(&self.account, &self.account, recipient, value)?;
        info!(%recipient, %value, "stablecoin surplus withdrawn");
        self.events.emit(AusdEvent::SurplusWithdrawn {
            recipient: *recipient,
            stablecoin: value,
            collateral: Amount::ZERO,
        });
        Ok(())
    }

    /// Pays out collateral collected as treasury fees
    pub fn withdraw_collateral_surplus(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        recipient: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        require_owner_or_gov(self.access.as_ref(), caller)?;
        book_keeper.move_collateral(&self.account, pool_id, &self.account, recipient, amount)?;
        info!(%pool_id, %recipient, %amount, "collateral surplus withdrawn");
        self.events.emit(AusdEvent::SurplusWithdrawn {
            recipient: *recipient,
            stablecoin: Value::ZERO,
            collateral: amount,
        });
        Ok(())
    }

    /// Stops surplus withdrawals and nets stablecoin against bad debt
    pub fn cage(&mut self, caller: &AccountId, book_keeper: &mut BookKeeper) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if !self.live {
            return Ok(());
        }
        self.live = false;

        let settle = book_keeper
            .stablecoin(&self.account)
            .min(book_keeper.system_bad_debt(&self.account));
        if !settle.is_zero() {
            book_keeper.settle_system_bad_debt(&self.account, settle)?;
        }

        info!(%settle, "system debt engine caged");
        self.events.emit(AusdEvent::SystemCaged { component: Component::SystemDebtEngine });
        Ok(())
    }

    pub fn uncage(&mut self, caller: &AccountId) -> AusdResult<()> {
        require_owner_or_show_stopper(self.access.as_ref(), caller)?;
        if !self.live {
            self.live = true;
            info!("system debt engine uncaged");
            self.events.emit(AusdEvent::SystemUncaged { component: Component::SystemDebtEngine });
        }
        Ok(())
    }
}
