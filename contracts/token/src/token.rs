//! Fungible token ledger
//!
//! External token balances (stablecoin or collateral) in `Amount` scale.
//! Only holders of the `Mintable` role can mint.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, EventLog},
    require_role, AccountId, Amount, Role, SharedAccessControl,
};

/// Static token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone)]
pub struct Token {
    access: SharedAccessControl,
    metadata: TokenMetadata,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<(AccountId, AccountId), Amount>,
    total_supply: Amount,
    events: EventLog,
}

impl Token {
    pub fn new(access: SharedAccessControl, name: &str, symbol: &str) -> Self {
        Self {
            access,
            metadata: TokenMetadata {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals: Amount::DECIMALS,
            },
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            total_supply: Amount::ZERO,
            events: EventLog::new(),
        }
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or_default()
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn debit(&mut self, from: &AccountId, amount: Amount) -> AusdResult<()> {
        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .map_err(|_| AusdError::InsufficientTokenBalance { available, requested: amount })?;
        self.balances.insert(*from, remaining);
        Ok(())
    }

    fn credit(&mut self, to: &AccountId, amount: Amount) -> AusdResult<()> {
        let balance = self.balance_of(to).checked_add(amount)?;
        self.balances.insert(*to, balance);
        Ok(())
    }

    fn spend_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: Amount) -> AusdResult<()> {
        if owner == spender {
            return Ok(());
        }
        let available = self.allowance(owner, spender);
        let remaining = available
            .checked_sub(amount)
            .map_err(|_| AusdError::InsufficientTokenBalance { available, requested: amount })?;
        self.allowances.insert((*owner, *spender), remaining);
        Ok(())
    }

    pub fn transfer(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> AusdResult<()> {
        self.transfer_from(caller, caller, to, amount)
    }

    pub fn approve(&mut self, caller: &AccountId, spender: &AccountId, amount: Amount) -> AusdResult<()> {
        if spender.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "spender cannot be zero" });
        }
        self.allowances.insert((*caller, *spender), amount);
        self.events.emit(AusdEvent::TokenApproval { owner: *caller, spender: *spender, amount });
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        caller: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        // 1. Recipient must be valid
        if to.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "recipient cannot be zero" });
        }

        // 2. Balance, then allowance
        let available = self.balance_of(from);
        if available < amount {
            return Err(AusdError::InsufficientTokenBalance { available, requested: amount });
        }
        self.spend_allowance(from, caller, amount)?;

        // 3. Move
        self.debit(from, amount)?;
        self.credit(to, amount)?;

        debug!(symbol = %self.metadata.symbol, %from, %to, %amount, "token transfer");
        self.events.emit(AusdEvent::TokenTransfer { from: *from, to: *to, amount });
        Ok(())
    }

    /// Creates tokens; `Mintable` role
    pub fn mint(&mut self, caller: &AccountId, to: &AccountId, amount: Amount) -> AusdResult<()> {
        require_role(self.access.as_ref(), Role::Mintable, caller)?;
        if to.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "recipient cannot be zero" });
        }
        let total_supply = self.total_supply.checked_add(amount)?;
        self.credit(to, amount)?;
        self.total_supply = total_supply;

        debug!(symbol = %self.metadata.symbol, %to, %amount, "token mint");
        self.events.emit(AusdEvent::TokenMint { to: *to, amount, new_total_supply: total_supply });
        Ok(())
    }

    /// Destroys tokens of `from`; needs an allowance unless the caller is `from`
    pub fn burn(&mut self, caller: &AccountId, from: &AccountId, amount: Amount) -> AusdResult<()> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(AusdError::InsufficientTokenBalance { available, requested: amount });
        }
        self.spend_allowance(from, caller, amount)?;
        self.debit(from, amount)?;
        self.total_supply = self.total_supply.checked_sub(amount)?;

        debug!(symbol = %self.metadata.symbol, %from, %amount, "token burn");
        self.events.emit(AusdEvent::TokenBurn {
            from: *from,
            amount,
            new_total_supply: self.total_supply,
        });
        Ok(())
    }
}
