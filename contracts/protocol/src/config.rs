//! Deployment configuration

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use ausd_common::{AccountId, Value};

/// Parameters fixed when a protocol instance is deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DeployConfig {
    /// Holder of the Owner role
    pub owner: AccountId,
    /// Global cap on stablecoin issued across pools
    pub total_debt_ceiling: Value,
    pub stablecoin_name: String,
    pub stablecoin_symbol: String,
}

impl DeployConfig {
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            total_debt_ceiling: Value::from_units(100_000_000),
            stablecoin_name: "aUSD Stablecoin".to_string(),
            stablecoin_symbol: "AUSD".to_string(),
        }
    }
}

/// Ledger identities of the protocol's own components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolAccounts {
    pub system_debt_engine: AccountId,
    pub price_oracle: AccountId,
    pub position_manager: AccountId,
    pub liquidation_engine: AccountId,
    pub liquidation_strategy: AccountId,
    pub show_stopper: AccountId,
    pub stablecoin_adapter: AccountId,
}

impl ProtocolAccounts {
    /// Accounts are unique per owner so two deployments never share one
    pub fn derive(owner: &AccountId) -> Self {
        let account = |component: &str| AccountId::from_label(&format!("ausd.{component}.{owner}"));
        Self {
            system_debt_engine: account("system-debt-engine"),
            price_oracle: account("price-oracle"),
            position_manager: account("position-manager"),
            liquidation_engine: account("liquidation-engine"),
            liquidation_strategy: account("liquidation-strategy"),
            show_stopper: account("show-stopper"),
            stablecoin_adapter: account("stablecoin-adapter"),
        }
    }

    /// Account of the collateral adapter for one pool
    pub fn collateral_adapter(owner: &AccountId, symbol: &str) -> AccountId {
        AccountId::from_label(&format!("ausd.collateral-adapter.{symbol}.{owner}"))
    }
}
