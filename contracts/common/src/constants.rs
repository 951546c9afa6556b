//! Protocol Constants
//!
//! All magic numbers of the aUSD protocol. Risk parameters that vary per
//! collateral pool are not here; they live in `CollateralPoolParams`.

use primitive_types::U256;

/// Fixed-point scales
pub mod precision {
    use super::U256;

    /// Decimals of an `Amount` (collateral, debt shares, token balances)
    pub const AMOUNT_DECIMALS: u8 = 18;

    /// Decimals of a `Rate` (prices, accumulated rates, ratios)
    pub const RATE_DECIMALS: u8 = 27;

    /// Decimals of a `Value` (`Amount` x `Rate`)
    pub const VALUE_DECIMALS: u8 = 45;

    /// 1e18
    pub const WAD: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

    /// 1e27
    pub const RAY: U256 = U256([11_515_845_246_265_065_472, 54_210_108, 0, 0]);

    /// 1e45
    pub const RAD: U256 = U256([802_379_605_485_813_760, 16_178_822_382_532_126_880, 2_938_735, 0]);
}

/// Basis point configuration
pub mod fees {
    /// Basis points denominator
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Upper bound of the liquidator incentive (90% bonus)
    pub const MAX_LIQUIDATOR_INCENTIVE_BPS: u64 = 19_000;
}

/// Liquidation configuration
pub mod liquidation {
    /// Default close factor: half of a position may be liquidated at once
    pub const DEFAULT_CLOSE_FACTOR_BPS: u64 = 5_000;

    /// Default liquidator incentive (5% bonus)
    pub const DEFAULT_LIQUIDATOR_INCENTIVE_BPS: u64 = 10_500;

    /// Default treasury cut, carved out of the incentive margin
    pub const DEFAULT_TREASURY_FEES_BPS: u64 = 500;
}

/// Global settlement configuration
pub mod settlement {
    /// One week in seconds
    pub const WEEK: u64 = 7 * 24 * 60 * 60;

    /// Minimum cooldown between cage and debt finalization
    pub const MIN_CAGE_COOLDOWN: u64 = WEEK;

    /// Maximum cooldown between cage and debt finalization (13 weeks)
    pub const MAX_CAGE_COOLDOWN: u64 = 13 * WEEK;
}

/// Domain separators for derived accounts
pub mod domains {
    /// Prefix hashed into every position account
    pub const POSITION_ACCOUNT: &[u8] = b"ausd.position";
}

#[cfg(test)]
mod tests {
    use super::precision::*;
    use super::U256;

    #[test]
    fn test_scales_match_decimals() {
        assert_eq!(WAD, U256::exp10(AMOUNT_DECIMALS as usize));
        assert_eq!(RAY, U256::exp10(RATE_DECIMALS as usize));
        assert_eq!(RAD, U256::exp10(VALUE_DECIMALS as usize));
        assert_eq!(RAD, WAD * RAY);
    }
}
