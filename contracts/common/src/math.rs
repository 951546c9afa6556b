//! Fixed-Point Math for aUSD Protocol
//!
//! Three distinct scales over `U256`:
//! - `Amount` (1e18): collateral, debt shares, token balances
//! - `Rate` (1e27): prices, accumulated rates, ratios
//! - `Value` (1e45): ledger stablecoin balances, ceilings, bad debt
//!
//! `Amount x Rate = Value` is exact. Every helper that divides rounds down
//! unless its name ends in `_ceil`.

use core::fmt;
use core::ops::Mul;

use borsh::{BorshDeserialize, BorshSerialize};
use primitive_types::{U256, U512};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::fees::BPS_DENOMINATOR;
use crate::constants::precision::{
    AMOUNT_DECIMALS, RAD, RATE_DECIMALS, RAY, VALUE_DECIMALS, WAD,
};
use crate::errors::{AusdError, AusdResult};

/// `a * b / denominator` with a 512-bit intermediate, rounded down
pub fn mul_div(a: U256, b: U256, denominator: U256) -> AusdResult<U256> {
    if denominator.is_zero() {
        return Err(AusdError::DivisionByZero);
    }
    let result = a.full_mul(b) / U512::from(denominator);
    U256::try_from(result).map_err(|_| AusdError::Overflow)
}

/// `a * b / denominator` with a 512-bit intermediate, rounded up
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256) -> AusdResult<U256> {
    if denominator.is_zero() {
        return Err(AusdError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let mut result = product / denominator;
    if !(product % denominator).is_zero() {
        result = result + U512::one();
    }
    U256::try_from(result).map_err(|_| AusdError::Overflow)
}

fn fmt_fixed(f: &mut fmt::Formatter<'_>, raw: U256, scale: U256, decimals: u8) -> fmt::Result {
    let integer = raw / scale;
    let fraction = raw % scale;
    if fraction.is_zero() {
        return write!(f, "{}", integer);
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    write!(f, "{}.{}", integer, digits.trim_end_matches('0'))
}

macro_rules! fixed_point {
    ($(#[$meta:meta])* $name:ident, $scale:expr, $decimals:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(U256);

        impl $name {
            pub const ZERO: Self = Self(U256([0, 0, 0, 0]));
            pub const ONE: Self = Self($scale);
            pub const DECIMALS: u8 = $decimals;

            pub const fn from_raw(raw: U256) -> Self {
                Self(raw)
            }

            pub const fn raw(&self) -> U256 {
                self.0
            }

            /// Whole units, e.g. `from_units(3)` is 3.0
            pub fn from_units(units: u64) -> Self {
                Self(U256::from(units) * $scale)
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            pub fn checked_add(self, other: Self) -> AusdResult<Self> {
                self.0.checked_add(other.0).map(Self).ok_or(AusdError::Overflow)
            }

            pub fn checked_sub(self, other: Self) -> AusdResult<Self> {
                self.0.checked_sub(other.0).map(Self).ok_or(AusdError::Underflow)
            }

            pub fn saturating_sub(self, other: Self) -> Self {
                Self(self.0.saturating_sub(other.0))
            }

            /// `self x bps / 10000`, rounded down
            pub fn mul_bps(self, bps: u64) -> AusdResult<Self> {
                self.mul_div(bps, BPS_DENOMINATOR)
            }

            /// `self x numerator / denominator`, rounded down
            pub fn mul_div(self, numerator: u64, denominator: u64) -> AusdResult<Self> {
                mul_div(self.0, U256::from(numerator), U256::from(denominator)).map(Self)
            }

            /// Scale-free ratio `self / other` as a `Rate`, rounded down
            pub fn ratio(self, other: Self) -> AusdResult<Rate> {
                mul_div(self.0, RAY, other.0).map(Rate)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                fmt_fixed(f, self.0, $scale, $decimals)?;
                f.write_str(")")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt_fixed(f, self.0, $scale, $decimals)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                Serialize::serialize(&(self.0).0, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                <[u64; 4] as Deserialize>::deserialize(deserializer).map(|limbs| Self(U256(limbs)))
            }
        }

        impl BorshSerialize for $name {
            fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
                BorshSerialize::serialize(&(self.0).0, writer)
            }
        }

        impl BorshDeserialize for $name {
            fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
                <[u64; 4]>::deserialize_reader(reader).map(|limbs| Self(U256(limbs)))
            }
        }
    };
}

fixed_point!(
    /// 18-decimal quantity: collateral, debt shares, token balances
    Amount, WAD, AMOUNT_DECIMALS
);

fixed_point!(
    /// 27-decimal ratio: prices, accumulated rates, fee rates
    Rate, RAY, RATE_DECIMALS
);

fixed_point!(
    /// 45-decimal value: `Amount x Rate`
    Value, RAD, VALUE_DECIMALS
);

// ============ Amount ============

impl Amount {
    /// Raw 18-decimal integer, e.g. `from_wad(5 * 10^17)` is 0.5
    pub fn from_wad(wad: u128) -> Self {
        Self(U256::from(wad))
    }

    /// Exact product, checked
    pub fn mul_rate(self, rate: Rate) -> AusdResult<Value> {
        self.0.checked_mul(rate.0).map(Value).ok_or(AusdError::Overflow)
    }

    /// `self x rate` kept in `Amount` scale, rounded down
    pub fn rmul(self, rate: Rate) -> AusdResult<Amount> {
        mul_div(self.0, rate.0, RAY).map(Amount)
    }

    /// `self / rate` kept in `Amount` scale, rounded down
    pub fn rdiv(self, rate: Rate) -> AusdResult<Amount> {
        mul_div(self.0, RAY, rate.0).map(Amount)
    }

    /// Ledger value of an external token amount (`x 1e27`)
    pub fn to_value(self) -> AusdResult<Value> {
        self.mul_rate(Rate::ONE)
    }

    /// Applies a signed `Amount`-scale delta
    pub fn add_signed(self, delta: i128) -> AusdResult<Amount> {
        let magnitude = Amount::from_wad(delta.unsigned_abs());
        if delta >= 0 {
            self.checked_add(magnitude)
        } else {
            self.checked_sub(magnitude)
        }
    }

    /// Magnitude of a signed delta
    pub fn from_signed_abs(delta: i128) -> Amount {
        Amount::from_wad(delta.unsigned_abs())
    }

    /// Positive signed delta of this amount
    pub fn to_delta(self) -> AusdResult<i128> {
        if self.0 > U256::from(i128::MAX as u128) {
            return Err(AusdError::Overflow);
        }
        Ok(self.0.as_u128() as i128)
    }

    /// Negative signed delta of this amount
    pub fn to_negative_delta(self) -> AusdResult<i128> {
        self.to_delta().map(|d| -d)
    }
}

impl Mul<Rate> for Amount {
    type Output = Value;

    /// Saturating product, for queries; state transitions use `mul_rate`
    fn mul(self, rate: Rate) -> Value {
        Value(self.0.saturating_mul(rate.0))
    }
}

// ============ Rate ============

impl Rate {
    /// `numerator / denominator` in 27 decimals; zero when `denominator` is zero
    pub fn from_ratio(numerator: u64, denominator: u64) -> Self {
        mul_div(U256::from(numerator), RAY, U256::from(denominator))
            .map(Self)
            .unwrap_or(Self::ZERO)
    }

    /// Raw 27-decimal integer
    pub fn from_ray(ray: u128) -> Self {
        Self(U256::from(ray))
    }

    /// `bps / 10000` as a rate
    pub fn from_bps(bps: u64) -> Self {
        Self::from_ratio(bps, BPS_DENOMINATOR)
    }

    /// `self x other`, rounded down
    pub fn rmul(self, other: Rate) -> AusdResult<Rate> {
        mul_div(self.0, other.0, RAY).map(Rate)
    }

    /// `self / other`, rounded down
    pub fn rdiv(self, other: Rate) -> AusdResult<Rate> {
        if other.is_zero() {
            return Err(AusdError::DivisionByZero);
        }
        mul_div(self.0, RAY, other.0).map(Rate)
    }

    /// `self ^ n` by repeated squaring, each step rounded down
    pub fn rpow(self, mut n: u64) -> AusdResult<Rate> {
        let mut base = self;
        let mut result = Rate::ONE;
        while n > 0 {
            if n & 1 == 1 {
                result = result.rmul(base)?;
            }
            n >>= 1;
            if n > 0 {
                base = base.rmul(base)?;
            }
        }
        Ok(result)
    }
}

// ============ Value ============

impl Value {
    /// `self / rate` back into `Amount` scale, rounded down
    pub fn div_rate(self, rate: Rate) -> AusdResult<Amount> {
        if rate.is_zero() {
            return Err(AusdError::DivisionByZero);
        }
        Ok(Amount(self.0 / rate.0))
    }

    /// `self / rate` back into `Amount` scale, rounded up
    pub fn div_rate_ceil(self, rate: Rate) -> AusdResult<Amount> {
        mul_div_ceil(self.0, U256::one(), rate.0).map(Amount)
    }

    /// `self x rate` kept in `Value` scale, rounded down
    pub fn rmul(self, rate: Rate) -> AusdResult<Value> {
        mul_div(self.0, rate.0, RAY).map(Value)
    }

    /// `self / rate` kept in `Value` scale, rounded down
    pub fn rdiv(self, rate: Rate) -> AusdResult<Value> {
        if rate.is_zero() {
            return Err(AusdError::DivisionByZero);
        }
        mul_div(self.0, RAY, rate.0).map(Value)
    }

    /// External token amount for a ledger value, rounded down
    pub fn to_amount(self) -> Amount {
        Amount(self.0 / RAY)
    }

    /// External token amount for a ledger value, rounded up
    pub fn to_amount_ceil(self) -> Amount {
        let amount = self.0 / RAY;
        if (self.0 % RAY).is_zero() {
            Amount(amount)
        } else {
            Amount(amount + U256::one())
        }
    }
}
