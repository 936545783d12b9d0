use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

use crate::hash::Hash32;

/// Cumulative proof-of-work, expressed as a nonnegative 256-bit integer.
///
/// spec.md §4.5/§9: "Big-integer ChainWork is required (256-bit arithmetic)."
/// Backed by `primitive_types::U256` (a four-limb `u64` big integer), the same
/// crate `zebra-chain` pulls in for exactly this purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ChainWork(#[serde(with = "u256_dec")] U256);

impl ChainWork {
    pub const ZERO: ChainWork = ChainWork(U256::zero());

    #[must_use]
    pub const fn from_u256(value: U256) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// `work(target) = floor(2^256 / (target + 1))`, per spec.md §4.5.
    ///
    /// `target` is interpreted as a big-endian 256-bit integer (the same
    /// convention as the PoW hash comparison in §4.4).
    #[must_use]
    pub fn from_target(target: &Hash32) -> Self {
        let target_int = target.as_u256();
        let denominator = target_int.saturating_add(U256::one());
        if denominator.is_zero() {
            // target == U256::MAX, denominator wrapped to zero: work is defined as 0.
            return Self::ZERO;
        }
        // 2^256 doesn't fit in U256, so compute via the equivalent
        // floor((2^256 - 1) / denominator) + (1 if (2^256-1) % denominator == denominator - 1 else 0)
        // is unnecessarily fiddly; instead use the identity
        // floor(2^256 / d) == floor((u256::MAX - d + 1) / d) + 1  for d > 0, d <= 2^256.
        let max = U256::MAX;
        let quotient = max / denominator;
        let remainder = max % denominator;
        // max == 2^256 - 1, so 2^256 = max + 1.
        // floor((max+1)/d) = quotient + floor((remainder+1)/d)
        let bump = if remainder.saturating_add(U256::one()) >= denominator {
            U256::one()
        } else {
            U256::zero()
        };
        Self(quotient.saturating_add(bump))
    }

    #[must_use]
    pub fn checked_add(&self, other: &ChainWork) -> Option<ChainWork> {
        self.0.checked_add(other.0).map(ChainWork)
    }

    #[must_use]
    pub fn saturating_add(&self, other: &ChainWork) -> ChainWork {
        ChainWork(self.0.saturating_add(other.0))
    }
}

impl Add for ChainWork {
    type Output = ChainWork;
    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(&rhs)
    }
}

impl fmt::Display for ChainWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

mod u256_dec {
    use primitive_types::U256;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(D::Error::custom)
    }
}
