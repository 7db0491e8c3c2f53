//! Arbitrary precision integers.
//!
//! Values outside the `i64` range live on the heap as `LongInt`. They are
//! immutable, so copying shares the original entry.

use std::fmt;

use num_bigint::BigInt;

/// Immutable big integer payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LongInt(BigInt);

impl LongInt {
    #[must_use]
    pub fn new(value: BigInt) -> Self {
        Self(value)
    }

    /// Returns the wrapped integer.
    #[must_use]
    pub fn value(&self) -> &BigInt {
        &self.0
    }
}

impl From<BigInt> for LongInt {
    fn from(value: BigInt) -> Self {
        Self(value)
    }
}

impl fmt::Display for LongInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
