//! Integer ranges returned by range queries.

use std::cmp::{max, min};
use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Bound of a range: -∞, a finite value, or +∞.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(BigInt),
    PosInf,
}

impl Bound {
    pub fn as_finite(&self) -> Option<&BigInt> {
        match self {
            Bound::Finite(n) => Some(n),
            _ => None,
        }
    }

    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a + b),
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => {
                // Undefined: use top
                Bound::PosInf
            }
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    /// Multiplication by a finite factor.
    pub fn scale(&self, factor: &BigInt) -> Bound {
        if factor.is_zero() {
            return Bound::Finite(BigInt::zero());
        }
        match self {
            Bound::Finite(n) => Bound::Finite(n * factor),
            Bound::NegInf if factor.is_positive() => Bound::NegInf,
            Bound::NegInf => Bound::PosInf,
            Bound::PosInf if factor.is_positive() => Bound::PosInf,
            Bound::PosInf => Bound::NegInf,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

/// Range `[low, high]`. The empty range has `low > high`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub low: Bound,
    pub high: Bound,
}

impl Range {
    pub fn new(low: Bound, high: Bound) -> Self {
        if low > high {
            Range::empty()
        } else {
            Range { low, high }
        }
    }

    pub fn finite(low: impl Into<BigInt>, high: impl Into<BigInt>) -> Self {
        Range::new(Bound::Finite(low.into()), Bound::Finite(high.into()))
    }

    pub fn constant(value: impl Into<BigInt>) -> Self {
        let value = value.into();
        Range {
            low: Bound::Finite(value.clone()),
            high: Bound::Finite(value),
        }
    }

    pub fn top() -> Self {
        Range {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    pub fn empty() -> Self {
        Range {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    /// Values of an unsigned machine word of `size` bits.
    pub fn unsigned(size: u32) -> Self {
        Range::finite(BigInt::zero(), (BigInt::one() << size) - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    pub fn is_finite(&self) -> bool {
        matches!((&self.low, &self.high), (Bound::Finite(_), Bound::Finite(_)))
    }

    pub fn as_constant(&self) -> Option<&BigInt> {
        match (&self.low, &self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    pub fn contains(&self, value: &BigInt) -> bool {
        let v = Bound::Finite(value.clone());
        self.low <= v && v <= self.high
    }

    /// Number of values in a finite range.
    pub fn cardinality(&self) -> Option<BigInt> {
        if self.is_empty() {
            return Some(BigInt::zero());
        }
        match (&self.low, &self.high) {
            (Bound::Finite(l), Bound::Finite(h)) => Some(h - l + 1),
            _ => None,
        }
    }

    /// All values of the range, if there are at most `limit` of them.
    pub fn values(&self, limit: u64) -> Option<Vec<BigInt>> {
        let count = self.cardinality()?.to_u64()?;
        if count > limit {
            return None;
        }
        let low = match &self.low {
            Bound::Finite(l) => l.clone(),
            _ => return Some(Vec::new()),
        };
        Some((0..count).map(|i| &low + i).collect())
    }

    pub fn subset_or_equal(&self, other: &Range) -> bool {
        self.is_empty() || (other.low <= self.low && self.high <= other.high)
    }

    pub fn join(&self, other: &Range) -> Range {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        Range {
            low: min(&self.low, &other.low).clone(),
            high: max(&self.high, &other.high).clone(),
        }
    }

    pub fn meet(&self, other: &Range) -> Range {
        Range::new(
            max(&self.low, &other.low).clone(),
            min(&self.high, &other.high).clone(),
        )
    }

    /// Standard interval widening: unstable bounds jump to infinity.
    pub fn widen(&self, other: &Range) -> Range {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let low = if other.low < self.low {
            Bound::NegInf
        } else {
            self.low.clone()
        };
        let high = if other.high > self.high {
            Bound::PosInf
        } else {
            self.high.clone()
        };
        Range { low, high }
    }

    pub fn add(&self, other: &Range) -> Range {
        if self.is_empty() || other.is_empty() {
            return Range::empty();
        }
        Range::new(self.low.add(&other.low), self.high.add(&other.high))
    }

    pub fn scale(&self, factor: &BigInt) -> Range {
        if self.is_empty() {
            return Range::empty();
        }
        let a = self.low.scale(factor);
        let b = self.high.scale(factor);
        if a <= b {
            Range::new(a, b)
        } else {
            Range::new(b, a)
        }
    }

    pub fn add_constant(&self, value: &BigInt) -> Range {
        self.add(&Range::constant(value.clone()))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "⊥")
        } else {
            write!(f, "[{}, {}]", self.low, self.high)
        }
    }
}
