//! Utility algebra: combinable values with a total order and infeasible sentinels.

use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A utility (or cost) value.
///
/// Infeasible combinations are represented by the infinite sentinels rather
/// than by errors: adding anything to a sentinel yields the sentinel, so
/// infeasibility propagates through joins and projections.
///
/// # Examples
///
/// ```
/// use dcopforge_core::Utility;
///
/// let a = Utility::of(2.0);
/// let b = Utility::of(1.5);
///
/// assert_eq!(a + b, Utility::of(3.5));
/// assert_eq!(a + Utility::MINUS_INFINITY, Utility::MINUS_INFINITY);
/// assert!(a > b);
/// ```
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Utility(f64);

impl Utility {
    /// The neutral element of combination.
    pub const ZERO: Utility = Utility(0.0);

    /// Infeasible sentinel for minimization problems.
    pub const PLUS_INFINITY: Utility = Utility(f64::INFINITY);

    /// Infeasible sentinel for maximization problems.
    pub const MINUS_INFINITY: Utility = Utility(f64::NEG_INFINITY);

    /// Creates a utility from a raw value. NaN is mapped to zero.
    #[inline]
    pub fn of(value: f64) -> Self {
        if value.is_nan() || value == 0.0 {
            Utility::ZERO
        } else {
            Utility(value)
        }
    }

    /// Returns the raw value.
    #[inline]
    pub const fn value(&self) -> f64 {
        self.0
    }

    /// Returns true for either infinite sentinel.
    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.0.is_infinite()
    }

    /// Compares with a tolerance; sentinels are only equal to themselves.
    pub fn approx_eq(&self, other: Utility, tolerance: f64) -> bool {
        if self.is_infinite() || other.is_infinite() {
            return self.0 == other.0;
        }
        (self.0 - other.0).abs() <= tolerance.max(tolerance * self.0.abs())
    }
}

impl PartialEq for Utility {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Utility {}

impl Ord for Utility {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Utility {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Utility {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        // A sentinel absorbs any finite value. Opposite sentinels meet at
        // MINUS_INFINITY on either side.
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => self.min(other),
            (true, false) => self,
            (false, true) => other,
            (false, false) => Utility::of(self.0 + other.0),
        }
    }
}

impl Sum for Utility {
    fn sum<I: Iterator<Item = Utility>>(iter: I) -> Self {
        iter.fold(Utility::ZERO, Add::add)
    }
}

impl From<f64> for Utility {
    fn from(value: f64) -> Self {
        Utility::of(value)
    }
}

impl fmt::Debug for Utility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Utility({})", self)
    }
}

impl fmt::Display for Utility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == f64::INFINITY {
            write!(f, "+inf")
        } else if self.0 == f64::NEG_INFINITY {
            write!(f, "-inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Optimization direction of a problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimization {
    #[default]
    Maximize,
    Minimize,
}

impl Optimization {
    /// The sentinel marking an infeasible combination in this direction.
    pub const fn infeasible(self) -> Utility {
        match self {
            Optimization::Maximize => Utility::MINUS_INFINITY,
            Optimization::Minimize => Utility::PLUS_INFINITY,
        }
    }

    /// Returns true if `candidate` is strictly better than `incumbent`.
    pub fn is_better(self, candidate: Utility, incumbent: Utility) -> bool {
        match self {
            Optimization::Maximize => candidate > incumbent,
            Optimization::Minimize => candidate < incumbent,
        }
    }

    /// Returns true unless `utility` is this direction's infeasible sentinel.
    pub fn is_feasible(self, utility: Utility) -> bool {
        utility != self.infeasible()
    }

    /// Returns the better of two utilities, preferring `a` on ties.
    pub fn best(self, a: Utility, b: Utility) -> Utility {
        if self.is_better(b, a) {
            b
        } else {
            a
        }
    }
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Optimization::Maximize => write!(f, "maximize"),
            Optimization::Minimize => write!(f, "minimize"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_absorbs() {
        let u = Utility::of(4.0);
        assert_eq!(u + Utility::MINUS_INFINITY, Utility::MINUS_INFINITY);
        assert_eq!(Utility::PLUS_INFINITY + u, Utility::PLUS_INFINITY);
    }

    #[test]
    fn test_opposite_sentinels_add_symmetrically() {
        let ab = Utility::PLUS_INFINITY + Utility::MINUS_INFINITY;
        let ba = Utility::MINUS_INFINITY + Utility::PLUS_INFINITY;
        assert_eq!(ab, ba);
        assert_eq!(ab, Utility::MINUS_INFINITY);
    }

    #[test]
    fn test_ordering_is_total() {
        let mut values = vec![
            Utility::of(1.0),
            Utility::MINUS_INFINITY,
            Utility::of(-3.0),
            Utility::PLUS_INFINITY,
        ];
        values.sort();
        assert_eq!(values[0], Utility::MINUS_INFINITY);
        assert_eq!(values[3], Utility::PLUS_INFINITY);
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert_eq!(Utility::of(-0.0), Utility::ZERO);
    }

    #[test]
    fn test_optimization_direction() {
        let max = Optimization::Maximize;
        let min = Optimization::Minimize;
        assert!(max.is_better(Utility::of(2.0), Utility::of(1.0)));
        assert!(min.is_better(Utility::of(1.0), Utility::of(2.0)));
        assert!(!max.is_feasible(Utility::MINUS_INFINITY));
        assert!(min.is_feasible(Utility::MINUS_INFINITY));
        assert_eq!(max.best(Utility::of(1.0), Utility::of(1.0)), Utility::of(1.0));
    }

    #[test]
    fn test_approx_eq() {
        assert!(Utility::of(0.1 + 0.2).approx_eq(Utility::of(0.3), 1e-9));
        assert!(!Utility::of(1.0).approx_eq(Utility::PLUS_INFINITY, 1e-9));
        assert!(Utility::PLUS_INFINITY.approx_eq(Utility::PLUS_INFINITY, 1e-9));
    }
}
