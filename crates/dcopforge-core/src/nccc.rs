//! Constraint-check accounting.

use serde::{Deserialize, Serialize};

/// Counts constraint checks performed by one agent.
///
/// `performed` is the local total. `nccc` is the non-concurrent constraint
/// check count: it grows with local work and is raised to the maximum of
/// the counts carried by incoming messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintChecks {
    performed: u64,
    nccc: u64,
}

impl ConstraintChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `count` local checks.
    #[inline]
    pub fn add(&mut self, count: u64) {
        self.performed += count;
        self.nccc += count;
    }

    /// Merges the count carried by an incoming message.
    #[inline]
    pub fn observe(&mut self, remote_nccc: u64) {
        self.nccc = self.nccc.max(remote_nccc);
    }

    pub fn performed(&self) -> u64 {
        self.performed
    }

    pub fn nccc(&self) -> u64 {
        self.nccc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_takes_max() {
        let mut checks = ConstraintChecks::new();
        checks.add(5);
        checks.observe(3);
        assert_eq!(checks.nccc(), 5);
        checks.observe(12);
        assert_eq!(checks.nccc(), 12);
        checks.add(1);
        assert_eq!(checks.nccc(), 13);
        assert_eq!(checks.performed(), 6);
    }
}
