//! Identifier generation scoped to one run or session.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hands out increasing identifiers. Owned by a run context and passed to
/// whoever needs fresh ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts numbering at `first`.
    pub fn starting_at(first: u64) -> Self {
        IdGenerator {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_run_id(&self) -> RunId {
        RunId(self.next_id())
    }
}

/// Identifier of one solving run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_are_independent() {
        let a = IdGenerator::new();
        let b = IdGenerator::starting_at(10);
        assert_eq!(a.next_id(), 0);
        assert_eq!(a.next_id(), 1);
        assert_eq!(b.next_run_id(), RunId(10));
        assert_eq!(a.next_run_id().to_string(), "run-2");
    }
}
