//! Simulated time.

use std::collections::HashMap;

use dcopforge_config::MessageCosts;
use dcopforge_core::{AgentId, MessageKind};

/// A logical clock advanced by declared message and constraint-check costs.
///
/// A message leaves at the sender's current time and arrives `cost_of(kind)`
/// later; the receiver's clock jumps to the arrival time if it is behind.
/// Arrivals toward one destination never go backwards, so a cheap message
/// cannot overtake an expensive one sent before it.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: u64,
    charged_checks: u64,
    costs: MessageCosts,
    last_arrival: HashMap<AgentId, u64>,
}

impl SimulatedClock {
    pub fn new(costs: MessageCosts) -> Self {
        SimulatedClock {
            now: 0,
            charged_checks: 0,
            costs,
            last_arrival: HashMap::new(),
        }
    }

    /// Current time after charging checks performed so far.
    pub fn now(&mut self, performed_checks: u64) -> u64 {
        self.charge(performed_checks);
        self.now
    }

    /// Arrival time at `dest` of a message of `kind` sent now.
    pub fn arrival(&mut self, dest: &AgentId, kind: MessageKind, performed_checks: u64) -> u64 {
        let arrival = self.now(performed_checks) + self.costs.cost_of(kind);
        let last = self.last_arrival.entry(dest.clone()).or_insert(0);
        *last = (*last).max(arrival);
        *last
    }

    /// Advances to the arrival time of a received message.
    pub fn observe(&mut self, timestamp: u64, performed_checks: u64) {
        self.charge(performed_checks);
        self.now = self.now.max(timestamp);
    }

    fn charge(&mut self, performed_checks: u64) {
        let pending = performed_checks.saturating_sub(self.charged_checks);
        self.now += pending * self.costs.check_cost;
        self.charged_checks = self.charged_checks.max(performed_checks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_accumulate() {
        let mut costs = MessageCosts {
            default_cost: 2,
            check_cost: 1,
            ..MessageCosts::default()
        };
        costs.per_kind.insert(MessageKind::Util.logical_name(), 10);
        let mut clock = SimulatedClock::new(costs);

        let peer = AgentId::new("b");
        assert_eq!(clock.arrival(&peer, MessageKind::Value, 0), 2);
        assert_eq!(clock.arrival(&peer, MessageKind::Util, 3), 13);
        clock.observe(20, 3);
        assert_eq!(clock.now(3), 20);
        clock.observe(5, 4);
        assert_eq!(clock.now(4), 21);
    }

    #[test]
    fn test_arrivals_per_destination_do_not_go_backwards() {
        let mut costs = MessageCosts {
            default_cost: 1,
            ..MessageCosts::default()
        };
        costs.per_kind.insert(MessageKind::Assignments.logical_name(), 10);
        let mut clock = SimulatedClock::new(costs);
        let (b, c) = (AgentId::new("b"), AgentId::new("c"));

        assert_eq!(clock.arrival(&b, MessageKind::Assignments, 0), 10);
        assert_eq!(clock.arrival(&b, MessageKind::OptimalUtility, 0), 10);
        // Other destinations are not held back.
        assert_eq!(clock.arrival(&c, MessageKind::OptimalUtility, 0), 1);
    }
}
