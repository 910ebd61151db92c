//! Message counters kept by each agent.

use std::collections::BTreeMap;

use dcopforge_core::{AgentId, MessageKind};
use serde::{Deserialize, Serialize};

/// Count and total size of a set of messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    pub count: u64,
    pub size: u64,
}

impl Traffic {
    fn record(&mut self, size: u64) {
        self.count += 1;
        self.size += size;
    }

    fn merge(&mut self, other: &Traffic) {
        self.count += other.count;
        self.size += other.size;
    }
}

/// Per-kind traffic plus the largest single message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub traffic: Traffic,
    pub max_size: u64,
}

/// Messages sent and received by one agent, or aggregated over a run.
///
/// Messages an agent sends to itself and messages exchanged with the
/// controller or daemons are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    pub by_kind: BTreeMap<MessageKind, KindStats>,
    pub sent_to: BTreeMap<AgentId, Traffic>,
    pub received: Traffic,
}

impl MessageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, kind: MessageKind, dest: &AgentId, size: u64) {
        let entry = self.by_kind.entry(kind).or_default();
        entry.traffic.record(size);
        entry.max_size = entry.max_size.max(size);
        self.sent_to.entry(dest.clone()).or_default().record(size);
    }

    pub fn record_received(&mut self, size: u64) {
        self.received.record(size);
    }

    /// Total messages sent.
    pub fn sent_count(&self) -> u64 {
        self.by_kind.values().map(|k| k.traffic.count).sum()
    }

    /// Total bytes sent.
    pub fn sent_size(&self) -> u64 {
        self.by_kind.values().map(|k| k.traffic.size).sum()
    }

    /// Largest message sent.
    pub fn max_size(&self) -> u64 {
        self.by_kind.values().map(|k| k.max_size).max().unwrap_or(0)
    }

    pub fn kind(&self, kind: MessageKind) -> KindStats {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    /// Adds `other` into these counters.
    pub fn merge(&mut self, other: &MessageStats) {
        for (kind, stats) in &other.by_kind {
            let entry = self.by_kind.entry(*kind).or_default();
            entry.traffic.merge(&stats.traffic);
            entry.max_size = entry.max_size.max(stats.max_size);
        }
        for (dest, traffic) in &other.sent_to {
            self.sent_to.entry(dest.clone()).or_default().merge(traffic);
        }
        self.received.merge(&other.received);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_totals() {
        let mut stats = MessageStats::new();
        let b = AgentId::new("b");
        stats.record_sent(MessageKind::Util, &b, 40);
        stats.record_sent(MessageKind::Util, &b, 10);
        stats.record_sent(MessageKind::Value, &AgentId::new("c"), 7);
        stats.record_received(3);

        assert_eq!(stats.sent_count(), 3);
        assert_eq!(stats.sent_size(), 57);
        assert_eq!(stats.max_size(), 40);
        assert_eq!(stats.kind(MessageKind::Util).traffic.count, 2);
        assert_eq!(stats.sent_to[&b], Traffic { count: 2, size: 50 });
        assert_eq!(stats.received.count, 1);
    }

    #[test]
    fn test_merge_sums_without_loss() {
        let mut a = MessageStats::new();
        a.record_sent(MessageKind::Util, &AgentId::new("x"), 5);
        let mut b = MessageStats::new();
        b.record_sent(MessageKind::Util, &AgentId::new("x"), 9);
        b.record_sent(MessageKind::DfsChild, &AgentId::new("y"), 2);

        let mut total = MessageStats::new();
        total.merge(&a);
        total.merge(&b);
        assert_eq!(total.sent_count(), a.sent_count() + b.sent_count());
        assert_eq!(total.sent_size(), a.sent_size() + b.sent_size());
        assert_eq!(total.kind(MessageKind::Util).max_size, 9);
        assert_eq!(total.sent_to[&AgentId::new("x")].count, 2);
    }
}
