//! Run statistics collection.
//!
//! [`StatsCollector`] sits on the controller's queue. It never sends
//! anything: it keeps the latest report of every agent and assembles the
//! pseudotree from the nodes the agents announce. A [`StatsHandle`] reads
//! the collected data from outside the queue, including after a timeout,
//! when only part of the reports arrived.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dcopforge_comm::{AgentReport, AgentState, Message, MessageListener, MessageStats, Outbox, Payload};
use dcopforge_core::{AgentId, MessageKind, Pseudotree, Result};
use tracing::{debug, warn};

/// Aggregated measurements of one run.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    /// Wall-clock time from START to the end of the run.
    pub wall_time: Duration,
    /// Latest simulated clock over all agents, if simulated time was on.
    pub simulated_time: Option<u64>,
    /// Non-concurrent constraint checks: the maximum over all agents.
    pub ncccs: u64,
    /// Constraint checks summed over all agents.
    pub constraint_checks: u64,
    /// Message counters merged over all agents.
    pub messages: MessageStats,
    /// The last report received from each agent.
    pub per_agent: BTreeMap<AgentId, AgentReport>,
    /// The pseudotree, as far as it was announced.
    pub pseudotree: Pseudotree,
    /// Largest separator in the pseudotree.
    pub tree_width: Option<usize>,
}

impl RunStatistics {
    /// Builds the aggregate from per-agent reports.
    pub fn from_reports(
        reports: BTreeMap<AgentId, AgentReport>,
        pseudotree: Pseudotree,
        wall_time: Duration,
    ) -> Self {
        let mut messages = MessageStats::new();
        let mut ncccs = 0;
        let mut constraint_checks = 0;
        let mut simulated_time: Option<u64> = None;
        for report in reports.values() {
            messages.merge(&report.stats);
            ncccs = ncccs.max(report.checks.nccc());
            constraint_checks += report.checks.performed();
            if let Some(clock) = report.clock {
                simulated_time = Some(simulated_time.map_or(clock, |t| t.max(clock)));
            }
        }
        let tree_width = pseudotree.width();
        RunStatistics {
            wall_time,
            simulated_time,
            ncccs,
            constraint_checks,
            messages,
            per_agent: reports,
            pseudotree,
            tree_width,
        }
    }

    /// Total number of messages sent between agents.
    pub fn message_count(&self) -> u64 {
        self.messages.sent_count()
    }

    /// Total size in bytes of messages sent between agents.
    pub fn message_size(&self) -> u64 {
        self.messages.sent_size()
    }

    pub fn max_message_size(&self) -> u64 {
        self.messages.max_size()
    }

    /// Number of agents that reported.
    pub fn agent_count(&self) -> usize {
        self.per_agent.len()
    }

    /// Final state of every reporting agent.
    pub fn agent_states(&self) -> BTreeMap<AgentId, AgentState> {
        self.per_agent
            .iter()
            .map(|(agent, report)| (agent.clone(), report.state))
            .collect()
    }

    /// Returns true if some agent aborted.
    pub fn has_aborted_agents(&self) -> bool {
        self.per_agent.values().any(|r| r.state == AgentState::Aborted)
    }
}

#[derive(Debug, Default)]
struct StatsState {
    reports: BTreeMap<AgentId, AgentReport>,
    pseudotree: Pseudotree,
}

/// Controller-side listener gathering agent reports and pseudotree nodes.
pub struct StatsCollector {
    state: Arc<Mutex<StatsState>>,
}

/// Read access to a [`StatsCollector`]'s data.
#[derive(Clone)]
pub struct StatsHandle {
    state: Arc<Mutex<StatsState>>,
}

impl StatsCollector {
    pub fn new() -> (StatsCollector, StatsHandle) {
        let state = Arc::new(Mutex::new(StatsState::default()));
        (
            StatsCollector {
                state: Arc::clone(&state),
            },
            StatsHandle { state },
        )
    }
}

fn lock(state: &Mutex<StatsState>) -> MutexGuard<'_, StatsState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatsHandle {
    /// Number of agents that reported so far.
    pub fn report_count(&self) -> usize {
        lock(&self.state).reports.len()
    }

    pub fn report(&self, agent: &AgentId) -> Option<AgentReport> {
        lock(&self.state).reports.get(agent).cloned()
    }

    pub fn pseudotree(&self) -> Pseudotree {
        lock(&self.state).pseudotree.clone()
    }

    /// Snapshot of everything collected so far.
    pub fn statistics(&self, wall_time: Duration) -> RunStatistics {
        let state = lock(&self.state);
        RunStatistics::from_reports(state.reports.clone(), state.pseudotree.clone(), wall_time)
    }
}

impl MessageListener for StatsCollector {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::AgentReport, MessageKind::DfsOutput]
    }

    fn on_message(&mut self, msg: &Message, _outbox: &mut Outbox) -> Result<()> {
        let mut state = lock(&self.state);
        match &msg.payload {
            Payload::AgentReport(report) => {
                debug!(
                    agent = %report.agent,
                    state = ?report.state,
                    sent = report.stats.sent_count(),
                    "agent report"
                );
                if let Some(error) = &report.error {
                    warn!(agent = %report.agent, error = %error, "agent reported an error");
                }
                // Counters are cumulative, so a later report supersedes.
                state.reports.insert(report.agent.clone(), (**report).clone());
            }
            Payload::DfsOutput(node) => {
                if state.pseudotree.insert((**node).clone()).is_some() {
                    warn!(variable = %node.variable, "pseudotree node announced twice");
                }
            }
            _ => return Err(msg.unexpected(MessageKind::AgentReport)),
        }
        Ok(())
    }
}
