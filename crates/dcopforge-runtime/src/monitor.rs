//! Controller-side tracking of agent states and readiness.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dcopforge_comm::{AgentAddress, AgentState, Message, MessageListener, Outbox, Payload};
use dcopforge_core::{AgentId, MessageKind, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::event::RunEvent;

#[derive(Debug, Default)]
struct MonitorState {
    states: BTreeMap<AgentId, AgentState>,
    addresses: Vec<AgentAddress>,
    ready_messages: usize,
}

/// Listens to `AGENT_STATUS`, `AGENT_REPORT` and `AGENTS_READY`.
pub struct RunMonitor {
    state: Arc<Mutex<MonitorState>>,
    events: Option<UnboundedSender<RunEvent>>,
}

/// Read access to a [`RunMonitor`].
#[derive(Clone)]
pub struct MonitorHandle {
    state: Arc<Mutex<MonitorState>>,
}

fn lock(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunMonitor {
    /// Tracks `agents`, all starting out `Configured`.
    pub fn new(agents: &[AgentId], events: Option<UnboundedSender<RunEvent>>) -> (RunMonitor, MonitorHandle) {
        let state = MonitorState {
            states: agents
                .iter()
                .map(|agent| (agent.clone(), AgentState::Configured))
                .collect(),
            ..MonitorState::default()
        };
        let state = Arc::new(Mutex::new(state));
        (
            RunMonitor {
                state: Arc::clone(&state),
                events,
            },
            MonitorHandle { state },
        )
    }

    fn update(&self, agent: &AgentId, next: AgentState) {
        let mut state = lock(&self.state);
        let Some(current) = state.states.get_mut(agent) else {
            warn!(agent = %agent, "state of an unknown agent");
            return;
        };
        if *current == next {
            return;
        }
        debug!(agent = %agent, from = ?current, to = ?next, "agent state changed");
        *current = next;
        drop(state);
        if let Some(events) = &self.events {
            let _ = events.send(RunEvent::AgentStateChanged {
                agent: agent.clone(),
                state: next,
            });
        }
    }
}

impl MonitorHandle {
    /// Number of `AGENTS_READY` messages received.
    pub fn ready_messages(&self) -> usize {
        lock(&self.state).ready_messages
    }

    /// Listen addresses announced by TCP agents.
    pub fn addresses(&self) -> Vec<AgentAddress> {
        lock(&self.state).addresses.clone()
    }

    pub fn state_of(&self, agent: &AgentId) -> Option<AgentState> {
        lock(&self.state).states.get(agent).copied()
    }

    pub fn states(&self) -> BTreeMap<AgentId, AgentState> {
        lock(&self.state).states.clone()
    }

    /// Every agent is finished, cleared or aborted.
    pub fn all_terminal(&self) -> bool {
        lock(&self.state).states.values().all(|s| s.is_terminal())
    }

    pub fn any_aborted(&self) -> bool {
        lock(&self.state)
            .states
            .values()
            .any(|s| *s == AgentState::Aborted)
    }
}

impl MessageListener for RunMonitor {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![
            MessageKind::AgentStatus,
            MessageKind::AgentReport,
            MessageKind::AgentsReady,
        ]
    }

    fn on_message(&mut self, msg: &Message, _outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::AgentStatus(status) => self.update(&status.agent, status.state),
            Payload::AgentReport(report) => self.update(&report.agent, report.state),
            Payload::AgentsReady(addresses) => {
                let mut state = lock(&self.state);
                state.ready_messages += 1;
                state.addresses.extend(addresses.iter().cloned());
                debug!(from = %msg.sender, agents = addresses.len(), "agents ready");
            }
            _ => return Err(msg.unexpected(MessageKind::AgentStatus)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcopforge_comm::{AgentStatus, Queue, QueueOptions};
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_state_changes_are_streamed() {
        let agents = [AgentId::new("a1"), AgentId::new("a2")];
        let (tx, mut rx) = unbounded_channel();
        let (monitor, handle) = RunMonitor::new(&agents, Some(tx));
        let mut queue = Queue::new(AgentId::controller(), QueueOptions::default());
        queue.register_listener(Box::new(monitor));

        for agent in &agents {
            let status = AgentStatus {
                agent: agent.clone(),
                state: AgentState::Running,
            };
            queue.dispatch(Message::new(Payload::AgentStatus(status))).unwrap();
        }
        assert!(!handle.all_terminal());
        assert_eq!(
            rx.try_recv().unwrap(),
            RunEvent::AgentStateChanged {
                agent: AgentId::new("a1"),
                state: AgentState::Running,
            }
        );

        let status = AgentStatus {
            agent: AgentId::new("a1"),
            state: AgentState::Aborted,
        };
        queue.dispatch(Message::new(Payload::AgentStatus(status))).unwrap();
        assert!(handle.any_aborted());
        assert_eq!(handle.state_of(&AgentId::new("a2")), Some(AgentState::Running));
    }

    #[test]
    fn test_ready_messages_collect_addresses() {
        let (monitor, handle) = RunMonitor::new(&[AgentId::new("a1")], None);
        let mut queue = Queue::new(AgentId::controller(), QueueOptions::default());
        queue.register_listener(Box::new(monitor));
        let address = AgentAddress {
            agent: AgentId::new("a1"),
            address: "127.0.0.1:4000".parse().unwrap(),
        };
        queue
            .dispatch(Message::new(Payload::AgentsReady(vec![address.clone()])))
            .unwrap();
        assert_eq!(handle.ready_messages(), 1);
        assert_eq!(handle.addresses(), vec![address]);
    }
}
