//! Agent lifecycle: `Configured -> Running -> Finished -> Cleared`.
//!
//! [`AgentLifecycle`] is the first listener of every agent. It reports state
//! changes to the controller and sends the agent's measurements when the
//! agent finishes, or when it is stopped before finishing.

use dcopforge_comm::{AgentReport, AgentState, AgentStatus, Message, MessageListener, Outbox, Payload};
use dcopforge_core::{AgentId, DcopError, MessageKind, Result};
use tracing::debug;

/// Builds a report of the agent behind `outbox`.
pub fn agent_report(outbox: &mut Outbox, state: AgentState, error: Option<String>) -> AgentReport {
    AgentReport {
        agent: outbox.id().clone(),
        state,
        stats: outbox.stats().cloned().unwrap_or_default(),
        checks: outbox.checks(),
        clock: outbox.now(),
        error,
    }
}

/// Tracks the state of one agent.
pub struct AgentLifecycle {
    agent: AgentId,
    state: AgentState,
}

impl AgentLifecycle {
    pub fn new(agent: AgentId) -> Self {
        AgentLifecycle {
            agent,
            state: AgentState::Configured,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    fn transition(&mut self, next: AgentState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(DcopError::ProtocolViolation(format!(
                "agent {} cannot go from {:?} to {next:?}",
                self.agent, self.state
            )));
        }
        debug!(agent = %self.agent, from = ?self.state, to = ?next, "agent state");
        self.state = next;
        Ok(())
    }

    fn report(&self, outbox: &mut Outbox) -> Result<()> {
        let report = agent_report(outbox, self.state, None);
        outbox.send_to_controller(Message::new(Payload::AgentReport(Box::new(report))))
    }
}

impl MessageListener for AgentLifecycle {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::Start, MessageKind::AgentFinished, MessageKind::Stop]
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::Start => {
                self.transition(AgentState::Running)?;
                let status = AgentStatus {
                    agent: self.agent.clone(),
                    state: self.state,
                };
                outbox.send_to_controller(Message::new(Payload::AgentStatus(status)))
            }
            Payload::AgentFinished => {
                self.transition(AgentState::Finished)?;
                self.report(outbox)
            }
            Payload::Stop => {
                let finished = self.state == AgentState::Finished;
                self.transition(AgentState::Cleared)?;
                if finished {
                    Ok(())
                } else {
                    // Partial measurements of an interrupted agent.
                    self.report(outbox)
                }
            }
            _ => Err(msg.unexpected(MessageKind::Start)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use dcopforge_comm::{ChannelPipe, Queue, QueueOptions};
    use std::time::Duration;

    fn agent_queue() -> (Queue, crossbeam::channel::Receiver<Message>) {
        let mut queue = Queue::new(
            AgentId::new("a1"),
            QueueOptions {
                measure_messages: true,
                ..QueueOptions::default()
            },
        );
        let (tx, rx) = unbounded();
        queue.add_output_pipe(
            AgentId::controller(),
            Box::new(ChannelPipe::new(AgentId::controller(), tx)),
        );
        queue.register_listener(Box::new(AgentLifecycle::new(AgentId::new("a1"))));
        (queue, rx)
    }

    #[test]
    fn test_finished_agent_reports_once() {
        let (mut queue, controller) = agent_queue();
        queue.dispatch(Message::start()).unwrap();
        queue.dispatch(Message::new(Payload::AgentFinished)).unwrap();
        queue.dispatch(Message::stop()).unwrap();

        let kinds: Vec<MessageKind> = controller.try_iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::AgentStatus, MessageKind::AgentReport]);
        assert!(queue.is_stopped());
    }

    #[test]
    fn test_stopped_agent_sends_partial_report() {
        let (mut queue, controller) = agent_queue();
        queue.dispatch(Message::start()).unwrap();
        queue.dispatch(Message::stop()).unwrap();

        let report = controller
            .recv_timeout(Duration::from_secs(1))
            .and_then(|_| controller.recv_timeout(Duration::from_secs(1)))
            .unwrap();
        match report.payload {
            Payload::AgentReport(report) => assert_eq!(report.state, AgentState::Cleared),
            other => panic!("expected a report, got {other:?}"),
        }
    }

    #[test]
    fn test_finishing_before_start_is_a_protocol_violation() {
        let mut lifecycle = AgentLifecycle::new(AgentId::new("a1"));
        let mut queue = Queue::new(AgentId::new("a1"), QueueOptions::default());
        let err = lifecycle
            .on_message(&Message::new(Payload::AgentFinished), queue.outbox_mut())
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(lifecycle.state(), AgentState::Configured);
    }
}
