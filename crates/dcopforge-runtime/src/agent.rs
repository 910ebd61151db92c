//! Agent threads.

use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use dcopforge_comm::{AgentState, Message, Payload, Queue};
use dcopforge_core::{AgentId, DcopError, Result};
use tracing::{debug, error};

use crate::lifecycle::agent_report;

/// An agent: a queue with its protocol modules registered.
pub struct Agent {
    queue: Queue,
}

impl Agent {
    pub fn new(queue: Queue) -> Self {
        Agent { queue }
    }

    pub fn id(&self) -> &AgentId {
        self.queue.id()
    }

    /// Sender feeding the agent's mailbox.
    pub fn inbox(&self) -> Sender<Message> {
        self.queue.inbox()
    }

    pub fn queue_mut(&mut self) -> &mut Queue {
        &mut self.queue
    }

    pub fn into_queue(self) -> Queue {
        self.queue
    }

    /// Runs the agent's drain loop on its own thread.
    pub fn spawn(self) -> Result<AgentHandle> {
        let id = self.queue.id().clone();
        let inbox = self.queue.inbox();
        let mut queue = self.queue;
        let thread = thread::Builder::new()
            .name(format!("agent-{id}"))
            .spawn(move || drain(&mut queue))?;
        Ok(AgentHandle {
            id,
            inbox,
            thread: Some(thread),
        })
    }
}

fn drain(queue: &mut Queue) {
    if let Err(e) = queue.run() {
        abort(queue, &e);
    }
    queue.close();
    debug!(agent = %queue.id(), "agent thread done");
}

/// Halts a failed agent and reports it as aborted.
pub fn abort(queue: &mut Queue, cause: &DcopError) {
    error!(agent = %queue.id(), error = %cause, "agent aborted");
    queue.halt();
    let outbox = queue.outbox_mut();
    let report = agent_report(outbox, AgentState::Aborted, Some(cause.to_string()));
    if let Err(e) = outbox.send_to_controller(Message::new(Payload::AgentReport(Box::new(report)))) {
        error!(agent = %queue.id(), error = %e, "could not report abort");
    }
}

/// Handle to a running agent thread.
pub struct AgentHandle {
    id: AgentId,
    inbox: Sender<Message>,
    thread: Option<JoinHandle<()>>,
}

impl AgentHandle {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Delivers `msg` straight into the agent's mailbox.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.inbox
            .send(msg)
            .map_err(|_| DcopError::transport(&self.id, "agent mailbox closed"))
    }

    /// Asks the agent to stop. Harmless if it already stopped.
    pub fn stop(&self) {
        let _ = self.inbox.send(Message::stop());
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the agent thread to exit.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(agent = %self.id, "agent thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcopforge_comm::QueueOptions;

    #[test]
    fn test_agent_thread_exits_on_stop() {
        let queue = Queue::new(AgentId::new("a1"), QueueOptions::default());
        let mut handle = Agent::new(queue).spawn().unwrap();
        assert_eq!(handle.id(), &AgentId::new("a1"));
        handle.stop();
        handle.join();
        assert!(handle.is_finished());
    }
}
