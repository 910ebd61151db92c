//! Hosts: the controller's and daemons' own queues.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use dcopforge_comm::{MessageListener, Queue, QueueOptions, TcpInbox};
use dcopforge_config::MessageTable;
use dcopforge_core::{AgentId, Result};
use tracing::{error, info};

/// How long a serving host blocks on its mailbox before rechecking state.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a [`RuntimeHost`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRole {
    /// Holds the problem, drives runs and collects results.
    Controller,
    /// Builds agents on request of a remote controller.
    Daemon,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::Controller => write!(f, "controller"),
            HostRole::Daemon => write!(f, "daemon"),
        }
    }
}

/// A queue that is not an agent, optionally reachable over TCP.
pub struct RuntimeHost {
    role: HostRole,
    queue: Queue,
    inbox: Option<TcpInbox>,
}

impl RuntimeHost {
    pub fn new(role: HostRole, id: AgentId, options: QueueOptions) -> Self {
        RuntimeHost {
            role,
            queue: Queue::new(id, options),
            inbox: None,
        }
    }

    pub fn role(&self) -> HostRole {
        self.role
    }

    pub fn id(&self) -> &AgentId {
        self.queue.id()
    }

    pub fn queue_mut(&mut self) -> &mut Queue {
        &mut self.queue
    }

    /// Gives up the host, keeping only its queue. Any TCP inbox is closed.
    pub fn into_queue(mut self) -> Queue {
        if let Some(mut inbox) = self.inbox.take() {
            inbox.shutdown();
        }
        self.queue
    }

    pub fn register(&mut self, listener: Box<dyn MessageListener>) {
        self.queue.register_listener(listener);
    }

    /// Accepts TCP connections on `address`, feeding this host's mailbox.
    pub fn listen(&mut self, address: impl ToSocketAddrs, table: Arc<MessageTable>) -> Result<SocketAddr> {
        let inbox = TcpInbox::bind(address, self.queue.id().clone(), self.queue.inbox(), table)?;
        let local = inbox.local_addr();
        self.inbox = Some(inbox);
        Ok(local)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inbox.as_ref().map(TcpInbox::local_addr)
    }

    /// Dispatches messages until STOP.
    ///
    /// A daemon logs failed requests and keeps serving; a controller
    /// returns the first error.
    pub fn serve(&mut self) -> Result<()> {
        info!(event = "host_serving", role = %self.role, address = ?self.local_addr());
        while !self.queue.is_stopped() {
            if let Err(e) = self.queue.process_next(POLL_INTERVAL) {
                match self.role {
                    HostRole::Daemon => error!(role = %self.role, error = %e, "request failed"),
                    HostRole::Controller => return Err(e),
                }
            }
        }
        info!(event = "host_stopped", role = %self.role);
        Ok(())
    }

    /// Closes the TCP inbox and every outgoing pipe.
    pub fn shutdown(&mut self) {
        if let Some(mut inbox) = self.inbox.take() {
            inbox.shutdown();
        }
        self.queue.close();
    }
}
