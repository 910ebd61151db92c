//! Daemons: per-host servers that build agents for a remote controller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Sender;
use dcopforge_comm::{Message, QueueOptions};
use dcopforge_config::MessageTable;
use dcopforge_core::{AgentId, DcopError, Result};
use tracing::{error, info};

use crate::constructor::Constructor;
use crate::host::{HostRole, RuntimeHost};

/// A bound daemon, ready to serve.
///
/// Agents are bound on the daemon's own IP, so bind a concrete address
/// rather than a wildcard when controllers run on other hosts.
pub struct Daemon {
    host: RuntimeHost,
    address: SocketAddr,
}

impl Daemon {
    /// Listens on `address`, e.g. `"10.0.0.2:9000"` or `"127.0.0.1:0"`.
    pub fn bind(address: &str) -> Result<Self> {
        let mut host = RuntimeHost::new(HostRole::Daemon, AgentId::daemon(address), QueueOptions::default());
        // Orchestration kinds keep their default tags whatever the agent config says.
        let address = host.listen(address, Arc::new(MessageTable::default()))?;
        host.register(Box::new(Constructor::tcp(address.ip(), None, None)));
        info!(event = "daemon_bound", address = %address);
        Ok(Daemon { host, address })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Serves controllers until STOP.
    pub fn serve(mut self) -> Result<()> {
        let result = self.host.serve();
        self.host.shutdown();
        result
    }

    /// Serves on a background thread.
    pub fn spawn(mut self) -> Result<DaemonHandle> {
        let address = self.address;
        let inbox = self.host.queue_mut().inbox();
        let thread = thread::Builder::new()
            .name(format!("daemon-{address}"))
            .spawn(move || {
                if let Err(e) = self.serve() {
                    error!(address = %address, error = %e, "daemon failed");
                }
            })?;
        Ok(DaemonHandle {
            address,
            inbox,
            thread: Some(thread),
        })
    }
}

/// Handle to a daemon serving on a background thread.
pub struct DaemonHandle {
    address: SocketAddr,
    inbox: Sender<Message>,
    thread: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops the daemon and waits for it, clearing any agents it still runs.
    pub fn shutdown(&mut self) -> Result<()> {
        let _ = self.inbox.send(Message::stop());
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DcopError::InvalidState(format!("daemon {} panicked", self.address))),
            None => Ok(()),
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "daemon shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_binds_an_ephemeral_port_and_stops() {
        let daemon = Daemon::bind("127.0.0.1:0").unwrap();
        let address = daemon.local_addr();
        assert_ne!(address.port(), 0);
        let mut handle = daemon.spawn().unwrap();
        assert_eq!(handle.address(), address);
        handle.shutdown().unwrap();
        // A second shutdown is a no-op.
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_bind_fails_on_bad_address() {
        assert!(Daemon::bind("not an address").is_err());
    }
}
