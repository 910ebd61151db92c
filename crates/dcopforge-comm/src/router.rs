//! Per-queue routing table from peer ids to output pipes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use dcopforge_config::MessageTable;
use dcopforge_core::{AgentId, DcopError, Result};
use tracing::debug;

use crate::message::{AgentAddress, Message};
use crate::pipe::OutputPipe;
use crate::tcp::TcpPipe;

/// Routes outgoing messages to the pipe of their destination.
///
/// Pipes are either registered up front (in-process wiring) or opened
/// lazily from a directory of listen addresses (TCP). An optional fallback
/// pipe receives everything else.
pub struct Router {
    pipes: HashMap<AgentId, Box<dyn OutputPipe>>,
    directory: HashMap<AgentId, SocketAddr>,
    table: Option<Arc<MessageTable>>,
    fallback: Option<Box<dyn OutputPipe>>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            pipes: HashMap::new(),
            directory: HashMap::new(),
            table: None,
            fallback: None,
        }
    }

    pub fn add_pipe(&mut self, peer: AgentId, pipe: Box<dyn OutputPipe>) {
        self.pipes.insert(peer, pipe);
    }

    pub fn set_fallback(&mut self, pipe: Box<dyn OutputPipe>) {
        self.fallback = Some(pipe);
    }

    /// Sets the wire table used by lazily opened TCP pipes.
    pub fn set_table(&mut self, table: Arc<MessageTable>) {
        self.table = Some(table);
    }

    /// Records listen addresses of peers.
    pub fn extend_directory(&mut self, entries: &[AgentAddress]) {
        for entry in entries {
            self.directory.insert(entry.agent.clone(), entry.address);
        }
    }

    pub fn route(&mut self, msg: Message) -> Result<()> {
        if !self.pipes.contains_key(&msg.dest) {
            if let Some(&address) = self.directory.get(&msg.dest) {
                let table = self.table.clone().ok_or_else(|| {
                    DcopError::Configuration("no message table for tcp routes".to_string())
                })?;
                let pipe = TcpPipe::connect(msg.dest.clone(), address, table)?;
                self.pipes.insert(msg.dest.clone(), Box::new(pipe));
            }
        }
        match self.pipes.get(&msg.dest).or(self.fallback.as_ref()) {
            Some(pipe) => pipe.push(msg),
            None => Err(DcopError::transport(&msg.dest, "no route")),
        }
    }

    /// Closes and forgets the pipe to `peer`.
    pub fn remove(&mut self, peer: &AgentId) {
        if let Some(pipe) = self.pipes.remove(peer) {
            pipe.close();
        }
    }

    /// Closes every pipe.
    pub fn close_all(&mut self) {
        for (peer, pipe) in self.pipes.drain() {
            debug!(peer = %peer, "closing pipe");
            pipe.close();
        }
        if let Some(fallback) = self.fallback.take() {
            fallback.close();
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
