//! Per-agent mailbox and sequential listener dispatch.
//!
//! A [`Queue`] drains its mailbox one message at a time and hands each
//! message to the listeners registered for its kind, so the protocol
//! modules of one agent never run concurrently. Listeners reply through the
//! [`Outbox`], which stamps, measures and routes outgoing messages.
//!
//! # Logging
//!
//! - **TRACE**: every dispatched and sent message
//! - **WARN**: dropped messages (no listener, protocol violation)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dcopforge_config::{MessageCosts, MessageTable};
use dcopforge_core::{AgentId, ConstraintChecks, MessageKind, Result};
use tracing::{trace, warn};

use crate::clock::SimulatedClock;
use crate::codec;
use crate::message::{Message, Payload};
use crate::pipe::{ChannelPipe, OutputPipe};
use crate::router::Router;
use crate::stats::MessageStats;

/// A protocol module plugged into a queue.
pub trait MessageListener: Send {
    /// Kinds this listener wants to receive.
    fn message_kinds(&self) -> Vec<MessageKind>;

    /// Handles one message.
    ///
    /// Returning [`ProtocolViolation`](dcopforge_core::DcopError::ProtocolViolation)
    /// drops the message with a warning; any other error aborts the agent.
    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()>;
}

/// Queue construction options.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Count outgoing and incoming messages.
    pub measure_messages: bool,
    /// Run a simulated clock with these costs.
    pub simulated_costs: Option<MessageCosts>,
    /// Wire table for TCP routes.
    pub table: Option<Arc<MessageTable>>,
}

/// The sending side of a queue, handed to listeners.
pub struct Outbox {
    id: AgentId,
    self_pipe: Box<dyn OutputPipe>,
    router: Router,
    stats: Option<MessageStats>,
    checks: ConstraintChecks,
    clock: Option<SimulatedClock>,
}

impl Outbox {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Sends `msg` to `dest`. Non-blocking; delivery is FIFO per destination.
    pub fn send(&mut self, dest: &AgentId, mut msg: Message) -> Result<()> {
        if dest == &self.id {
            return self.send_to_self(msg);
        }
        msg.sender = self.id.clone();
        msg.dest = dest.clone();
        msg.nccc = self.checks.nccc();
        msg.timestamp = match self.clock.as_mut() {
            Some(clock) => Some(clock.arrival(dest, msg.kind, self.checks.performed())),
            None => None,
        };
        if let Some(stats) = self.stats.as_mut() {
            if !dest.is_reserved() {
                stats.record_sent(msg.kind, dest, codec::encoded_len(&msg));
            }
        }
        trace!(agent = %self.id, dest = %dest, kind = %msg.kind, "send");
        self.router.route(msg)
    }

    /// Queues `msg` for this agent's own listeners.
    pub fn send_to_self(&mut self, mut msg: Message) -> Result<()> {
        msg.sender = self.id.clone();
        msg.dest = self.id.clone();
        msg.nccc = self.checks.nccc();
        msg.timestamp = self.now();
        self.self_pipe.push(msg)
    }

    pub fn send_to_controller(&mut self, msg: Message) -> Result<()> {
        self.send(&AgentId::controller(), msg)
    }

    pub fn checks(&self) -> ConstraintChecks {
        self.checks
    }

    pub fn checks_mut(&mut self) -> &mut ConstraintChecks {
        &mut self.checks
    }

    pub fn stats(&self) -> Option<&MessageStats> {
        self.stats.as_ref()
    }

    /// Simulated time, if simulated time is on.
    pub fn now(&mut self) -> Option<u64> {
        let performed = self.checks.performed();
        self.clock.as_mut().map(|clock| clock.now(performed))
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    fn observe(&mut self, msg: &Message) {
        self.checks.observe(msg.nccc);
        if let (Some(clock), Some(timestamp)) = (self.clock.as_mut(), msg.timestamp) {
            clock.observe(timestamp, self.checks.performed());
        }
        if let Some(stats) = self.stats.as_mut() {
            if msg.sender != self.id && !msg.sender.is_reserved() {
                stats.record_received(codec::encoded_len(msg));
            }
        }
    }
}

/// One agent's (or endpoint's) mailbox and listeners.
pub struct Queue {
    id: AgentId,
    inbox: Receiver<Message>,
    inbox_tx: Sender<Message>,
    listeners: Vec<Box<dyn MessageListener>>,
    routes: HashMap<MessageKind, Vec<usize>>,
    outbox: Outbox,
    stopped: bool,
}

impl Queue {
    pub fn new(id: AgentId, options: QueueOptions) -> Self {
        let (inbox_tx, inbox) = unbounded();
        let mut router = Router::new();
        if let Some(table) = options.table {
            router.set_table(table);
        }
        let outbox = Outbox {
            id: id.clone(),
            self_pipe: Box::new(ChannelPipe::new(id.clone(), inbox_tx.clone())),
            router,
            stats: options.measure_messages.then(MessageStats::new),
            checks: ConstraintChecks::new(),
            clock: options.simulated_costs.map(SimulatedClock::new),
        };
        Queue {
            id,
            inbox,
            inbox_tx,
            listeners: Vec::new(),
            routes: HashMap::new(),
            outbox,
            stopped: false,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Sender feeding this queue's mailbox.
    pub fn inbox(&self) -> Sender<Message> {
        self.inbox_tx.clone()
    }

    /// Replaces the pipe used for messages to self.
    pub fn set_self_pipe(&mut self, pipe: Box<dyn OutputPipe>) {
        self.outbox.self_pipe = pipe;
    }

    /// Registers `listener` for the kinds it declares.
    pub fn register_listener(&mut self, listener: Box<dyn MessageListener>) {
        let kinds = listener.message_kinds();
        self.register_listener_for(&kinds, listener);
    }

    /// Registers `listener` for `kinds`. Listeners of one kind are called in
    /// registration order.
    pub fn register_listener_for(&mut self, kinds: &[MessageKind], listener: Box<dyn MessageListener>) {
        let index = self.listeners.len();
        self.listeners.push(listener);
        for kind in kinds {
            let listeners = self.routes.entry(*kind).or_default();
            if !listeners.contains(&index) {
                listeners.push(index);
            }
        }
    }

    pub fn add_output_pipe(&mut self, peer: AgentId, pipe: Box<dyn OutputPipe>) {
        self.outbox.router.add_pipe(peer, pipe);
    }

    pub fn send(&mut self, dest: &AgentId, msg: Message) -> Result<()> {
        self.outbox.send(dest, msg)
    }

    pub fn send_to_self(&mut self, msg: Message) -> Result<()> {
        self.outbox.send_to_self(msg)
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// True once a STOP message has been dispatched or the queue was halted.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops processing without a STOP message.
    pub fn halt(&mut self) {
        self.stopped = true;
    }

    /// Handles one message: updates counters, applies built-in orchestration
    /// kinds, then calls the registered listeners in order.
    pub fn dispatch(&mut self, msg: Message) -> Result<()> {
        self.outbox.observe(&msg);
        trace!(agent = %self.id, sender = %msg.sender, kind = %msg.kind, "dispatch");
        let builtin = match &msg.payload {
            Payload::Stop => {
                self.stopped = true;
                true
            }
            Payload::PeerDirectory(entries) => {
                self.outbox.router.extend_directory(entries);
                true
            }
            _ => false,
        };

        let Some(indices) = self.routes.get(&msg.kind) else {
            if !builtin {
                warn!(agent = %self.id, sender = %msg.sender, kind = %msg.kind, "no listener, dropping message");
            }
            return Ok(());
        };
        for &index in indices {
            if let Err(e) = self.listeners[index].on_message(&msg, &mut self.outbox) {
                if e.is_recoverable() {
                    warn!(agent = %self.id, sender = %msg.sender, kind = %msg.kind, error = %e, "dropping message");
                } else {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Waits up to `timeout` for one message and dispatches it.
    /// Returns false if nothing arrived.
    pub fn process_next(&mut self, timeout: Duration) -> Result<bool> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => self.dispatch(msg).map(|()| true),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    /// Dispatches every message already waiting.
    pub fn process_pending(&mut self) -> Result<usize> {
        let mut processed = 0;
        while let Ok(msg) = self.inbox.try_recv() {
            self.dispatch(msg)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Drains the mailbox until a STOP message is dispatched.
    pub fn run(&mut self) -> Result<()> {
        while !self.stopped {
            match self.inbox.recv() {
                Ok(msg) => self.dispatch(msg)?,
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Closes every outgoing pipe.
    pub fn close(&mut self) {
        self.outbox.router.close_all();
    }
}
