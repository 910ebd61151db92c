//! Deterministic delivery for simulated time.
//!
//! In simulated mode every queue lives inside one [`SimulatedMailer`]. All
//! pipes feed the mailer, which delivers messages in order of arrival
//! timestamp, breaking ties by the order they were sent. Runs are therefore
//! reproducible regardless of thread scheduling.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

use crossbeam::channel::{unbounded, Receiver, Sender};
use dcopforge_core::{AgentId, DcopError, Result};
use tracing::{debug, trace, warn};

use crate::message::Message;
use crate::pipe::OutputPipe;
use crate::queue::Queue;

/// Pipe feeding the mailer.
#[derive(Debug)]
pub struct MailerPipe {
    tx: Sender<Message>,
    closed: AtomicBool,
}

impl OutputPipe for MailerPipe {
    fn push(&self, msg: Message) -> Result<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(DcopError::transport(&msg.dest, "mailer pipe closed"));
        }
        self.tx
            .send(msg)
            .map_err(|e| DcopError::transport(&e.0.dest, "mailer is gone"))
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }
}

struct Pending {
    at: u64,
    seq: u64,
    msg: Message,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl Ord for Pending {
    // Reversed: BinaryHeap is a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How a mailer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailerOutcome {
    /// No message left in flight.
    Quiescent,
    /// The wall-clock deadline passed first.
    DeadlineReached,
}

/// Single event loop owning every queue of a simulated run.
pub struct SimulatedMailer {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    queues: BTreeMap<AgentId, Queue>,
    pending: BinaryHeap<Pending>,
    next_seq: u64,
    delivered: u64,
}

impl SimulatedMailer {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        SimulatedMailer {
            tx,
            rx,
            queues: BTreeMap::new(),
            pending: BinaryHeap::new(),
            next_seq: 0,
            delivered: 0,
        }
    }

    /// A new pipe feeding this mailer.
    pub fn pipe(&self) -> Box<dyn OutputPipe> {
        Box::new(MailerPipe {
            tx: self.tx.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Takes ownership of `queue`, routing its self and outgoing messages
    /// through the mailer.
    pub fn add_queue(&mut self, mut queue: Queue) {
        queue.set_self_pipe(self.pipe());
        queue.outbox_mut().router_mut().set_fallback(self.pipe());
        self.queues.insert(queue.id().clone(), queue);
    }

    pub fn queue_mut(&mut self, id: &AgentId) -> Option<&mut Queue> {
        self.queues.get_mut(id)
    }

    /// Messages delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Delivers messages until none is in flight or `deadline` passes.
    ///
    /// A queue whose listener fails is handed to `on_failure` and receives
    /// nothing afterwards unless the callback keeps it running.
    pub fn run<F>(&mut self, deadline: Instant, mut on_failure: F) -> MailerOutcome
    where
        F: FnMut(&mut Queue, DcopError),
    {
        loop {
            self.collect();
            let Some(Pending { at, seq, msg }) = self.pending.pop() else {
                debug!(delivered = self.delivered, "mailer quiescent");
                return MailerOutcome::Quiescent;
            };
            if Instant::now() >= deadline {
                self.pending.push(Pending { at, seq, msg });
                return MailerOutcome::DeadlineReached;
            }
            let Some(queue) = self.queues.get_mut(&msg.dest) else {
                warn!(dest = %msg.dest, kind = %msg.kind, "no queue for message, dropping");
                continue;
            };
            if queue.is_stopped() {
                trace!(dest = %msg.dest, kind = %msg.kind, "queue stopped, dropping");
                continue;
            }
            self.delivered += 1;
            if let Err(e) = queue.dispatch(msg) {
                queue.halt();
                on_failure(queue, e);
            }
        }
    }

    fn collect(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            let at = msg.timestamp.unwrap_or(0);
            let seq = self.next_seq;
            self.next_seq += 1;
            self.pending.push(Pending { at, seq, msg });
        }
    }
}

impl Default for SimulatedMailer {
    fn default() -> Self {
        Self::new()
    }
}
