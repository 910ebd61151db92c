//! Output pipes: the sending half of a link between two queues.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::Sender;
use dcopforge_core::{AgentId, DcopError, Result};

use crate::message::Message;

/// Delivers messages toward one peer.
///
/// `push` never blocks the caller. Closing is idempotent; pushing into a
/// closed or broken pipe fails for this peer only.
pub trait OutputPipe: Send {
    fn push(&self, msg: Message) -> Result<()>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Hands messages to another queue of the same process without copying.
#[derive(Debug)]
pub struct ChannelPipe {
    peer: AgentId,
    tx: Sender<Message>,
    closed: AtomicBool,
}

impl ChannelPipe {
    pub fn new(peer: AgentId, tx: Sender<Message>) -> Self {
        ChannelPipe {
            peer,
            tx,
            closed: AtomicBool::new(false),
        }
    }
}

impl OutputPipe for ChannelPipe {
    fn push(&self, msg: Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DcopError::transport(&self.peer, "pipe closed"));
        }
        self.tx.send(msg).map_err(|_| {
            self.closed.store(true, Ordering::Release);
            DcopError::transport(&self.peer, "receiving queue is gone")
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_close_is_idempotent() {
        let (tx, rx) = unbounded();
        let pipe = ChannelPipe::new(AgentId::new("b"), tx);
        pipe.push(Message::start()).unwrap();
        assert_eq!(rx.recv().unwrap().payload, Payload::Start);

        pipe.close();
        pipe.close();
        assert!(pipe.is_closed());
        assert!(matches!(
            pipe.push(Message::start()),
            Err(DcopError::Transport { .. })
        ));
    }

    #[test]
    fn test_dropped_receiver_breaks_pipe() {
        let (tx, rx) = unbounded();
        drop(rx);
        let pipe = ChannelPipe::new(AgentId::new("b"), tx);
        assert!(pipe.push(Message::stop()).is_err());
        assert!(pipe.is_closed());
    }
}
