//! TCP transport: framed messages over sockets.
//!
//! A [`TcpPipe`] owns one outgoing connection and a writer thread, so
//! pushing never blocks on the network. A [`TcpInbox`] accepts connections
//! and forwards every decoded frame into a queue's mailbox.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use dcopforge_config::MessageTable;
use dcopforge_core::{AgentId, DcopError, Result};
use tracing::{debug, error, trace, warn};

use crate::codec;
use crate::message::Message;
use crate::pipe::OutputPipe;

/// Outgoing connection to one peer.
pub struct TcpPipe {
    peer: AgentId,
    tx: Mutex<Option<Sender<Message>>>,
    broken: Arc<AtomicBool>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl TcpPipe {
    /// Starts a writer thread that connects to `address` and then drains
    /// the pipe. Returns at once; a failed connection marks the pipe broken.
    pub fn connect(peer: AgentId, address: SocketAddr, table: Arc<MessageTable>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let broken = Arc::new(AtomicBool::new(false));
        let writer = {
            let broken = Arc::clone(&broken);
            let peer = peer.clone();
            thread::Builder::new()
                .name(format!("tcp-out-{peer}"))
                .spawn(move || match TcpStream::connect(address) {
                    Ok(stream) => {
                        let _ = stream.set_nodelay(true);
                        debug!(peer = %peer, %address, "connected");
                        write_loop(stream, rx, &table, &broken, &peer);
                    }
                    Err(e) => {
                        error!(peer = %peer, %address, error = %e, "cannot connect");
                        broken.store(true, Ordering::Release);
                    }
                })?
        };
        Ok(TcpPipe {
            peer,
            tx: Mutex::new(Some(tx)),
            broken,
            writer: Mutex::new(Some(writer)),
        })
    }
}

fn write_loop(
    stream: TcpStream,
    rx: Receiver<Message>,
    table: &MessageTable,
    broken: &AtomicBool,
    peer: &AgentId,
) {
    let mut writer = BufWriter::new(stream);
    for msg in rx.iter() {
        let written = codec::write_frame(&mut writer, &msg, table).and_then(|()| {
            if rx.is_empty() {
                writer.flush()?;
            }
            Ok(())
        });
        if let Err(e) = written {
            error!(peer = %peer, error = %e, "connection broken");
            broken.store(true, Ordering::Release);
            return;
        }
    }
    if writer.flush().is_ok() {
        if let Ok(stream) = writer.into_inner() {
            let _ = stream.shutdown(Shutdown::Write);
        }
    }
}

impl OutputPipe for TcpPipe {
    fn push(&self, msg: Message) -> Result<()> {
        if self.broken.load(Ordering::Acquire) {
            return Err(DcopError::transport(&self.peer, "connection broken"));
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx
                .send(msg)
                .map_err(|_| DcopError::transport(&self.peer, "writer stopped")),
            None => Err(DcopError::transport(&self.peer, "pipe closed")),
        }
    }

    /// Flushes queued messages, then closes the connection.
    fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(tx);
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            let _ = writer.join();
        }
    }

    fn is_closed(&self) -> bool {
        self.broken.load(Ordering::Acquire)
            || self
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_none()
    }
}

impl Drop for TcpPipe {
    fn drop(&mut self) {
        self.close();
    }
}

/// Listening socket feeding one mailbox.
pub struct TcpInbox {
    owner: AgentId,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpInbox {
    /// Binds `address` and forwards every message received into `inbox`.
    pub fn bind(
        address: impl ToSocketAddrs,
        owner: AgentId,
        inbox: Sender<Message>,
        table: Arc<MessageTable>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let owner = owner.clone();
            thread::Builder::new()
                .name(format!("tcp-in-{owner}"))
                .spawn(move || accept_loop(listener, &owner, &inbox, &table, &shutdown))?
        };
        debug!(agent = %owner, address = %local_addr, "listening");
        Ok(TcpInbox {
            owner,
            local_addr,
            shutdown,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes the open ones, waiting for
    /// their readers. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Wake the blocking accept.
        let _ = TcpStream::connect(self.local_addr);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        trace!(agent = %self.owner, "inbox closed");
    }
}

impl Drop for TcpInbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// A connection being read on its own thread.
struct Reader {
    stream: TcpStream,
    thread: JoinHandle<()>,
}

fn accept_loop(
    listener: TcpListener,
    owner: &AgentId,
    inbox: &Sender<Message>,
    table: &Arc<MessageTable>,
    shutdown: &AtomicBool,
) {
    let mut readers: Vec<Reader> = Vec::new();
    for stream in listener.incoming() {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        readers.retain(|reader| !reader.thread.is_finished());
        match stream.and_then(|stream| stream.try_clone().map(|handle| (stream, handle))) {
            Ok((stream, handle)) => {
                let spawned = thread::Builder::new().name(format!("tcp-read-{owner}")).spawn({
                    let inbox = inbox.clone();
                    let table = Arc::clone(table);
                    let owner = owner.clone();
                    move || read_loop(stream, &owner, &inbox, &table)
                });
                match spawned {
                    Ok(thread) => readers.push(Reader {
                        stream: handle,
                        thread,
                    }),
                    Err(e) => error!(agent = %owner, error = %e, "cannot spawn reader"),
                }
            }
            Err(e) => warn!(agent = %owner, error = %e, "accept failed"),
        }
    }
    // Unblock pending reads, then wait for every reader.
    for reader in readers {
        let _ = reader.stream.shutdown(Shutdown::Both);
        let _ = reader.thread.join();
    }
}

fn read_loop(stream: TcpStream, owner: &AgentId, inbox: &Sender<Message>, table: &MessageTable) {
    let peer = stream.peer_addr().ok();
    let mut reader = BufReader::new(stream);
    loop {
        match codec::read_frame(&mut reader, table) {
            Ok(Some(msg)) => {
                if inbox.send(msg).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(agent = %owner, peer = ?peer, error = %e, "dropping connection");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Duration;

    use super::*;
    use crate::message::{Payload, VariableAssignment};

    #[test]
    fn test_messages_cross_a_socket_in_order() {
        let table = Arc::new(MessageTable::default());
        let (tx, rx) = unbounded();
        let mut inbox = TcpInbox::bind("127.0.0.1:0", AgentId::new("b"), tx, Arc::clone(&table)).unwrap();
        let pipe = TcpPipe::connect(AgentId::new("b"), inbox.local_addr(), table).unwrap();

        for value in 0..20 {
            let mut msg = Message::new(Payload::Assignments(vec![VariableAssignment {
                variable: "x".to_string(),
                value,
            }]));
            msg.dest = AgentId::new("b");
            pipe.push(msg).unwrap();
        }
        pipe.close();

        for value in 0..20 {
            let msg = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            match msg.payload {
                Payload::Assignments(a) => assert_eq!(a[0].value, value),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        inbox.shutdown();
        inbox.shutdown();
    }

    fn wait_until_closed(pipe: &TcpPipe) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if pipe.is_closed() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_connect_failure_breaks_the_pipe() {
        let table = Arc::new(MessageTable::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        // Connecting happens on the writer thread, so this returns at once.
        let pipe = TcpPipe::connect(AgentId::new("gone"), address, table).unwrap();
        assert!(wait_until_closed(&pipe));
        let err = pipe.push(Message::stop()).unwrap_err();
        assert!(matches!(err, DcopError::Transport { .. }));
    }

    #[test]
    fn test_pushes_before_connecting_are_delivered() {
        let table = Arc::new(MessageTable::default());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let pipe = TcpPipe::connect(AgentId::new("b"), address, Arc::clone(&table)).unwrap();
        let mut msg = Message::stop();
        msg.dest = AgentId::new("b");
        pipe.push(msg.clone()).unwrap();
        pipe.close();

        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        assert_eq!(codec::read_frame(&mut reader, &table).unwrap(), Some(msg));
    }

    #[test]
    fn test_shutdown_closes_open_connections() {
        let table = Arc::new(MessageTable::default());
        let (tx, _rx) = unbounded();
        let mut inbox = TcpInbox::bind("127.0.0.1:0", AgentId::new("b"), tx, table).unwrap();
        let mut client = TcpStream::connect(inbox.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Returns only once the reader of `client` is gone.
        inbox.shutdown();
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_closed_pipe_rejects_pushes() {
        let table = Arc::new(MessageTable::default());
        let (tx, _rx) = unbounded();
        let inbox = TcpInbox::bind("127.0.0.1:0", AgentId::new("b"), tx, Arc::clone(&table)).unwrap();
        let pipe = TcpPipe::connect(AgentId::new("b"), inbox.local_addr(), table).unwrap();
        pipe.close();
        assert!(pipe.is_closed());
        assert!(pipe.push(Message::stop()).is_err());
    }
}
