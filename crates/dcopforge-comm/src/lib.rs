//! DCOPForge messaging substrate.
//!
//! - [`Message`] envelopes with a closed [`Payload`] set
//! - [`Queue`]: per-agent mailbox with sequential listener dispatch
//! - Transports: in-process [`ChannelPipe`], TCP ([`TcpPipe`] and
//!   [`TcpInbox`]) and the simulated-time [`SimulatedMailer`]
//! - Length-prefixed wire [`codec`]
//! - [`MessageStats`] counters

pub mod clock;
pub mod codec;
pub mod mailer;
pub mod message;
pub mod pipe;
pub mod queue;
pub mod router;
pub mod stats;
pub mod tcp;

pub use clock::SimulatedClock;
pub use mailer::{MailerOutcome, SimulatedMailer};
pub use message::{
    AgentAddress, AgentReport, AgentSpec, AgentState, AgentStatus, AskMsg, ConfigurationPayload,
    DfsBacktrack, DfsToken, ElectionMsg, ElectionOutcome, Message, OptimalUtility, Payload,
    UtilEntries, UtilHeader, UtilMsg, UtilOutput, ValueMsg, VariableAssignment,
};
pub use pipe::{ChannelPipe, OutputPipe};
pub use queue::{MessageListener, Outbox, Queue, QueueOptions};
pub use router::Router;
pub use stats::{KindStats, MessageStats, Traffic};
pub use tcp::{TcpInbox, TcpPipe};
