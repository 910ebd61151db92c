//! Message envelopes and the closed set of payloads.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use dcopforge_core::{
    AgentId, Assignment, ConstraintChecks, DcopError, MessageKind, Problem, PseudotreeNode,
    Utility, UtilitySpace, Value,
};
use serde::{Deserialize, Serialize};

use crate::stats::MessageStats;

/// An envelope travelling between two queues.
///
/// `sender`, `nccc` and `timestamp` are stamped by the sending
/// [`Outbox`](crate::Outbox); callers only choose the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub sender: AgentId,
    pub dest: AgentId,
    pub nccc: u64,
    /// Simulated departure time plus delivery cost, when simulated time is on.
    pub timestamp: Option<u64>,
    pub payload: Payload,
}

impl Message {
    pub fn new(payload: Payload) -> Self {
        Message {
            kind: payload.kind(),
            sender: AgentId::default(),
            dest: AgentId::default(),
            nccc: 0,
            timestamp: None,
            payload,
        }
    }

    pub fn start() -> Self {
        Message::new(Payload::Start)
    }

    pub fn stop() -> Self {
        Message::new(Payload::Stop)
    }

    /// Error for a payload that does not match the handler expecting `expected`.
    pub fn unexpected(&self, expected: MessageKind) -> DcopError {
        DcopError::ProtocolViolation(format!(
            "expected {expected} payload from {}, got {}",
            self.sender, self.kind
        ))
    }
}

/// Every payload the runtime exchanges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Configuration(ConfigurationPayload),
    AgentConfiguration(Vec<AgentSpec>),
    AgentsReady(Vec<AgentAddress>),
    PeerDirectory(Vec<AgentAddress>),
    Start,
    Stop,
    Clear,
    AgentStatus(AgentStatus),
    AgentReport(Box<AgentReport>),
    Election(ElectionMsg),
    ElectionOutput(ElectionOutcome),
    DfsChild(DfsToken),
    DfsBacktrack(DfsBacktrack),
    DfsOutput(Box<PseudotreeNode>),
    Util(UtilMsg),
    UtilHeader(UtilHeader),
    Ask(AskMsg),
    UtilEntries(UtilEntries),
    UtilOutput(Box<UtilOutput>),
    OptimalUtility(OptimalUtility),
    Value(ValueMsg),
    Assignments(Vec<VariableAssignment>),
    AgentFinished,
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Configuration(_) => MessageKind::Configuration,
            Payload::AgentConfiguration(_) => MessageKind::AgentConfiguration,
            Payload::AgentsReady(_) => MessageKind::AgentsReady,
            Payload::PeerDirectory(_) => MessageKind::PeerDirectory,
            Payload::Start => MessageKind::Start,
            Payload::Stop => MessageKind::Stop,
            Payload::Clear => MessageKind::Clear,
            Payload::AgentStatus(_) => MessageKind::AgentStatus,
            Payload::AgentReport(_) => MessageKind::AgentReport,
            Payload::Election(_) => MessageKind::Election,
            Payload::ElectionOutput(_) => MessageKind::ElectionOutput,
            Payload::DfsChild(_) => MessageKind::DfsChild,
            Payload::DfsBacktrack(_) => MessageKind::DfsBacktrack,
            Payload::DfsOutput(_) => MessageKind::DfsOutput,
            Payload::Util(_) => MessageKind::Util,
            Payload::UtilHeader(_) => MessageKind::UtilHeader,
            Payload::Ask(_) => MessageKind::Ask,
            Payload::UtilEntries(_) => MessageKind::UtilEntries,
            Payload::UtilOutput(_) => MessageKind::UtilOutput,
            Payload::OptimalUtility(_) => MessageKind::OptimalUtility,
            Payload::Value(_) => MessageKind::Value,
            Payload::Assignments(_) => MessageKind::Assignments,
            Payload::AgentFinished => MessageKind::AgentFinished,
        }
    }
}

// === Orchestration ===

/// Pushed by the controller to a daemon before any agent is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationPayload {
    /// Agent configuration rendered as TOML.
    pub agent_config: String,
    /// Where the controller listens.
    pub controller: SocketAddr,
}

/// Everything needed to build one agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub agent: AgentId,
    pub problem: Problem,
    /// Variables in the whole problem; bounds the election rounds.
    pub total_variables: usize,
}

impl AgentSpec {
    /// Builds the spec of every agent of `problem`.
    pub fn for_problem(problem: &Problem) -> Vec<AgentSpec> {
        problem
            .agents()
            .into_iter()
            .map(|agent| AgentSpec {
                problem: problem.subproblem(&agent),
                agent,
                total_variables: problem.variables.len(),
            })
            .collect()
    }

    /// Agents owning a variable this agent's constraints mention.
    pub fn peers(&self) -> BTreeSet<AgentId> {
        self.problem
            .agents()
            .into_iter()
            .filter(|a| a != &self.agent)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAddress {
    pub agent: AgentId,
    pub address: SocketAddr,
}

/// Agent lifecycle: `Configured -> Running -> Finished -> Cleared`, or
/// `Aborted` from any state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Configured,
    Running,
    Finished,
    Cleared,
    Aborted,
}

impl AgentState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_become(self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Configured, Running)
                | (Running, Finished)
                | (Configured, Cleared)
                | (Running, Cleared)
                | (Finished, Cleared)
                | (Configured | Running | Finished, Aborted)
        )
    }

    /// No further progress is expected from the agent.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Finished | AgentState::Cleared | AgentState::Aborted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent: AgentId,
    pub state: AgentState,
}

/// Per-agent measurements, sent when the agent finishes, stops or aborts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: AgentId,
    pub state: AgentState,
    pub stats: MessageStats,
    pub checks: ConstraintChecks,
    /// Simulated clock of the agent, if simulated time is on.
    pub clock: Option<u64>,
    pub error: Option<String>,
}

// === Root election ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMsg {
    pub dest: String,
    pub sender: String,
    pub round: usize,
    /// Smallest variable name the sender has heard of.
    pub candidate: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionOutcome {
    pub variable: String,
    pub root: String,
}

impl ElectionOutcome {
    pub fn is_root(&self) -> bool {
        self.variable == self.root
    }
}

// === Pseudotree ===

/// The DFS token, handed from a variable to its next tree child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfsToken {
    pub dest: String,
    pub sender: String,
    /// Tree path from the root down to the sender.
    pub stack: Vec<String>,
    pub visited: BTreeSet<String>,
}

/// Returned by a child once its subtree is explored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfsBacktrack {
    pub dest: String,
    pub sender: String,
    pub visited: BTreeSet<String>,
    pub separator: BTreeSet<String>,
}

// === UTIL ===

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtilMsg {
    pub dest: String,
    pub sender: String,
    pub space: UtilitySpace,
}

/// Announces a UTIL space whose entries the parent pulls with ASK.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtilHeader {
    pub dest: String,
    pub sender: String,
    pub scope: Vec<String>,
    pub domains: Vec<Vec<Value>>,
    pub size: usize,
}

/// Request for `count` entries starting at `offset`, parent to child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskMsg {
    pub dest: String,
    pub sender: String,
    pub offset: usize,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtilEntries {
    pub dest: String,
    pub sender: String,
    pub offset: usize,
    pub utilities: Vec<Utility>,
}

/// A variable's joined space before projection, kept for VALUE propagation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtilOutput {
    pub node: PseudotreeNode,
    pub space: UtilitySpace,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimalUtility {
    pub root: String,
    pub utility: Utility,
}

// === VALUE ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMsg {
    pub dest: String,
    pub sender: String,
    /// Values of the receiver's separator.
    pub context: Assignment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAssignment {
    pub variable: String,
    pub value: Value,
}
