//! Variables and the agents that own them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A domain value.
pub type Value = i64;

const CONTROLLER: &str = "__controller__";
const DAEMON_PREFIX: &str = "__daemon__";

/// Identifier of an agent or of an orchestration endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        AgentId(id.into())
    }

    /// The endpoint every agent reports to.
    pub fn controller() -> Self {
        AgentId(CONTROLLER.to_string())
    }

    /// The endpoint of the daemon listening at `address`.
    pub fn daemon(address: impl fmt::Display) -> Self {
        AgentId(format!("{DAEMON_PREFIX}{address}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_controller(&self) -> bool {
        self.0 == CONTROLLER
    }

    pub fn is_daemon(&self) -> bool {
        self.0.starts_with(DAEMON_PREFIX)
    }

    /// Returns true for orchestration endpoints, which never own variables.
    pub fn is_reserved(&self) -> bool {
        self.is_controller() || self.is_daemon()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        AgentId::new(id)
    }
}

/// A decision variable with a finite ordered domain.
///
/// Variables are identified by name; names also serve as the deterministic
/// ordering key wherever the protocols need a tie-break.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub domain: Vec<Value>,
    pub owner: AgentId,
}

impl Variable {
    pub fn new(name: impl Into<String>, domain: Vec<Value>, owner: impl Into<AgentId>) -> Self {
        Variable {
            name: name.into(),
            domain,
            owner: owner.into(),
        }
    }

    pub fn domain_size(&self) -> usize {
        self.domain.len()
    }

    /// Position of `value` in the domain.
    pub fn index_of(&self, value: Value) -> Option<usize> {
        self.domain.iter().position(|&v| v == value)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        AgentId(id)
    }
}
