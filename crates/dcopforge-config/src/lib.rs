//! Configuration system for DCOPForge.
//!
//! Load agent and run configuration from TOML or YAML to choose the
//! protocol modules stacked on every agent, the transport, simulated time,
//! and the deployment without code changes.
//!
//! # Examples
//!
//! ```
//! use dcopforge_config::{DcopConfig, UtilMode};
//! use std::time::Duration;
//!
//! let config = DcopConfig::from_toml_str(r#"
//!     [run]
//!     timeout_secs = 30
//!
//!     [agent]
//!     measure_time = true
//!
//!     [agent.util_mode]
//!     type = "pull"
//!     [agent.util_mode.policy]
//!     type = "chunked"
//!     chunk_size = 8
//! "#).unwrap();
//!
//! assert_eq!(config.run.timeout(), Duration::from_secs(30));
//! assert!(matches!(config.agent.util_mode, UtilMode::Pull { .. }));
//! assert_eq!(config.agent.modules.len(), 4);
//! ```
//!
//! Use default config when file is missing:
//!
//! ```
//! use dcopforge_config::DcopConfig;
//!
//! let config = DcopConfig::load("dcop.toml").unwrap_or_default();
//! ```

mod message_table;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use dcopforge_core::{DcopError, MessageKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use message_table::MessageTable;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for DcopError {
    fn from(err: ConfigError) -> Self {
        DcopError::Configuration(err.to_string())
    }
}

/// Complete configuration: how agents are built and how a run is deployed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DcopConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub run: RunConfig,
}

impl DcopConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or contains invalid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Sets the global run timeout.
    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.run.timeout_secs = seconds;
        self
    }

    /// Enables or disables simulated time.
    pub fn with_simulated_time(mut self, enabled: bool) -> Self {
        self.agent.measure_time = enabled;
        self
    }

    /// Sets the UTIL propagation mode.
    pub fn with_util_mode(mut self, mode: UtilMode) -> Self {
        self.agent.util_mode = mode;
        self
    }

    /// Sets the transport between agents.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.agent.transport = transport;
        self
    }

    /// Dispatches agents to the daemons at `addresses` over TCP.
    pub fn with_daemons<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run.deployment = Deployment::Distributed {
            daemons: addresses.into_iter().map(Into::into).collect(),
        };
        self.agent.transport = TransportKind::Tcp;
        self
    }

    /// Validates the agent and run sections and how they combine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.validate()?;
        self.run.validate()?;
        if matches!(self.run.deployment, Deployment::Distributed { .. })
            && self.agent.transport != TransportKind::Tcp
        {
            return Err(ConfigError::Invalid(
                "distributed deployment requires the tcp transport".to_string(),
            ));
        }
        Ok(())
    }
}

/// How every agent of a run is assembled.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Protocol modules stacked on each agent, in registration order.
    #[serde(default = "default_modules")]
    pub modules: Vec<ModuleConfig>,

    /// Replaces wall-clock timing with simulated time.
    #[serde(default)]
    pub measure_time: bool,

    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default)]
    pub util_mode: UtilMode,

    /// Whether agents count the messages they send.
    #[serde(default = "default_true")]
    pub measure_messages: bool,

    #[serde(default)]
    pub message_costs: MessageCosts,

    /// Wire tag overrides keyed by `module.NAME`.
    #[serde(default)]
    pub messages: BTreeMap<String, u16>,
}

fn default_modules() -> Vec<ModuleConfig> {
    vec![
        ModuleConfig::Election,
        ModuleConfig::Pseudotree,
        ModuleConfig::UtilPropagation,
        ModuleConfig::ValuePropagation,
    ]
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            modules: default_modules(),
            measure_time: false,
            transport: TransportKind::default(),
            util_mode: UtilMode::default(),
            measure_messages: true,
            message_costs: MessageCosts::default(),
            messages: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Parses an agent configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Renders this configuration as TOML, the form shipped to daemons.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn has_module(&self, module: &ModuleConfig) -> bool {
        self.modules.contains(module)
    }

    /// Resolves the wire tag table for this configuration.
    pub fn message_table(&self) -> Result<MessageTable, ConfigError> {
        let table = MessageTable::resolve(&self.messages)?;
        for module in &self.modules {
            table.require(module.message_kinds())?;
        }
        Ok(table)
    }

    /// Checks the module stack, the transport and the message tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modules.is_empty() {
            return Err(ConfigError::Invalid("no modules configured".to_string()));
        }
        for (i, module) in self.modules.iter().enumerate() {
            if self.modules[..i].contains(module) {
                return Err(ConfigError::Invalid(format!(
                    "module '{}' is listed twice",
                    module.name()
                )));
            }
            if let Some(required) = module.requires() {
                if !self.modules[..i].contains(&required) {
                    return Err(ConfigError::Invalid(format!(
                        "module '{}' must come after '{}'",
                        module.name(),
                        required.name()
                    )));
                }
            }
        }
        if self.measure_time && self.transport == TransportKind::Tcp {
            return Err(ConfigError::Invalid(
                "simulated time is only available with the in_process transport".to_string(),
            ));
        }
        if let UtilMode::Pull {
            policy: AskPolicyConfig::Chunked { chunk_size: 0 },
        } = self.util_mode
        {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        self.message_costs.validate()?;
        self.message_table()?;
        Ok(())
    }
}

/// A protocol module stacked on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleConfig {
    /// Elects one root variable per connected component.
    Election,

    /// Builds the pseudotree by DFS token passing.
    Pseudotree,

    /// Bottom-up UTIL propagation.
    UtilPropagation,

    /// Top-down VALUE propagation.
    ValuePropagation,
}

impl ModuleConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ModuleConfig::Election => "election",
            ModuleConfig::Pseudotree => "pseudotree",
            ModuleConfig::UtilPropagation => "util_propagation",
            ModuleConfig::ValuePropagation => "value_propagation",
        }
    }

    /// The module whose output this one consumes.
    pub fn requires(&self) -> Option<ModuleConfig> {
        match self {
            ModuleConfig::Election => None,
            ModuleConfig::Pseudotree => Some(ModuleConfig::Election),
            ModuleConfig::UtilPropagation => Some(ModuleConfig::Pseudotree),
            ModuleConfig::ValuePropagation => Some(ModuleConfig::UtilPropagation),
        }
    }

    /// Message kinds this module sends or listens to.
    pub fn message_kinds(&self) -> &'static [MessageKind] {
        match self {
            ModuleConfig::Election => &[MessageKind::Start, MessageKind::Election, MessageKind::ElectionOutput],
            ModuleConfig::Pseudotree => &[
                MessageKind::ElectionOutput,
                MessageKind::DfsChild,
                MessageKind::DfsBacktrack,
                MessageKind::DfsOutput,
            ],
            ModuleConfig::UtilPropagation => &[
                MessageKind::DfsOutput,
                MessageKind::Util,
                MessageKind::UtilHeader,
                MessageKind::Ask,
                MessageKind::UtilEntries,
                MessageKind::UtilOutput,
                MessageKind::OptimalUtility,
            ],
            ModuleConfig::ValuePropagation => &[
                MessageKind::UtilOutput,
                MessageKind::Value,
                MessageKind::Assignments,
                MessageKind::AgentFinished,
            ],
        }
    }
}

/// Transport between agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Channels between queues of the same process.
    #[default]
    InProcess,

    /// Length-prefixed frames over TCP sockets.
    Tcp,
}

/// How UTIL messages travel from child to parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UtilMode {
    /// Children push complete UTIL spaces.
    #[default]
    Eager,

    /// Children announce their space; parents pull entries with ASK.
    Pull {
        #[serde(default)]
        policy: AskPolicyConfig,
    },
}

/// Which entries a parent asks for in pull mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AskPolicyConfig {
    /// One request for the entire space.
    Whole,

    /// Consecutive requests of at most `chunk_size` entries.
    Chunked { chunk_size: usize },
}

impl Default for AskPolicyConfig {
    fn default() -> Self {
        AskPolicyConfig::Chunked { chunk_size: 64 }
    }
}

/// Simulated-time costs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MessageCosts {
    /// Cost of delivering one message.
    #[serde(default = "default_message_cost")]
    pub default_cost: u64,

    /// Cost of one constraint check.
    #[serde(default)]
    pub check_cost: u64,

    /// Per-kind delivery costs keyed by `module.NAME`.
    #[serde(default)]
    pub per_kind: BTreeMap<String, u64>,
}

fn default_message_cost() -> u64 {
    1
}

impl Default for MessageCosts {
    fn default() -> Self {
        MessageCosts {
            default_cost: default_message_cost(),
            check_cost: 0,
            per_kind: BTreeMap::new(),
        }
    }
}

impl MessageCosts {
    /// Delivery cost of one message of `kind`.
    pub fn cost_of(&self, kind: MessageKind) -> u64 {
        self.per_kind
            .get(&kind.logical_name())
            .copied()
            .unwrap_or(self.default_cost)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for name in self.per_kind.keys() {
            if MessageKind::from_logical_name(name).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown message kind '{name}' in message_costs"
                )));
            }
        }
        Ok(())
    }
}

/// How a run is deployed and bounded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Global deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long to wait for partial reports after stopping agents.
    #[serde(default = "default_stop_grace_millis")]
    pub stop_grace_millis: u64,

    #[serde(default)]
    pub deployment: Deployment,

    /// Address the controller listens on in distributed mode.
    #[serde(default)]
    pub controller_address: Option<String>,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_stop_grace_millis() -> u64 {
    500
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            timeout_secs: default_timeout_secs(),
            stop_grace_millis: default_stop_grace_millis(),
            deployment: Deployment::default(),
            controller_address: None,
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        if let Deployment::Distributed { daemons } = &self.deployment {
            if daemons.is_empty() {
                return Err(ConfigError::Invalid(
                    "distributed deployment needs at least one daemon".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Where agents run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Deployment {
    /// All agents in the controller's process.
    #[default]
    Local,

    /// Agents spread over daemons, one per host.
    Distributed { daemons: Vec<String> },
}

#[cfg(test)]
mod tests;
