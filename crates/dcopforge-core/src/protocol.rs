//! Message kinds exchanged by agents and orchestration endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every kind of message the runtime knows about.
///
/// Each kind belongs to a module and has a logical name; together they
/// form the key (`module.NAME`) used to assign wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    // Orchestration
    Configuration,
    AgentConfiguration,
    AgentsReady,
    PeerDirectory,
    Start,
    Stop,
    Clear,
    AgentStatus,
    AgentReport,
    // Root election
    Election,
    ElectionOutput,
    // Pseudotree construction
    DfsChild,
    DfsBacktrack,
    DfsOutput,
    // UTIL propagation
    Util,
    UtilHeader,
    Ask,
    UtilEntries,
    UtilOutput,
    OptimalUtility,
    // VALUE propagation
    Value,
    Assignments,
    AgentFinished,
}

impl MessageKind {
    pub const ALL: &'static [MessageKind] = &[
        MessageKind::Configuration,
        MessageKind::AgentConfiguration,
        MessageKind::AgentsReady,
        MessageKind::PeerDirectory,
        MessageKind::Start,
        MessageKind::Stop,
        MessageKind::Clear,
        MessageKind::AgentStatus,
        MessageKind::AgentReport,
        MessageKind::Election,
        MessageKind::ElectionOutput,
        MessageKind::DfsChild,
        MessageKind::DfsBacktrack,
        MessageKind::DfsOutput,
        MessageKind::Util,
        MessageKind::UtilHeader,
        MessageKind::Ask,
        MessageKind::UtilEntries,
        MessageKind::UtilOutput,
        MessageKind::OptimalUtility,
        MessageKind::Value,
        MessageKind::Assignments,
        MessageKind::AgentFinished,
    ];

    /// The module that defines this kind.
    pub const fn module(self) -> &'static str {
        use MessageKind::*;
        match self {
            Configuration | AgentConfiguration | AgentsReady | PeerDirectory | Start | Stop
            | Clear | AgentStatus | AgentReport => "orchestration",
            Election | ElectionOutput => "election",
            DfsChild | DfsBacktrack | DfsOutput => "pseudotree",
            Util | UtilHeader | Ask | UtilEntries | UtilOutput | OptimalUtility => {
                "util_propagation"
            }
            Value | Assignments | AgentFinished => "value_propagation",
        }
    }

    /// The logical name within the module.
    pub const fn name(self) -> &'static str {
        use MessageKind::*;
        match self {
            Configuration => "CONFIGURATION",
            AgentConfiguration => "AGENT_CONFIGURATION",
            AgentsReady => "AGENTS_READY",
            PeerDirectory => "PEER_DIRECTORY",
            Start => "START",
            Stop => "STOP",
            Clear => "CLEAR",
            AgentStatus => "AGENT_STATUS",
            AgentReport => "AGENT_REPORT",
            Election => "ELECTION",
            ElectionOutput => "ELECTION_OUTPUT",
            DfsChild => "CHILD",
            DfsBacktrack => "BACKTRACK",
            DfsOutput => "DFS_OUTPUT",
            Util => "UTIL",
            UtilHeader => "UTIL_HEADER",
            Ask => "ASK",
            UtilEntries => "UTIL_ENTRIES",
            UtilOutput => "UTIL_OUTPUT",
            OptimalUtility => "OPT_UTIL",
            Value => "VALUE",
            Assignments => "ASSIGNMENTS",
            AgentFinished => "AGENT_FINISHED",
        }
    }

    /// `module.NAME`
    pub fn logical_name(self) -> String {
        format!("{}.{}", self.module(), self.name())
    }

    /// Looks a kind up by its logical name.
    pub fn from_logical_name(name: &str) -> Option<MessageKind> {
        Self::ALL.iter().copied().find(|k| k.logical_name() == name)
    }

    /// Orchestration kinds travel before any configuration is known, so
    /// their wire tags can never be remapped.
    pub const fn is_orchestration(self) -> bool {
        matches!(
            self,
            MessageKind::Configuration
                | MessageKind::AgentConfiguration
                | MessageKind::AgentsReady
                | MessageKind::PeerDirectory
                | MessageKind::Start
                | MessageKind::Stop
                | MessageKind::Clear
                | MessageKind::AgentStatus
                | MessageKind::AgentReport
        )
    }

    /// Default wire tag.
    pub fn default_tag(self) -> u16 {
        let index = Self::ALL.iter().position(|&k| k == self).unwrap_or(0);
        if self.is_orchestration() {
            index as u16 + 1
        } else {
            100 + index as u16
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_logical_names_are_unique() {
        let names: BTreeSet<_> = MessageKind::ALL.iter().map(|k| k.logical_name()).collect();
        assert_eq!(names.len(), MessageKind::ALL.len());
    }

    #[test]
    fn test_default_tags_are_unique() {
        let tags: BTreeSet<_> = MessageKind::ALL.iter().map(|k| k.default_tag()).collect();
        assert_eq!(tags.len(), MessageKind::ALL.len());
    }

    #[test]
    fn test_lookup_by_logical_name() {
        assert_eq!(
            MessageKind::from_logical_name("util_propagation.UTIL"),
            Some(MessageKind::Util)
        );
        assert_eq!(MessageKind::from_logical_name("util_propagation.NOPE"), None);
        assert_eq!(MessageKind::Value.to_string(), "value_propagation.VALUE");
    }
}
