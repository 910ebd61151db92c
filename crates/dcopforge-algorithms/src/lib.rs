//! DCOPForge protocol modules.
//!
//! Each module is a [`MessageListener`](dcopforge_comm::MessageListener)
//! stacked on an agent's queue:
//!
//! - [`VariableElection`]: one root per connected component
//! - [`PseudotreeBuilder`]: DFS pseudotree by token passing
//! - [`UtilPropagation`]: bottom-up UTIL join and projection, eager or pulled
//!   through an [`AskPolicy`]
//! - [`ValuePropagation`]: top-down optimal value selection
//!
//! The controller's queue carries the passive [`StatsCollector`] and
//! [`SolutionCollector`].

pub mod ask;
pub mod dfs;
pub mod election;
pub mod local;
pub mod solution;
pub mod stats;
pub mod util;
pub mod value;

pub use ask::{AskPolicy, PulledSpace};
pub use dfs::PseudotreeBuilder;
pub use election::VariableElection;
pub use local::LocalProblem;
pub use solution::{Solution, SolutionCollector, SolutionHandle};
pub use stats::{RunStatistics, StatsCollector, StatsHandle};
pub use util::{join_local, UtilPropagation};
pub use value::{choose, ValuePropagation};
