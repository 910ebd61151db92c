//! DCOPForge - Distributed Constraint Optimization in Rust
//!
//! Solves DCOPs with DPOP: agents elect roots, build a DFS pseudotree,
//! propagate UTIL spaces up and VALUE assignments down.
//!
//! # Example
//!
//! ```rust
//! use dcopforge::prelude::*;
//!
//! let variables = vec![
//!     Variable::new("x", vec![0, 1], "a1"),
//!     Variable::new("y", vec![0, 1], "a2"),
//! ];
//! let differ = UtilitySpace::from_fn(
//!     vec!["x".to_string(), "y".to_string()],
//!     vec![vec![0, 1], vec![0, 1]],
//!     |values| if values[0] != values[1] { Utility::of(1.0) } else { Utility::ZERO },
//! )
//! .unwrap();
//! let problem = Problem::new(Optimization::Maximize, variables, vec![differ]).unwrap();
//!
//! let solution = dcopforge::solve(problem, DcopConfig::default().with_simulated_time(true)).unwrap();
//! assert!(solution.complete);
//! assert_eq!(solution.utility, Some(Utility::of(1.0)));
//! ```

pub use dcopforge_algorithms::{RunStatistics, Solution};
pub use dcopforge_comm::{AgentReport, AgentState, KindStats, MessageStats};
pub use dcopforge_config::{
    AgentConfig, AskPolicyConfig, ConfigError, DcopConfig, Deployment, MessageCosts, ModuleConfig,
    RunConfig, TransportKind, UtilMode,
};
pub use dcopforge_core::{
    AgentId, Assignment, DcopError, Optimization, Problem, Pseudotree, PseudotreeNode, Result,
    Utility, UtilitySpace, Value, Variable,
};
pub use dcopforge_runtime::{console, Controller, Daemon, DaemonHandle, RunEvent};

mod solver;
pub use solver::{load_problem, problem_from_toml_str, problem_from_yaml_str, solve, solve_with_events};

pub mod prelude {
    pub use super::{
        DcopConfig, Optimization, Problem, Solution, Utility, UtilitySpace, Variable,
    };
    pub use super::{solve, Controller, RunEvent};
}
