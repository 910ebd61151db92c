//! DCOPForge Core - Core types for distributed constraint optimization
//!
//! This crate provides the fundamental abstractions for DCOPForge:
//! - Utility algebra with infeasible sentinels
//! - Utility spaces with join, projection and slicing
//! - Problem instances and per-agent subproblems
//! - Pseudotree nodes
//! - Message kinds and constraint-check accounting

pub mod error;
pub mod ids;
pub mod nccc;
pub mod problem;
pub mod protocol;
pub mod pseudotree;
pub mod space;
pub mod utility;
pub mod variable;

pub use error::{DcopError, Result};
pub use ids::{IdGenerator, RunId};
pub use nccc::ConstraintChecks;
pub use problem::Problem;
pub use protocol::MessageKind;
pub use pseudotree::{Pseudotree, PseudotreeNode};
pub use space::{Assignment, UtilitySpace};
pub use utility::{Optimization, Utility};
pub use variable::{AgentId, Value, Variable};
