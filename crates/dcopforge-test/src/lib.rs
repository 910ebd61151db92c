//! Shared test fixtures for DCOPForge crates.
//!
//! This crate only depends on `dcopforge-core`, so every other crate can use
//! it as a dev-dependency.
//!
//! - [`problems`] - Small problems with known optima, and seeded random ones
//! - [`oracle`] - Brute-force enumeration of all assignments
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! dcopforge-test = { workspace = true }
//! ```
//!
//! ```ignore
//! use dcopforge_test::problems::{path_problem, random_problem};
//! use dcopforge_test::oracle::brute_force;
//! ```

pub mod oracle;
pub mod problems;

pub use oracle::brute_force;
pub use problems::{
    disconnected_problem, hard_not_equal, path_problem, random_problem, ring_problem,
    soft_not_equal, triangle_problem, RandomProblem,
};
