//! DCOPForge Runtime
//!
//! This crate deploys and supervises agents:
//! - Controller (local, simulated and distributed runs)
//! - Daemons building agents for a remote controller
//! - Agent construction from configuration
//! - Lifecycle tracking and run events
//! - Console logging setup

pub mod agent;
pub mod console;
pub mod constructor;
pub mod controller;
pub mod daemon;
pub mod event;
pub mod factory;
pub mod host;
pub mod lifecycle;
pub mod monitor;

pub use agent::{abort, Agent, AgentHandle};
pub use constructor::{Constructor, Wiring};
pub use controller::Controller;
pub use daemon::{Daemon, DaemonHandle};
pub use event::RunEvent;
pub use factory::AgentFactory;
pub use host::{HostRole, RuntimeHost};
pub use lifecycle::{agent_report, AgentLifecycle};
pub use monitor::{MonitorHandle, RunMonitor};
