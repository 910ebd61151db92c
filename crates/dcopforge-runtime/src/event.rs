//! Run events streamed to callers of
//! [`Controller::solve_with_events`](crate::Controller::solve_with_events).

use std::time::Duration;

use dcopforge_comm::AgentState;
use dcopforge_core::{AgentId, RunId};

/// Progress of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Agents are configured and about to receive START.
    Started { run: RunId, agents: usize },
    /// An agent reported a new lifecycle state.
    AgentStateChanged { agent: AgentId, state: AgentState },
    /// The global deadline passed before every agent finished.
    TimedOut { run: RunId },
    /// The run is over; partial if `complete` is false.
    Finished {
        run: RunId,
        complete: bool,
        wall_time: Duration,
    },
}
