//! Solution assembly.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dcopforge_comm::{Message, MessageListener, Outbox, Payload};
use dcopforge_core::{Assignment, MessageKind, Optimization, Problem, Result, Utility, Value};
use tracing::{debug, warn};

use crate::stats::RunStatistics;

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct Solution {
    pub optimization: Optimization,
    /// Sum of the optima reported by the pseudotree roots.
    pub utility: Option<Utility>,
    /// The problem evaluated on [`Self::assignment`], when it is complete.
    pub true_utility: Option<Utility>,
    pub assignment: Assignment,
    /// Every variable was assigned and no agent failed or timed out.
    pub complete: bool,
    pub timed_out: bool,
    pub statistics: RunStatistics,
}

impl Solution {
    /// Returns true if the reported utility is not the infeasible sentinel.
    pub fn is_feasible(&self) -> bool {
        self.utility
            .is_some_and(|u| self.optimization.is_feasible(u))
    }

    /// Returns true if the run produced a complete, feasible assignment.
    pub fn has_solution(&self) -> bool {
        self.complete && self.is_feasible()
    }

    pub fn value_of(&self, variable: &str) -> Option<Value> {
        self.assignment.get(variable).copied()
    }
}

#[derive(Debug, Default)]
struct SolutionState {
    optima: BTreeMap<String, Utility>,
    assignment: Assignment,
}

/// Controller-side listener gathering root optima and variable values.
pub struct SolutionCollector {
    state: Arc<Mutex<SolutionState>>,
}

#[derive(Clone)]
pub struct SolutionHandle {
    state: Arc<Mutex<SolutionState>>,
}

fn lock(state: &Mutex<SolutionState>) -> MutexGuard<'_, SolutionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SolutionCollector {
    pub fn new() -> (SolutionCollector, SolutionHandle) {
        let state = Arc::new(Mutex::new(SolutionState::default()));
        (
            SolutionCollector {
                state: Arc::clone(&state),
            },
            SolutionHandle { state },
        )
    }
}

impl SolutionHandle {
    pub fn assignment(&self) -> Assignment {
        lock(&self.state).assignment.clone()
    }

    /// Optimal utility reported by each root.
    pub fn optima(&self) -> BTreeMap<String, Utility> {
        lock(&self.state).optima.clone()
    }

    /// Number of variables with a value so far.
    pub fn assigned_count(&self) -> usize {
        lock(&self.state).assignment.len()
    }

    /// Assembles the solution from what has been collected.
    pub fn solution(&self, problem: &Problem, statistics: RunStatistics, timed_out: bool) -> Solution {
        let state = lock(&self.state);
        let utility = if state.optima.is_empty() {
            None
        } else {
            Some(state.optima.values().copied().sum())
        };
        let assigned_all = problem
            .variables
            .iter()
            .all(|v| state.assignment.contains_key(&v.name));
        let true_utility = if assigned_all {
            problem.evaluate(&state.assignment)
        } else {
            None
        };
        let complete = assigned_all && !timed_out && !statistics.has_aborted_agents();
        Solution {
            optimization: problem.optimization,
            utility,
            true_utility,
            assignment: state.assignment.clone(),
            complete,
            timed_out,
            statistics,
        }
    }
}

impl MessageListener for SolutionCollector {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::OptimalUtility, MessageKind::Assignments]
    }

    fn on_message(&mut self, msg: &Message, _outbox: &mut Outbox) -> Result<()> {
        let mut state = lock(&self.state);
        match &msg.payload {
            Payload::OptimalUtility(optimum) => {
                debug!(root = %optimum.root, utility = %optimum.utility, "optimum reported");
                state.optima.insert(optimum.root.clone(), optimum.utility);
            }
            Payload::Assignments(assignments) => {
                for assignment in assignments {
                    let previous = state
                        .assignment
                        .insert(assignment.variable.clone(), assignment.value);
                    if previous.is_some_and(|p| p != assignment.value) {
                        warn!(
                            variable = %assignment.variable,
                            value = assignment.value,
                            "variable reassigned to a different value"
                        );
                    }
                }
            }
            _ => return Err(msg.unexpected(MessageKind::Assignments)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
