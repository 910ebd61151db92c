//! An agent's view of the problem.

use std::collections::BTreeSet;

use dcopforge_comm::AgentSpec;
use dcopforge_core::{AgentId, DcopError, Optimization, Problem, Result, UtilitySpace, Value};

/// The subproblem one agent works on, plus the variables it owns.
#[derive(Debug, Clone)]
pub struct LocalProblem {
    agent: AgentId,
    problem: Problem,
    owned: Vec<String>,
    total_variables: usize,
}

impl LocalProblem {
    pub fn new(agent: AgentId, problem: Problem, total_variables: usize) -> Self {
        let mut owned: Vec<String> = problem.variables_of(&agent).map(|v| v.name.clone()).collect();
        owned.sort();
        LocalProblem {
            agent,
            problem,
            owned,
            total_variables,
        }
    }

    pub fn from_spec(spec: &AgentSpec) -> Self {
        LocalProblem::new(spec.agent.clone(), spec.problem.clone(), spec.total_variables)
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn optimization(&self) -> Optimization {
        self.problem.optimization
    }

    /// Owned variables, sorted by name.
    pub fn owned(&self) -> &[String] {
        &self.owned
    }

    pub fn owns(&self, var: &str) -> bool {
        self.owned.iter().any(|v| v == var)
    }

    pub fn total_variables(&self) -> usize {
        self.total_variables
    }

    pub fn neighbors(&self, var: &str) -> BTreeSet<String> {
        self.problem.neighbors(var)
    }

    pub fn constraints_of<'a>(&'a self, var: &'a str) -> impl Iterator<Item = &'a UtilitySpace> + 'a {
        self.problem.constraints_of(var)
    }

    pub fn owner_of(&self, var: &str) -> Result<AgentId> {
        self.problem
            .owner_of(var)
            .cloned()
            .ok_or_else(|| DcopError::Inconsistent(format!("no owner known for '{var}'")))
    }

    pub fn domain_of(&self, var: &str) -> Result<&[Value]> {
        self.problem
            .variable(var)
            .map(|v| v.domain.as_slice())
            .ok_or_else(|| DcopError::Inconsistent(format!("unknown variable '{var}'")))
    }

    /// Fails unless `var` is owned here; messages for foreign variables are
    /// protocol violations.
    pub fn check_owned(&self, var: &str) -> Result<()> {
        if self.owns(var) {
            Ok(())
        } else {
            Err(DcopError::ProtocolViolation(format!(
                "agent {} does not own '{var}'",
                self.agent
            )))
        }
    }
}
