//! DCOP problem instances.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DcopError, Result};
use crate::space::{Assignment, UtilitySpace};
use crate::utility::{Optimization, Utility};
use crate::variable::{AgentId, Variable};

/// A distributed constraint optimization problem: variables owned by
/// agents, and constraints given as utility spaces.
///
/// Problems are immutable once loaded; agents receive the
/// [`subproblem`](Problem::subproblem) relevant to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Problem {
    #[serde(default)]
    pub optimization: Optimization,

    pub variables: Vec<Variable>,

    #[serde(default)]
    pub constraints: Vec<UtilitySpace>,
}

impl Problem {
    /// Creates a validated problem.
    pub fn new(
        optimization: Optimization,
        variables: Vec<Variable>,
        constraints: Vec<UtilitySpace>,
    ) -> Result<Self> {
        let problem = Problem {
            optimization,
            variables,
            constraints,
        };
        problem.validate()?;
        Ok(problem)
    }

    /// Checks that variable names are unique, owners are valid, and every
    /// constraint ranges over known variables with matching domains. The
    /// only infinite utility a constraint may hold is the direction's
    /// infeasible sentinel.
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for var in &self.variables {
            if !names.insert(var.name.as_str()) {
                return Err(DcopError::Configuration(format!(
                    "duplicate variable '{}'",
                    var.name
                )));
            }
            if var.domain.is_empty() {
                return Err(DcopError::Configuration(format!(
                    "variable '{}' has an empty domain",
                    var.name
                )));
            }
            if var.owner.as_str().is_empty() || var.owner.is_reserved() {
                return Err(DcopError::Configuration(format!(
                    "variable '{}' has invalid owner '{}'",
                    var.name, var.owner
                )));
            }
        }
        for (i, constraint) in self.constraints.iter().enumerate() {
            for (name, domain) in constraint.scope().iter().zip(constraint.domains()) {
                let var = self.variable(name).ok_or_else(|| {
                    DcopError::Configuration(format!(
                        "constraint #{i} refers to unknown variable '{name}'"
                    ))
                })?;
                if domain != &var.domain {
                    return Err(DcopError::Configuration(format!(
                        "constraint #{i} uses domain {domain:?} for '{name}', expected {:?}",
                        var.domain
                    )));
                }
            }
            let infeasible = self.optimization.infeasible();
            if constraint
                .utilities()
                .iter()
                .any(|u| u.is_infinite() && *u != infeasible)
            {
                return Err(DcopError::Configuration(format!(
                    "constraint #{i} holds an infinite utility other than {infeasible}, \
                     the infeasible sentinel for {}",
                    self.optimization
                )));
            }
        }
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn owner_of(&self, name: &str) -> Option<&AgentId> {
        self.variable(name).map(|v| &v.owner)
    }

    /// All agents owning at least one variable, sorted.
    pub fn agents(&self) -> Vec<AgentId> {
        self.variables
            .iter()
            .map(|v| v.owner.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn variables_of<'a>(&'a self, agent: &'a AgentId) -> impl Iterator<Item = &'a Variable> + 'a {
        self.variables.iter().filter(move |v| &v.owner == agent)
    }

    /// Constraints whose scope contains `var`.
    pub fn constraints_of<'a>(&'a self, var: &'a str) -> impl Iterator<Item = &'a UtilitySpace> + 'a {
        self.constraints.iter().filter(move |c| c.contains(var))
    }

    /// Variables sharing at least one constraint with `var`.
    pub fn neighbors(&self, var: &str) -> BTreeSet<String> {
        self.constraints_of(var)
            .flat_map(|c| c.scope().iter())
            .filter(|v| v.as_str() != var)
            .cloned()
            .collect()
    }

    /// Constraint graph adjacency over all variables.
    pub fn constraint_graph(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut graph: BTreeMap<String, BTreeSet<String>> = self
            .variables
            .iter()
            .map(|v| (v.name.clone(), BTreeSet::new()))
            .collect();
        for constraint in &self.constraints {
            for a in constraint.scope() {
                for b in constraint.scope() {
                    if a != b {
                        graph.entry(a.clone()).or_default().insert(b.clone());
                    }
                }
            }
        }
        graph
    }

    /// The part of the problem one agent sees: its own variables, their
    /// neighbors (so owners are known), and every constraint involving one
    /// of its variables.
    pub fn subproblem(&self, agent: &AgentId) -> Problem {
        let owned: BTreeSet<&str> = self.variables_of(agent).map(|v| v.name.as_str()).collect();
        let constraints: Vec<UtilitySpace> = self
            .constraints
            .iter()
            .filter(|c| c.scope().iter().any(|v| owned.contains(v.as_str())))
            .cloned()
            .collect();
        let visible: BTreeSet<&str> = constraints
            .iter()
            .flat_map(|c| c.scope().iter().map(String::as_str))
            .chain(owned.iter().copied())
            .collect();
        Problem {
            optimization: self.optimization,
            variables: self
                .variables
                .iter()
                .filter(|v| visible.contains(v.name.as_str()))
                .cloned()
                .collect(),
            constraints,
        }
    }

    /// Total utility of a complete assignment, or `None` if a variable is
    /// unassigned or assigned outside its domain.
    pub fn evaluate(&self, assignment: &Assignment) -> Option<Utility> {
        self.constraints
            .iter()
            .map(|c| c.utility_for(assignment))
            .sum::<Option<Utility>>()
    }
}

#[cfg(test)]
mod tests;
