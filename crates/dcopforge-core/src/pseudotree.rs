//! Pseudotree nodes and whole pseudotrees.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DcopError, Result};
use crate::problem::Problem;

/// One variable's position in a pseudotree.
///
/// Built once per run by the DFS token pass and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudotreeNode {
    pub variable: String,
    pub parent: Option<String>,
    /// Constraint neighbors above this node that are not its parent.
    pub pseudo_parents: BTreeSet<String>,
    /// Tree children in visiting order.
    pub children: Vec<String>,
    /// Constraint neighbors below this node that are not its children.
    pub pseudo_children: BTreeSet<String>,
    /// Ancestors the subtree rooted here shares constraints with.
    pub separator: BTreeSet<String>,
    pub child_separators: BTreeMap<String, BTreeSet<String>>,
}

impl PseudotreeNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Parent and pseudo-parents.
    pub fn ancestor_neighbors(&self) -> impl Iterator<Item = &String> {
        self.parent.iter().chain(self.pseudo_parents.iter())
    }
}

/// The pseudotree (forest, one tree per connected component) of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pseudotree {
    nodes: BTreeMap<String, PseudotreeNode>,
}

impl Pseudotree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, returning the previous node for the same variable.
    pub fn insert(&mut self, node: PseudotreeNode) -> Option<PseudotreeNode> {
        self.nodes.insert(node.variable.clone(), node)
    }

    pub fn node(&self, variable: &str) -> Option<&PseudotreeNode> {
        self.nodes.get(variable)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PseudotreeNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.is_root())
            .map(|n| n.variable.as_str())
            .collect()
    }

    pub fn tree_edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.children.len()).sum()
    }

    /// Induced width: the largest separator.
    pub fn width(&self) -> Option<usize> {
        self.nodes.values().map(|n| n.separator.len()).max()
    }

    /// Checks that this pseudotree is a valid pseudotree for `problem`:
    /// every variable appears once, parent and child links agree, and every
    /// constraint edge links a node to one of its ancestors.
    pub fn validate(&self, problem: &Problem) -> Result<()> {
        for var in &problem.variables {
            if !self.nodes.contains_key(&var.name) {
                return Err(DcopError::Inconsistent(format!(
                    "variable '{}' missing from the pseudotree",
                    var.name
                )));
            }
        }
        if self.nodes.len() != problem.variables.len() {
            return Err(DcopError::Inconsistent(
                "pseudotree has nodes for unknown variables".to_string(),
            ));
        }
        for node in self.nodes.values() {
            for child in &node.children {
                let linked = self
                    .nodes
                    .get(child)
                    .and_then(|c| c.parent.as_deref())
                    .is_some_and(|p| p == node.variable);
                if !linked {
                    return Err(DcopError::Inconsistent(format!(
                        "child '{child}' of '{}' does not point back to it",
                        node.variable
                    )));
                }
            }
        }
        for (var, neighbors) in problem.constraint_graph() {
            let ancestors = self.ancestors(&var);
            for neighbor in neighbors {
                if !ancestors.contains(&neighbor) && !self.ancestors(&neighbor).contains(&var) {
                    return Err(DcopError::Inconsistent(format!(
                        "constraint edge {var} - {neighbor} crosses branches"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Tree ancestors of `variable`, nearest first.
    pub fn ancestors(&self, variable: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut current = self.nodes.get(variable).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            if ancestors.contains(&parent) {
                break;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            ancestors.push(parent);
        }
        ancestors
    }
}
