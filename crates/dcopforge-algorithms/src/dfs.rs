//! Pseudotree construction by DFS token passing.
//!
//! The elected root of each component starts a depth-first traversal. The
//! variable holding the token hands it to its first unvisited neighbor
//! (smallest name first), which becomes its tree child; when no unvisited
//! neighbor remains, the token goes back to the parent together with the
//! visited set and the subtree's separator. Neighbors found on the token's
//! path become pseudo-parents; the remaining non-tree neighbors are
//! pseudo-children.
//!
//! A finished node is sent to the agent itself (`DFS_OUTPUT`) and to the
//! controller.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dcopforge_comm::{DfsBacktrack, DfsToken, ElectionOutcome, Message, MessageListener, Outbox, Payload};
use dcopforge_core::{DcopError, MessageKind, PseudotreeNode, Result};
use tracing::debug;

use crate::local::LocalProblem;

#[derive(Debug, Default)]
struct DfsState {
    reached: bool,
    parent: Option<String>,
    stack: Vec<String>,
    visited: BTreeSet<String>,
    children: Vec<String>,
    open_child: Option<String>,
    child_separators: BTreeMap<String, BTreeSet<String>>,
    done: bool,
}

/// Builds this agent's part of the pseudotree.
pub struct PseudotreeBuilder {
    local: Arc<LocalProblem>,
    states: BTreeMap<String, DfsState>,
}

impl PseudotreeBuilder {
    pub fn new(local: Arc<LocalProblem>) -> Self {
        let states = local
            .owned()
            .iter()
            .map(|var| (var.clone(), DfsState::default()))
            .collect();
        PseudotreeBuilder { local, states }
    }

    fn on_elected(&mut self, outcome: &ElectionOutcome, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&outcome.variable)?;
        if !outcome.is_root() {
            return Ok(());
        }
        let var = outcome.variable.clone();
        let state = self.state_mut(&var)?;
        if state.reached {
            return Err(DcopError::ProtocolViolation(format!("'{var}' already in the tree")));
        }
        state.reached = true;
        state.visited.insert(var.clone());
        debug!(agent = %self.local.agent(), variable = %var, "starting DFS as root");
        self.explore(&var, outbox)
    }

    fn on_token(&mut self, token: &DfsToken, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&token.dest)?;
        let state = self.state_mut(&token.dest)?;
        if state.reached {
            return Err(DcopError::ProtocolViolation(format!(
                "DFS token for '{}' which is already in the tree",
                token.dest
            )));
        }
        state.reached = true;
        state.parent = Some(token.sender.clone());
        state.stack = token.stack.clone();
        state.visited = token.visited.clone();
        state.visited.insert(token.dest.clone());
        self.explore(&token.dest, outbox)
    }

    fn on_backtrack(&mut self, msg: &DfsBacktrack, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&msg.dest)?;
        let state = self.state_mut(&msg.dest)?;
        if state.open_child.as_deref() != Some(msg.sender.as_str()) {
            return Err(DcopError::ProtocolViolation(format!(
                "unexpected backtrack from '{}' to '{}'",
                msg.sender, msg.dest
            )));
        }
        state.open_child = None;
        state.visited.extend(msg.visited.iter().cloned());
        state
            .child_separators
            .insert(msg.sender.clone(), msg.separator.clone());
        self.explore(&msg.dest, outbox)
    }

    // Hands the token to the next unvisited neighbor, or finishes `var`.
    fn explore(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        let neighbors = self.local.neighbors(var);
        let state = self.state_mut(var)?;
        let next = neighbors.iter().find(|n| !state.visited.contains(*n)).cloned();
        match next {
            Some(child) => {
                state.children.push(child.clone());
                state.open_child = Some(child.clone());
                let mut stack = state.stack.clone();
                stack.push(var.to_string());
                let token = DfsToken {
                    dest: child.clone(),
                    sender: var.to_string(),
                    stack,
                    visited: state.visited.clone(),
                };
                let owner = self.local.owner_of(&child)?;
                outbox.send(&owner, Message::new(Payload::DfsChild(token)))
            }
            None => self.finish(var, &neighbors, outbox),
        }
    }

    fn finish(&mut self, var: &str, neighbors: &BTreeSet<String>, outbox: &mut Outbox) -> Result<()> {
        let state = self.state_mut(var)?;
        state.done = true;

        let pseudo_parents: BTreeSet<String> = neighbors
            .iter()
            .filter(|n| state.stack.contains(*n) && state.parent.as_ref() != Some(*n))
            .cloned()
            .collect();
        let mut separator: BTreeSet<String> = state
            .parent
            .iter()
            .chain(pseudo_parents.iter())
            .chain(state.child_separators.values().flatten())
            .cloned()
            .collect();
        separator.remove(var);
        let pseudo_children: BTreeSet<String> = neighbors
            .iter()
            .filter(|n| {
                !state.children.contains(*n)
                    && state.parent.as_ref() != Some(*n)
                    && !pseudo_parents.contains(*n)
            })
            .cloned()
            .collect();

        let node = PseudotreeNode {
            variable: var.to_string(),
            parent: state.parent.clone(),
            pseudo_parents,
            children: state.children.clone(),
            pseudo_children,
            separator: separator.clone(),
            child_separators: state.child_separators.clone(),
        };
        let parent = state.parent.clone();
        let visited = state.visited.clone();
        debug!(
            agent = %self.local.agent(),
            variable = var,
            parent = ?node.parent,
            children = node.children.len(),
            separator = node.separator.len(),
            "pseudotree node finished"
        );

        outbox.send_to_self(Message::new(Payload::DfsOutput(Box::new(node.clone()))))?;
        outbox.send_to_controller(Message::new(Payload::DfsOutput(Box::new(node))))?;

        if let Some(parent) = parent {
            let owner = self.local.owner_of(&parent)?;
            let msg = DfsBacktrack {
                dest: parent,
                sender: var.to_string(),
                visited,
                separator,
            };
            outbox.send(&owner, Message::new(Payload::DfsBacktrack(msg)))?;
        }
        Ok(())
    }

    fn state_mut(&mut self, var: &str) -> Result<&mut DfsState> {
        self.states
            .get_mut(var)
            .ok_or_else(|| DcopError::ProtocolViolation(format!("no DFS state for '{var}'")))
    }
}

impl MessageListener for PseudotreeBuilder {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![
            MessageKind::ElectionOutput,
            MessageKind::DfsChild,
            MessageKind::DfsBacktrack,
        ]
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::ElectionOutput(outcome) => self.on_elected(outcome, outbox),
            Payload::DfsChild(token) => self.on_token(token, outbox),
            Payload::DfsBacktrack(backtrack) => self.on_backtrack(backtrack, outbox),
            _ => Err(msg.unexpected(MessageKind::DfsChild)),
        }
    }
}
