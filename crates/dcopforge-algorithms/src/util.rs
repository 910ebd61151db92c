//! UTIL propagation.
//!
//! Bottom-up dynamic programming over the pseudotree. Once a variable knows
//! its pseudotree node and has a UTIL space from every tree child, it joins
//! those spaces with the local constraints it is responsible for, hands the
//! joined space to VALUE propagation, and projects itself out. The result,
//! a space over the separator, goes to the parent; a root reports the
//! optimum to the controller instead.
//!
//! A constraint is handled by the lowest variable of its scope: `v` takes a
//! constraint when every other variable of its scope is `v`'s parent or a
//! pseudo-parent.
//!
//! In pull mode children only announce their space (`UTIL_HEADER`) and
//! parents fetch the entries with `ASK` requests chosen by an
//! [`AskPolicy`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dcopforge_comm::{
    AskMsg, Message, MessageListener, OptimalUtility, Outbox, Payload, UtilEntries, UtilHeader,
    UtilMsg, UtilOutput,
};
use dcopforge_config::UtilMode;
use dcopforge_core::{
    ConstraintChecks, DcopError, MessageKind, PseudotreeNode, Result, Utility, UtilitySpace,
};
use tracing::{debug, info};

use crate::ask::{AskPolicy, PulledSpace};
use crate::local::LocalProblem;

// A projected space waiting for the parent's ASK requests.
#[derive(Debug)]
struct Outgoing {
    space: UtilitySpace,
    served: usize,
}

#[derive(Debug, Default)]
struct UtilState {
    node: Option<PseudotreeNode>,
    received: BTreeMap<String, UtilitySpace>,
    pulling: BTreeMap<String, PulledSpace>,
    outgoing: Option<Outgoing>,
    done: bool,
}

/// Runs UTIL propagation for the variables of one agent.
pub struct UtilPropagation {
    local: Arc<LocalProblem>,
    mode: UtilMode,
    states: BTreeMap<String, UtilState>,
}

impl UtilPropagation {
    pub fn new(local: Arc<LocalProblem>, mode: UtilMode) -> Self {
        let states = local
            .owned()
            .iter()
            .map(|var| (var.clone(), UtilState::default()))
            .collect();
        UtilPropagation { local, mode, states }
    }

    fn on_node(&mut self, node: &PseudotreeNode, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&node.variable)?;
        let state = self.state_mut(&node.variable)?;
        if state.node.is_some() {
            return Err(DcopError::ProtocolViolation(format!(
                "duplicate pseudotree node for '{}'",
                node.variable
            )));
        }
        let strangers: Vec<&String> = state
            .received
            .keys()
            .chain(state.pulling.keys())
            .filter(|sender| !node.children.contains(*sender))
            .collect();
        if !strangers.is_empty() {
            return Err(DcopError::Inconsistent(format!(
                "UTIL for '{}' from {strangers:?}, which are not its children",
                node.variable
            )));
        }
        state.node = Some(node.clone());
        self.try_complete(&node.variable, outbox)
    }

    fn on_util(&mut self, msg: &UtilMsg, outbox: &mut Outbox) -> Result<()> {
        self.accept_sender(&msg.dest, &msg.sender)?;
        let state = self.state_mut(&msg.dest)?;
        if state.received.contains_key(&msg.sender) || state.pulling.contains_key(&msg.sender) {
            return Err(DcopError::ProtocolViolation(format!(
                "duplicate UTIL from '{}' to '{}'",
                msg.sender, msg.dest
            )));
        }
        state.received.insert(msg.sender.clone(), msg.space.clone());
        self.try_complete(&msg.dest, outbox)
    }

    fn on_header(&mut self, header: &UtilHeader, outbox: &mut Outbox) -> Result<()> {
        self.accept_sender(&header.dest, &header.sender)?;
        let policy = self.ask_policy()?;
        let state = self.state_mut(&header.dest)?;
        if state.received.contains_key(&header.sender) || state.pulling.contains_key(&header.sender) {
            return Err(DcopError::ProtocolViolation(format!(
                "duplicate UTIL header from '{}' to '{}'",
                header.sender, header.dest
            )));
        }
        let mut pulled = PulledSpace::new(header.clone());
        match pulled.next_request(&policy) {
            Some(range) => {
                state.pulling.insert(header.sender.clone(), pulled);
                self.ask(&header.dest, &header.sender, range, outbox)
            }
            None => {
                state.received.insert(header.sender.clone(), pulled.into_space()?);
                self.try_complete(&header.dest, outbox)
            }
        }
    }

    fn on_entries(&mut self, entries: &UtilEntries, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&entries.dest)?;
        let policy = self.ask_policy()?;
        let state = self.state_mut(&entries.dest)?;
        let pulled = state.pulling.get_mut(&entries.sender).ok_or_else(|| {
            DcopError::ProtocolViolation(format!(
                "UTIL entries from '{}' to '{}' without a header",
                entries.sender, entries.dest
            ))
        })?;
        pulled.accept(entries)?;
        if let Some(range) = pulled.next_request(&policy) {
            return self.ask(&entries.dest, &entries.sender, range, outbox);
        }
        if let Some(pulled) = state.pulling.remove(&entries.sender) {
            state.received.insert(entries.sender.clone(), pulled.into_space()?);
        }
        self.try_complete(&entries.dest, outbox)
    }

    fn on_ask(&mut self, ask: &AskMsg, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&ask.dest)?;
        let state = self.state_mut(&ask.dest)?;
        let parent = state.node.as_ref().and_then(|n| n.parent.clone());
        if parent.as_deref() != Some(ask.sender.as_str()) {
            return Err(DcopError::ProtocolViolation(format!(
                "ASK for '{}' from '{}', which is not its parent",
                ask.dest, ask.sender
            )));
        }
        let outgoing = state.outgoing.as_mut().ok_or_else(|| {
            DcopError::ProtocolViolation(format!("ASK for '{}' with nothing to serve", ask.dest))
        })?;
        let end = ask.offset.saturating_add(ask.count);
        let utilities = outgoing
            .space
            .utilities()
            .get(ask.offset..end)
            .ok_or_else(|| {
                DcopError::ProtocolViolation(format!(
                    "ASK for entries {}..{end} of '{}' out of range",
                    ask.offset, ask.dest
                ))
            })?
            .to_vec();
        outgoing.served += utilities.len();
        if outgoing.served >= outgoing.space.size() {
            state.outgoing = None;
            debug!(agent = %self.local.agent(), variable = %ask.dest, "UTIL space fully served");
        }
        let owner = self.local.owner_of(&ask.sender)?;
        let reply = UtilEntries {
            dest: ask.sender.clone(),
            sender: ask.dest.clone(),
            offset: ask.offset,
            utilities,
        };
        outbox.send(&owner, Message::new(Payload::UtilEntries(reply)))
    }

    fn ask(
        &self,
        var: &str,
        child: &str,
        range: std::ops::Range<usize>,
        outbox: &mut Outbox,
    ) -> Result<()> {
        let owner = self.local.owner_of(child)?;
        let ask = AskMsg {
            dest: child.to_string(),
            sender: var.to_string(),
            offset: range.start,
            count: range.len(),
        };
        outbox.send(&owner, Message::new(Payload::Ask(ask)))
    }

    // UTIL may arrive before the node is known; the sender is then checked
    // when the node arrives.
    fn accept_sender(&mut self, var: &str, sender: &str) -> Result<()> {
        self.local.check_owned(var)?;
        let state = self.state_mut(var)?;
        if state.done {
            return Err(DcopError::ProtocolViolation(format!(
                "UTIL from '{sender}' after '{var}' completed"
            )));
        }
        match &state.node {
            Some(node) if !node.children.iter().any(|c| c == sender) => {
                Err(DcopError::ProtocolViolation(format!(
                    "UTIL for '{var}' from '{sender}', which is not a child"
                )))
            }
            _ => Ok(()),
        }
    }

    fn ask_policy(&self) -> Result<AskPolicy> {
        match self.mode {
            UtilMode::Pull { policy } => Ok(AskPolicy::from_config(policy)),
            UtilMode::Eager => Err(DcopError::ProtocolViolation(
                "pull-mode message received in eager mode".to_string(),
            )),
        }
    }

    fn try_complete(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        let optimization = self.local.optimization();
        let state = self.state_mut(var)?;
        let Some(node) = state.node.clone() else {
            return Ok(());
        };
        if state.done || !node.children.iter().all(|c| state.received.contains_key(c)) {
            return Ok(());
        }
        state.done = true;
        let children: Vec<UtilitySpace> = std::mem::take(&mut state.received).into_values().collect();

        let joined = join_local(&self.local, &node, &children, outbox.checks_mut())?;
        let projected = joined.project(var, optimization, outbox.checks_mut())?;
        outbox.send_to_self(Message::new(Payload::UtilOutput(Box::new(UtilOutput {
            node: node.clone(),
            space: joined,
        }))))?;

        let Some(parent) = node.parent.clone() else {
            let utility = projected.scalar_value().ok_or_else(|| {
                DcopError::Inconsistent(format!(
                    "root '{var}' projected to a non-scalar space over {:?}",
                    projected.scope()
                ))
            })?;
            info!(
                event = "optimal_utility",
                agent = %self.local.agent(),
                root = var,
                utility = %utility,
                "root reached its optimum"
            );
            return outbox.send_to_controller(Message::new(Payload::OptimalUtility(OptimalUtility {
                root: var.to_string(),
                utility,
            })));
        };

        let scope: BTreeSet<&String> = projected.scope().iter().collect();
        let separator: BTreeSet<&String> = node.separator.iter().collect();
        if !scope.is_subset(&separator) {
            return Err(DcopError::Inconsistent(format!(
                "UTIL space of '{var}' over {scope:?} exceeds its separator {separator:?}"
            )));
        }
        debug!(
            agent = %self.local.agent(),
            variable = var,
            parent = %parent,
            entries = projected.size(),
            "sending UTIL"
        );
        let owner = self.local.owner_of(&parent)?;
        match self.mode {
            UtilMode::Eager => {
                let msg = UtilMsg {
                    dest: parent,
                    sender: var.to_string(),
                    space: projected,
                };
                outbox.send(&owner, Message::new(Payload::Util(msg)))
            }
            UtilMode::Pull { .. } => {
                let header = UtilHeader {
                    dest: parent,
                    sender: var.to_string(),
                    scope: projected.scope().to_vec(),
                    domains: projected.domains().to_vec(),
                    size: projected.size(),
                };
                let state = self.state_mut(var)?;
                state.outgoing = Some(Outgoing {
                    space: projected,
                    served: 0,
                });
                outbox.send(&owner, Message::new(Payload::UtilHeader(header)))
            }
        }
    }

    fn state_mut(&mut self, var: &str) -> Result<&mut UtilState> {
        self.states
            .get_mut(var)
            .ok_or_else(|| DcopError::ProtocolViolation(format!("no UTIL state for '{var}'")))
    }
}

/// Joins a variable's own constraints with its children's UTIL spaces.
///
/// The result always contains `node.variable`, so it can be projected even
/// when the variable has no constraint at all.
pub fn join_local(
    local: &LocalProblem,
    node: &PseudotreeNode,
    children: &[UtilitySpace],
    checks: &mut ConstraintChecks,
) -> Result<UtilitySpace> {
    let var = node.variable.as_str();
    let domain = local.domain_of(var)?.to_vec();
    let mut joined = UtilitySpace::constant(vec![var.to_string()], vec![domain], Utility::ZERO)?;
    for constraint in local.constraints_of(var) {
        let handled_here = constraint
            .scope()
            .iter()
            .filter(|v| v.as_str() != var)
            .all(|v| node.parent.as_ref() == Some(v) || node.pseudo_parents.contains(v));
        if handled_here {
            joined = joined.join(constraint, checks)?;
        }
    }
    for space in children {
        joined = joined.join(space, checks)?;
    }
    Ok(joined)
}

impl MessageListener for UtilPropagation {
    fn message_kinds(&self) -> Vec<MessageKind> {
        let mut kinds = vec![MessageKind::DfsOutput, MessageKind::Util];
        if matches!(self.mode, UtilMode::Pull { .. }) {
            kinds.extend([MessageKind::UtilHeader, MessageKind::Ask, MessageKind::UtilEntries]);
        }
        kinds
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::DfsOutput(node) => self.on_node(node, outbox),
            Payload::Util(util) => self.on_util(util, outbox),
            Payload::UtilHeader(header) => self.on_header(header, outbox),
            Payload::UtilEntries(entries) => self.on_entries(entries, outbox),
            Payload::Ask(ask) => self.on_ask(ask, outbox),
            _ => Err(msg.unexpected(MessageKind::Util)),
        }
    }
}
