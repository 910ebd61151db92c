//! Root election.
//!
//! Every variable floods the smallest variable name it has heard of to its
//! neighbors, in synchronous rounds. After `N - 1` rounds, where `N` is the
//! number of variables in the whole problem, every variable knows the
//! minimum of its connected component; that variable becomes the root of
//! the component's pseudotree. Early messages for later rounds are buffered.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dcopforge_comm::{ElectionMsg, ElectionOutcome, Message, MessageListener, Outbox, Payload};
use dcopforge_core::{DcopError, MessageKind, Result};
use tracing::debug;

use crate::local::LocalProblem;

#[derive(Debug)]
struct ElectionState {
    neighbors: BTreeSet<String>,
    round: usize,
    best: String,
    // round -> sender -> candidate
    inbox: BTreeMap<usize, BTreeMap<String, String>>,
    decided: bool,
}

/// Elects one root variable per connected component.
pub struct VariableElection {
    local: Arc<LocalProblem>,
    rounds: usize,
    started: bool,
    states: BTreeMap<String, ElectionState>,
}

impl VariableElection {
    pub fn new(local: Arc<LocalProblem>) -> Self {
        let rounds = local.total_variables().saturating_sub(1).max(1);
        let states = local
            .owned()
            .iter()
            .map(|var| {
                let state = ElectionState {
                    neighbors: local.neighbors(var),
                    round: 0,
                    best: var.clone(),
                    inbox: BTreeMap::new(),
                    decided: false,
                };
                (var.clone(), state)
            })
            .collect();
        VariableElection {
            local,
            rounds,
            started: false,
            states,
        }
    }

    fn start(&mut self, outbox: &mut Outbox) -> Result<()> {
        if self.started {
            return Err(DcopError::ProtocolViolation("election already started".to_string()));
        }
        self.started = true;
        let vars: Vec<String> = self.states.keys().cloned().collect();
        for var in vars {
            if self.states[&var].neighbors.is_empty() {
                self.decide(&var, outbox)?;
            } else {
                self.broadcast(&var, outbox)?;
                self.advance(&var, outbox)?;
            }
        }
        Ok(())
    }

    fn receive(&mut self, msg: &ElectionMsg, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&msg.dest)?;
        let rounds = self.rounds;
        let state = self.state_mut(&msg.dest)?;
        if !state.neighbors.contains(&msg.sender) {
            return Err(DcopError::ProtocolViolation(format!(
                "election message for '{}' from non-neighbor '{}'",
                msg.dest, msg.sender
            )));
        }
        if msg.round >= rounds || msg.round < state.round {
            return Err(DcopError::ProtocolViolation(format!(
                "election round {} out of range for '{}'",
                msg.round, msg.dest
            )));
        }
        let round = state.inbox.entry(msg.round).or_default();
        if round.insert(msg.sender.clone(), msg.candidate.clone()).is_some() {
            return Err(DcopError::ProtocolViolation(format!(
                "duplicate election message from '{}' in round {}",
                msg.sender, msg.round
            )));
        }
        if self.started {
            self.advance(&msg.dest, outbox)?;
        }
        Ok(())
    }

    // Completes every round for which all neighbors have spoken.
    fn advance(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        loop {
            let rounds = self.rounds;
            let state = self.state_mut(var)?;
            if state.decided {
                return Ok(());
            }
            let complete = state
                .inbox
                .get(&state.round)
                .is_some_and(|received| received.len() == state.neighbors.len());
            if !complete {
                return Ok(());
            }
            if let Some(received) = state.inbox.remove(&state.round) {
                if let Some(min) = received.into_values().min() {
                    if min < state.best {
                        state.best = min;
                    }
                }
            }
            state.round += 1;
            if state.round == rounds {
                return self.decide(var, outbox);
            }
            self.broadcast(var, outbox)?;
        }
    }

    fn broadcast(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        let state = self.state_mut(var)?;
        let (round, best) = (state.round, state.best.clone());
        let neighbors: Vec<String> = state.neighbors.iter().cloned().collect();
        for neighbor in neighbors {
            let owner = self.local.owner_of(&neighbor)?;
            let msg = Message::new(Payload::Election(ElectionMsg {
                dest: neighbor,
                sender: var.to_string(),
                round,
                candidate: best.clone(),
            }));
            outbox.send(&owner, msg)?;
        }
        Ok(())
    }

    fn decide(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        let state = self.state_mut(var)?;
        state.decided = true;
        let root = state.best.clone();
        debug!(agent = %self.local.agent(), variable = var, root = %root, "root elected");
        outbox.send_to_self(Message::new(Payload::ElectionOutput(ElectionOutcome {
            variable: var.to_string(),
            root,
        })))
    }

    fn state_mut(&mut self, var: &str) -> Result<&mut ElectionState> {
        self.states
            .get_mut(var)
            .ok_or_else(|| DcopError::ProtocolViolation(format!("no election state for '{var}'")))
    }
}

impl MessageListener for VariableElection {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::Start, MessageKind::Election]
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::Start => self.start(outbox),
            Payload::Election(election) => self.receive(election, outbox),
            _ => Err(msg.unexpected(MessageKind::Election)),
        }
    }
}
