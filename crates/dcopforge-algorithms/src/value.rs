//! VALUE propagation.
//!
//! Top-down pass over the pseudotree. A variable waits for its joined UTIL
//! space and, unless it is a root, for its parent's VALUE message carrying
//! the values of its separator. It then picks its optimal value, reports it
//! to the controller and forwards to each child the values of that child's
//! separator.

use std::collections::BTreeMap;
use std::sync::Arc;

use dcopforge_comm::{Message, MessageListener, Outbox, Payload, UtilOutput, ValueMsg, VariableAssignment};
use dcopforge_core::{
    Assignment, ConstraintChecks, DcopError, MessageKind, Optimization, Result, Utility, Value,
};
use tracing::debug;

use crate::local::LocalProblem;

// Separator values received from `sender`.
#[derive(Debug)]
struct Context {
    sender: Option<String>,
    values: Assignment,
}

#[derive(Debug, Default)]
struct ValueState {
    output: Option<UtilOutput>,
    context: Option<Context>,
    value: Option<Value>,
}

/// Picks the optimal value of the output's variable given the values of its
/// separator. Pure: the same inputs always give the same value, ties going
/// to the earliest value of the domain.
pub fn choose(
    output: &UtilOutput,
    context: &Assignment,
    optimization: Optimization,
    checks: &mut ConstraintChecks,
) -> Result<(Value, Utility)> {
    output
        .space
        .argopt(&output.node.variable, context, optimization, checks)
}

/// Runs VALUE propagation for the variables of one agent.
pub struct ValuePropagation {
    local: Arc<LocalProblem>,
    states: BTreeMap<String, ValueState>,
    finished: bool,
}

impl ValuePropagation {
    pub fn new(local: Arc<LocalProblem>) -> Self {
        let states = local
            .owned()
            .iter()
            .map(|var| (var.clone(), ValueState::default()))
            .collect();
        ValuePropagation {
            local,
            states,
            finished: false,
        }
    }

    /// The value chosen for `var`, once decided.
    pub fn value_of(&self, var: &str) -> Option<Value> {
        self.states.get(var).and_then(|s| s.value)
    }

    fn on_output(&mut self, output: &UtilOutput, outbox: &mut Outbox) -> Result<()> {
        let var = output.node.variable.clone();
        self.local.check_owned(&var)?;
        let state = self.state_mut(&var)?;
        if state.output.is_some() {
            return Err(DcopError::ProtocolViolation(format!("duplicate UTIL output for '{var}'")));
        }
        if let Some(context) = &state.context {
            if context.sender != output.node.parent {
                return Err(DcopError::Inconsistent(format!(
                    "VALUE for '{var}' came from {:?}, but its parent is {:?}",
                    context.sender, output.node.parent
                )));
            }
        } else if output.node.is_root() {
            state.context = Some(Context {
                sender: None,
                values: Assignment::new(),
            });
        }
        state.output = Some(output.clone());
        self.try_decide(&var, outbox)
    }

    fn on_value(&mut self, msg: &ValueMsg, outbox: &mut Outbox) -> Result<()> {
        self.local.check_owned(&msg.dest)?;
        let state = self.state_mut(&msg.dest)?;
        if state.context.is_some() {
            return Err(DcopError::ProtocolViolation(format!(
                "duplicate VALUE for '{}' from '{}'",
                msg.dest, msg.sender
            )));
        }
        if let Some(output) = &state.output {
            if output.node.parent.as_deref() != Some(msg.sender.as_str()) {
                return Err(DcopError::ProtocolViolation(format!(
                    "VALUE for '{}' from '{}', which is not its parent",
                    msg.dest, msg.sender
                )));
            }
        }
        state.context = Some(Context {
            sender: Some(msg.sender.clone()),
            values: msg.context.clone(),
        });
        self.try_decide(&msg.dest, outbox)
    }

    fn try_decide(&mut self, var: &str, outbox: &mut Outbox) -> Result<()> {
        let optimization = self.local.optimization();
        let state = self.state_mut(var)?;
        if state.value.is_some() {
            return Ok(());
        }
        let (Some(output), Some(context)) = (&state.output, &state.context) else {
            return Ok(());
        };
        let (value, utility) = choose(output, &context.values, optimization, outbox.checks_mut())?;
        let mut full = context.values.clone();
        full.insert(var.to_string(), value);
        let node = output.node.clone();
        state.value = Some(value);
        debug!(
            agent = %self.local.agent(),
            variable = var,
            value,
            utility = %utility,
            "value chosen"
        );

        for child in &node.children {
            let separator = node.child_separators.get(child).ok_or_else(|| {
                DcopError::Inconsistent(format!("no separator recorded for child '{child}' of '{var}'"))
            })?;
            let mut child_context = Assignment::new();
            for sep_var in separator {
                let sep_value = full.get(sep_var).ok_or_else(|| {
                    DcopError::Inconsistent(format!(
                        "'{var}' has no value for '{sep_var}' in the separator of '{child}'"
                    ))
                })?;
                child_context.insert(sep_var.clone(), *sep_value);
            }
            let owner = self.local.owner_of(child)?;
            let msg = ValueMsg {
                dest: child.clone(),
                sender: var.to_string(),
                context: child_context,
            };
            outbox.send(&owner, Message::new(Payload::Value(msg)))?;
        }

        outbox.send_to_controller(Message::new(Payload::Assignments(vec![VariableAssignment {
            variable: var.to_string(),
            value,
        }])))?;

        if !self.finished && self.states.values().all(|s| s.value.is_some()) {
            self.finished = true;
            debug!(agent = %self.local.agent(), "all variables decided");
            outbox.send_to_self(Message::new(Payload::AgentFinished))?;
        }
        Ok(())
    }

    fn state_mut(&mut self, var: &str) -> Result<&mut ValueState> {
        self.states
            .get_mut(var)
            .ok_or_else(|| DcopError::ProtocolViolation(format!("no VALUE state for '{var}'")))
    }
}

impl MessageListener for ValuePropagation {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![MessageKind::UtilOutput, MessageKind::Value]
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::UtilOutput(output) => self.on_output(output, outbox),
            Payload::Value(value) => self.on_value(value, outbox),
            _ => Err(msg.unexpected(MessageKind::Value)),
        }
    }
}
