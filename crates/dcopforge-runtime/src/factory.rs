//! Builds agents from their specs.

use std::sync::Arc;

use dcopforge_algorithms::{
    LocalProblem, PseudotreeBuilder, UtilPropagation, ValuePropagation, VariableElection,
};
use dcopforge_comm::{AgentSpec, Queue, QueueOptions};
use dcopforge_config::{AgentConfig, MessageTable, ModuleConfig};
use dcopforge_core::Result;
use tracing::debug;

use crate::agent::Agent;
use crate::lifecycle::AgentLifecycle;

/// Assembles agents according to an [`AgentConfig`].
///
/// Every agent gets an [`AgentLifecycle`] first, then the configured
/// modules in order.
#[derive(Debug, Clone)]
pub struct AgentFactory {
    config: AgentConfig,
    table: Arc<MessageTable>,
}

impl AgentFactory {
    /// Creates a factory after validating `config`.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let table = Arc::new(config.message_table()?);
        Ok(AgentFactory { config, table })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The wire table shared by every TCP pipe of the run.
    pub fn table(&self) -> Arc<MessageTable> {
        Arc::clone(&self.table)
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            measure_messages: self.config.measure_messages,
            simulated_costs: self
                .config
                .measure_time
                .then(|| self.config.message_costs.clone()),
            table: Some(self.table()),
        }
    }

    /// Builds the agent for `spec`. Pipes are wired by the caller.
    pub fn build(&self, spec: &AgentSpec) -> Agent {
        let local = Arc::new(LocalProblem::from_spec(spec));
        let mut queue = Queue::new(spec.agent.clone(), self.queue_options());
        queue.register_listener(Box::new(AgentLifecycle::new(spec.agent.clone())));
        for module in &self.config.modules {
            let local = Arc::clone(&local);
            match module {
                ModuleConfig::Election => {
                    queue.register_listener(Box::new(VariableElection::new(local)))
                }
                ModuleConfig::Pseudotree => {
                    queue.register_listener(Box::new(PseudotreeBuilder::new(local)))
                }
                ModuleConfig::UtilPropagation => queue.register_listener(Box::new(
                    UtilPropagation::new(local, self.config.util_mode),
                )),
                ModuleConfig::ValuePropagation => {
                    queue.register_listener(Box::new(ValuePropagation::new(local)))
                }
            }
        }
        debug!(
            agent = %spec.agent,
            variables = local.owned().len(),
            modules = self.config.modules.len(),
            "agent built"
        );
        Agent::new(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcopforge_config::TransportKind;
    use dcopforge_core::DcopError;
    use dcopforge_test::path_problem;

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = AgentConfig {
            measure_time: true,
            transport: TransportKind::Tcp,
            ..AgentConfig::default()
        };
        assert!(matches!(AgentFactory::new(config), Err(DcopError::Configuration(_))));
    }

    #[test]
    fn test_simulated_time_enables_the_clock() {
        let config = AgentConfig {
            measure_time: true,
            ..AgentConfig::default()
        };
        let factory = AgentFactory::new(config).unwrap();
        assert!(factory.queue_options().simulated_costs.is_some());
        assert!(AgentFactory::new(AgentConfig::default())
            .unwrap()
            .queue_options()
            .simulated_costs
            .is_none());
    }

    #[test]
    fn test_build_agent_for_spec() {
        let factory = AgentFactory::new(AgentConfig::default()).unwrap();
        let specs = AgentSpec::for_problem(&path_problem());
        let agent = factory.build(&specs[0]);
        assert_eq!(agent.id(), &specs[0].agent);
    }
}
