//! Turns `AGENT_CONFIGURATION` into running agents.
//!
//! A [`Constructor`] sits on a host queue, the controller's in local mode or
//! a daemon's in distributed mode. It builds agents with the
//! [`AgentFactory`], wires their pipes, starts their threads and answers
//! `AGENTS_READY`. `CLEAR` stops and joins every agent it built.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crossbeam::channel::Sender;
use dcopforge_comm::{
    AgentAddress, AgentSpec, ChannelPipe, ConfigurationPayload, Message, MessageListener, Outbox,
    Payload, TcpInbox,
};
use dcopforge_config::AgentConfig;
use dcopforge_core::{AgentId, DcopError, MessageKind, Result};
use tracing::{debug, info};

use crate::agent::{Agent, AgentHandle};
use crate::factory::AgentFactory;

/// How built agents reach each other and the controller.
#[derive(Debug, Clone)]
pub enum Wiring {
    /// Channels inside the controller's process.
    InProcess { controller: Sender<Message> },
    /// One TCP inbox per agent, bound on `host`; peers are learned from
    /// `PEER_DIRECTORY`.
    Tcp { host: IpAddr },
}

pub struct Constructor {
    wiring: Wiring,
    factory: Option<AgentFactory>,
    controller: Option<SocketAddr>,
    agents: Vec<AgentHandle>,
    inboxes: Vec<TcpInbox>,
}

impl Constructor {
    /// A constructor for agents living next to the controller.
    pub fn in_process(factory: AgentFactory, controller: Sender<Message>) -> Self {
        Constructor {
            wiring: Wiring::InProcess { controller },
            factory: Some(factory),
            controller: None,
            agents: Vec::new(),
            inboxes: Vec::new(),
        }
    }

    /// A constructor for TCP agents. Daemons start without a factory and
    /// receive their configuration in a `CONFIGURATION` message.
    pub fn tcp(host: IpAddr, factory: Option<AgentFactory>, controller: Option<SocketAddr>) -> Self {
        Constructor {
            wiring: Wiring::Tcp { host },
            factory,
            controller,
            agents: Vec::new(),
            inboxes: Vec::new(),
        }
    }

    /// Number of agents currently running.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn configure(&mut self, payload: &ConfigurationPayload, outbox: &mut Outbox) -> Result<()> {
        if !self.agents.is_empty() {
            self.clear();
        }
        let config = AgentConfig::from_toml_str(&payload.agent_config)?;
        let factory = AgentFactory::new(config)?;
        let router = outbox.router_mut();
        router.set_table(factory.table());
        // A pipe left over from a previous controller would shadow the new address.
        router.remove(&AgentId::controller());
        router.extend_directory(&[AgentAddress {
            agent: AgentId::controller(),
            address: payload.controller,
        }]);
        info!(agent = %outbox.id(), controller = %payload.controller, "configured");
        self.factory = Some(factory);
        self.controller = Some(payload.controller);
        Ok(())
    }

    fn construct(&mut self, specs: &[AgentSpec], outbox: &mut Outbox) -> Result<()> {
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| DcopError::InvalidState("agent configuration before CONFIGURATION".to_string()))?;
        let agents: Vec<Agent> = specs.iter().map(|spec| factory.build(spec)).collect();

        let addresses = match &self.wiring {
            Wiring::InProcess { controller } => {
                wire_in_process(agents, specs, controller, outbox, &mut self.agents)?;
                Vec::new()
            }
            Wiring::Tcp { host } => {
                let controller = self.controller.ok_or_else(|| {
                    DcopError::Configuration("no controller address for tcp agents".to_string())
                })?;
                let table = factory.table();
                let mut addresses = Vec::with_capacity(agents.len());
                for mut agent in agents {
                    let inbox = TcpInbox::bind((*host, 0), agent.id().clone(), agent.inbox(), table.clone())?;
                    agent
                        .queue_mut()
                        .outbox_mut()
                        .router_mut()
                        .extend_directory(&[AgentAddress {
                            agent: AgentId::controller(),
                            address: controller,
                        }]);
                    addresses.push(AgentAddress {
                        agent: agent.id().clone(),
                        address: inbox.local_addr(),
                    });
                    self.inboxes.push(inbox);
                    self.agents.push(agent.spawn()?);
                }
                addresses
            }
        };
        info!(agent = %outbox.id(), agents = specs.len(), "agents constructed");
        outbox.send_to_controller(Message::new(Payload::AgentsReady(addresses)))
    }

    /// Stops and joins every agent, then closes their inboxes.
    pub fn clear(&mut self) {
        for agent in &self.agents {
            agent.stop();
        }
        for agent in &mut self.agents {
            agent.join();
        }
        for inbox in &mut self.inboxes {
            inbox.shutdown();
        }
        if !self.agents.is_empty() {
            debug!(agents = self.agents.len(), "agents cleared");
        }
        self.agents.clear();
        self.inboxes.clear();
    }
}

// Connects every agent to its peers and the controller with channels, and
// gives the controller a channel to every agent.
fn wire_in_process(
    agents: Vec<Agent>,
    specs: &[AgentSpec],
    controller: &Sender<Message>,
    outbox: &mut Outbox,
    handles: &mut Vec<AgentHandle>,
) -> Result<()> {
    let inboxes: HashMap<AgentId, Sender<Message>> = agents
        .iter()
        .map(|agent| (agent.id().clone(), agent.inbox()))
        .collect();
    for (mut agent, spec) in agents.into_iter().zip(specs) {
        for peer in spec.peers() {
            let tx = inboxes.get(&peer).ok_or_else(|| {
                DcopError::Inconsistent(format!("agent {} needs {peer}, which was not built", spec.agent))
            })?;
            agent
                .queue_mut()
                .add_output_pipe(peer.clone(), Box::new(ChannelPipe::new(peer, tx.clone())));
        }
        agent.queue_mut().add_output_pipe(
            AgentId::controller(),
            Box::new(ChannelPipe::new(AgentId::controller(), controller.clone())),
        );
        outbox.router_mut().add_pipe(
            agent.id().clone(),
            Box::new(ChannelPipe::new(agent.id().clone(), agent.inbox())),
        );
        handles.push(agent.spawn()?);
    }
    Ok(())
}

impl Drop for Constructor {
    fn drop(&mut self) {
        self.clear();
    }
}

impl MessageListener for Constructor {
    fn message_kinds(&self) -> Vec<MessageKind> {
        vec![
            MessageKind::Configuration,
            MessageKind::AgentConfiguration,
            MessageKind::Clear,
        ]
    }

    fn on_message(&mut self, msg: &Message, outbox: &mut Outbox) -> Result<()> {
        match &msg.payload {
            Payload::Configuration(payload) => self.configure(payload, outbox),
            Payload::AgentConfiguration(specs) => self.construct(specs, outbox),
            Payload::Clear => {
                self.clear();
                Ok(())
            }
            _ => Err(msg.unexpected(MessageKind::AgentConfiguration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::monitor::RunMonitor;
    use dcopforge_comm::{Queue, QueueOptions};
    use dcopforge_config::AgentConfig;
    use dcopforge_test::path_problem;

    #[test]
    fn test_in_process_agents_are_built_and_cleared() {
        let specs = AgentSpec::for_problem(&path_problem());
        let agents: Vec<AgentId> = specs.iter().map(|s| s.agent.clone()).collect();
        let (monitor, handle) = RunMonitor::new(&agents, None);

        let mut queue = Queue::new(AgentId::controller(), QueueOptions::default());
        let factory = AgentFactory::new(AgentConfig::default()).unwrap();
        queue.register_listener(Box::new(monitor));
        queue.register_listener(Box::new(Constructor::in_process(factory, queue.inbox())));

        queue
            .dispatch(Message::new(Payload::AgentConfiguration(specs)))
            .unwrap();
        while handle.ready_messages() == 0 {
            assert!(queue.process_next(Duration::from_secs(5)).unwrap());
        }
        // In-process agents announce no addresses.
        assert!(handle.addresses().is_empty());

        queue.dispatch(Message::new(Payload::Clear)).unwrap();
    }

    #[test]
    fn test_daemon_constructor_needs_configuration_first() {
        let mut constructor = Constructor::tcp(IpAddr::from([127, 0, 0, 1]), None, None);
        let mut queue = Queue::new(AgentId::daemon("127.0.0.1:0"), QueueOptions::default());
        let specs = AgentSpec::for_problem(&path_problem());
        let msg = Message::new(Payload::AgentConfiguration(specs));
        let err = constructor.on_message(&msg, queue.outbox_mut()).unwrap_err();
        assert!(matches!(err, DcopError::InvalidState(_)));
        assert_eq!(constructor.agent_count(), 0);
    }
}
