//! The controller: holds the problem, deploys agents and collects results.
//!
//! Three ways of running, chosen from the configuration:
//!
//! - simulated time: every queue lives in one [`SimulatedMailer`];
//! - local: one thread per agent inside this process, over channels or
//!   loopback TCP;
//! - distributed: agents are placed round-robin on remote [`Daemon`]s.
//!
//! Whatever the mode, a run that hits the deadline is stopped, given a grace
//! period to report, and returned as an incomplete [`Solution`].
//!
//! [`Daemon`]: crate::Daemon

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dcopforge_algorithms::{Solution, SolutionCollector, StatsCollector, StatsHandle};
use dcopforge_comm::{
    AgentAddress, AgentSpec, ConfigurationPayload, MailerOutcome, Message, Payload, QueueOptions,
    SimulatedMailer,
};
use dcopforge_config::{DcopConfig, Deployment, TransportKind};
use dcopforge_core::{AgentId, DcopError, IdGenerator, Problem, Result, RunId};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::agent::abort;
use crate::constructor::Constructor;
use crate::event::RunEvent;
use crate::factory::AgentFactory;
use crate::host::{HostRole, RuntimeHost, POLL_INTERVAL};
use crate::monitor::{MonitorHandle, RunMonitor};

/// Solves one problem, as many times as asked.
pub struct Controller {
    problem: Problem,
    config: DcopConfig,
    terminate: Option<Arc<AtomicBool>>,
    ids: IdGenerator,
}

impl Controller {
    /// Validates `problem` and `config` together.
    pub fn new(problem: Problem, config: DcopConfig) -> Result<Self> {
        problem.validate()?;
        config.validate()?;
        if problem.variables.is_empty() {
            return Err(DcopError::Configuration("problem has no variables".to_string()));
        }
        Ok(Controller {
            problem,
            config,
            terminate: None,
            ids: IdGenerator::new(),
        })
    }

    /// Stops runs early once `flag` is set.
    pub fn with_terminate(mut self, flag: Arc<AtomicBool>) -> Self {
        self.terminate = Some(flag);
        self
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn config(&self) -> &DcopConfig {
        &self.config
    }

    /// Runs to completion or timeout.
    pub fn solve(&self) -> Result<Solution> {
        let (sender, _receiver) = mpsc::unbounded_channel();
        self.solve_with_events(sender)
    }

    /// Runs to completion or timeout, streaming progress to `events`.
    ///
    /// A timeout is not an error: the returned solution is marked
    /// `timed_out` and carries whatever was collected.
    pub fn solve_with_events(&self, events: UnboundedSender<RunEvent>) -> Result<Solution> {
        let id = self.ids.next_run_id();
        let specs = AgentSpec::for_problem(&self.problem);
        let factory = AgentFactory::new(self.config.agent.clone())?;
        let agents: Vec<AgentId> = specs.iter().map(|spec| spec.agent.clone()).collect();

        let (stats, stats_handle) = StatsCollector::new();
        let (solution, solution_handle) = SolutionCollector::new();
        let (monitor, monitor_handle) = RunMonitor::new(&agents, Some(events.clone()));
        let options = QueueOptions {
            table: Some(factory.table()),
            ..QueueOptions::default()
        };
        let mut host = RuntimeHost::new(HostRole::Controller, AgentId::controller(), options);
        host.register(Box::new(stats));
        host.register(Box::new(solution));
        host.register(Box::new(monitor));

        let mode = if self.config.agent.measure_time {
            "simulated"
        } else {
            match self.config.run.deployment {
                Deployment::Local => "local",
                Deployment::Distributed { .. } => "distributed",
            }
        };
        info!(
            event = "run_start",
            run = %id,
            mode,
            variables = self.problem.variables.len(),
            constraints = self.problem.constraints.len(),
            agents = agents.len(),
        );

        let started = Instant::now();
        let mut run = Run {
            id,
            specs,
            factory,
            stats: stats_handle,
            monitor: monitor_handle,
            events,
            deadline: started + self.config.run.timeout(),
            grace: self.config.run.stop_grace(),
            terminate: self.terminate.as_deref(),
            timed_out: false,
        };

        if self.config.agent.measure_time {
            run.simulated(host)?;
        } else {
            match &self.config.run.deployment {
                Deployment::Local => run.local(host, &self.config)?,
                Deployment::Distributed { daemons } => run.distributed(host, &self.config, daemons)?,
            }
        }

        let wall_time = started.elapsed();
        let statistics = run.stats.statistics(wall_time);
        let solution = solution_handle.solution(&self.problem, statistics, run.timed_out);
        run.emit(RunEvent::Finished {
            run: run.id,
            complete: solution.complete,
            wall_time,
        });
        info!(
            event = "run_end",
            run = %run.id,
            complete = solution.complete,
            timed_out = solution.timed_out,
            utility = ?solution.utility,
            messages = solution.statistics.message_count(),
            ncccs = solution.statistics.ncccs,
            wall_time_ms = wall_time.as_millis() as u64,
        );
        Ok(solution)
    }
}

// State of one run.
struct Run<'a> {
    id: RunId,
    specs: Vec<AgentSpec>,
    factory: AgentFactory,
    stats: StatsHandle,
    monitor: MonitorHandle,
    events: UnboundedSender<RunEvent>,
    deadline: Instant,
    grace: Duration,
    terminate: Option<&'a AtomicBool>,
    timed_out: bool,
}

impl Run<'_> {
    fn emit(&self, event: RunEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn terminated(&self) -> bool {
        self.terminate.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        self.specs.iter().map(|spec| spec.agent.clone()).collect()
    }

    fn mark_timed_out(&mut self) {
        warn!(
            event = "run_timeout",
            run = %self.id,
            finished = self.monitor.states().values().filter(|s| s.is_terminal()).count(),
            agents = self.specs.len(),
        );
        self.timed_out = true;
        self.emit(RunEvent::TimedOut { run: self.id });
    }

    // Dispatches controller messages until `done` holds or `until` passes.
    // Returns whether `done` was reached.
    fn pump_until(&self, host: &mut RuntimeHost, until: Instant, done: impl Fn() -> bool) -> Result<bool> {
        loop {
            if done() {
                return Ok(true);
            }
            if Instant::now() >= until {
                return Ok(false);
            }
            host.queue_mut().process_next(POLL_INTERVAL)?;
        }
    }

    // Returns false if the agents were not ready before the deadline.
    fn await_ready(&mut self, host: &mut RuntimeHost, expected: usize) -> Result<bool> {
        let monitor = self.monitor.clone();
        self.pump_until(host, self.deadline, || {
            monitor.ready_messages() >= expected || self.terminated()
        })?;
        if monitor.ready_messages() >= expected && !self.terminated() {
            return Ok(true);
        }
        if self.terminated() {
            warn!(run = %self.id, "run terminated during deployment");
        } else {
            warn!(run = %self.id, ready = monitor.ready_messages(), expected, "agents not ready before the deadline");
            self.mark_timed_out();
        }
        Ok(false)
    }

    fn drive(&mut self, host: &mut RuntimeHost, expected_ready: usize) -> Result<()> {
        if !self.await_ready(host, expected_ready)? {
            return Ok(());
        }
        self.start_agents(host)?;
        self.supervise(host)
    }

    // Hands every TCP agent the address book, then starts everyone.
    fn start_agents(&self, host: &mut RuntimeHost) -> Result<()> {
        let addresses = self.monitor.addresses();
        let agents = self.agent_ids();
        let queue = host.queue_mut();
        if !addresses.is_empty() {
            queue.outbox_mut().router_mut().extend_directory(&addresses);
            for agent in &agents {
                queue.send(agent, Message::new(Payload::PeerDirectory(addresses.clone())))?;
            }
        }
        for agent in &agents {
            queue.send(agent, Message::start())?;
        }
        self.emit(RunEvent::Started {
            run: self.id,
            agents: agents.len(),
        });
        debug!(run = %self.id, agents = agents.len(), "agents started");
        Ok(())
    }

    // Waits for every agent to finish, then stops them and collects reports.
    fn supervise(&mut self, host: &mut RuntimeHost) -> Result<()> {
        let monitor = self.monitor.clone();
        let done = || monitor.all_terminal() || monitor.any_aborted();
        let reached = self.pump_until(host, self.deadline, || done() || self.terminated())?;
        if !reached {
            self.mark_timed_out();
        } else if !done() {
            warn!(run = %self.id, "run terminated");
        }

        for agent in self.agent_ids() {
            if let Err(e) = host.queue_mut().send(&agent, Message::stop()) {
                debug!(agent = %agent, error = %e, "could not stop agent");
            }
        }
        let stats = self.stats.clone();
        let expected = self.specs.len();
        let grace = Instant::now() + self.grace;
        if !self.pump_until(host, grace, || stats.report_count() >= expected)? {
            warn!(
                run = %self.id,
                reports = stats.report_count(),
                agents = expected,
                "reports missing after stop"
            );
        }
        Ok(())
    }

    fn local(&mut self, mut host: RuntimeHost, config: &DcopConfig) -> Result<()> {
        let constructor = match config.agent.transport {
            TransportKind::InProcess => Constructor::in_process(self.factory.clone(), host.queue_mut().inbox()),
            TransportKind::Tcp => {
                let address = config
                    .run
                    .controller_address
                    .as_deref()
                    .unwrap_or("127.0.0.1:0");
                let bound = host.listen(address, self.factory.table())?;
                Constructor::tcp(
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    Some(self.factory.clone()),
                    Some(bound),
                )
            }
        };
        host.register(Box::new(constructor));
        host.queue_mut()
            .send_to_self(Message::new(Payload::AgentConfiguration(self.specs.clone())))?;

        let result = self.drive(&mut host, 1);

        // CLEAR joins the agent threads even when deployment failed.
        host.queue_mut().send_to_self(Message::new(Payload::Clear))?;
        host.queue_mut().process_pending()?;
        host.shutdown();
        result
    }

    fn distributed(&mut self, mut host: RuntimeHost, config: &DcopConfig, daemons: &[String]) -> Result<()> {
        let address = config
            .run
            .controller_address
            .as_deref()
            .unwrap_or("127.0.0.1:0");
        let controller = host.listen(address, self.factory.table())?;

        let mut daemon_ids = Vec::with_capacity(daemons.len());
        let mut directory = Vec::with_capacity(daemons.len());
        for daemon in daemons {
            let address = resolve(daemon)?;
            let agent = AgentId::daemon(address);
            directory.push(AgentAddress {
                agent: agent.clone(),
                address,
            });
            daemon_ids.push(agent);
        }
        host.queue_mut()
            .outbox_mut()
            .router_mut()
            .extend_directory(&directory);

        let mut placements = vec![Vec::new(); daemon_ids.len()];
        for (i, spec) in self.specs.iter().enumerate() {
            placements[i % daemon_ids.len()].push(spec.clone());
        }
        let configuration = ConfigurationPayload {
            agent_config: config.agent.to_toml_string()?,
            controller,
        };
        for (daemon, specs) in daemon_ids.iter().zip(placements) {
            info!(daemon = %daemon, agents = specs.len(), "deploying agents");
            let queue = host.queue_mut();
            queue.send(daemon, Message::new(Payload::Configuration(configuration.clone())))?;
            queue.send(daemon, Message::new(Payload::AgentConfiguration(specs)))?;
        }

        let result = self.drive(&mut host, daemon_ids.len());

        for daemon in &daemon_ids {
            if let Err(e) = host.queue_mut().send(daemon, Message::new(Payload::Clear)) {
                warn!(daemon = %daemon, error = %e, "could not clear daemon");
            }
        }
        host.shutdown();
        result
    }

    fn simulated(&mut self, host: RuntimeHost) -> Result<()> {
        let mut mailer = SimulatedMailer::new();
        for spec in &self.specs {
            mailer.add_queue(self.factory.build(spec).into_queue());
        }
        mailer.add_queue(host.into_queue());
        let controller = AgentId::controller();
        let agents = self.agent_ids();
        let queue = mailer
            .queue_mut(&controller)
            .ok_or_else(|| DcopError::InvalidState("controller queue missing from mailer".to_string()))?;
        for agent in &agents {
            queue.send(agent, Message::start())?;
        }
        self.emit(RunEvent::Started {
            run: self.id,
            agents: agents.len(),
        });

        let outcome = mailer.run(self.deadline, |queue, e| abort(queue, &e));
        match outcome {
            MailerOutcome::DeadlineReached => self.mark_timed_out(),
            MailerOutcome::Quiescent if !self.monitor.all_terminal() => {
                warn!(run = %self.id, "no message left in flight but agents are still running");
            }
            MailerOutcome::Quiescent => {}
        }

        // STOP carries no timestamp, so it overtakes whatever is still in flight.
        if let Some(queue) = mailer.queue_mut(&controller) {
            for agent in &agents {
                queue.send(agent, Message::stop())?;
            }
        }
        if mailer.run(Instant::now() + self.grace, |queue, e| abort(queue, &e)) == MailerOutcome::DeadlineReached {
            warn!(run = %self.id, "reports missing after stop");
        }
        debug!(run = %self.id, delivered = mailer.delivered(), "simulation over");
        Ok(())
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| DcopError::Configuration(format!("daemon address '{address}' does not resolve")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcopforge_config::UtilMode;
    use dcopforge_core::{Optimization, Utility};
    use dcopforge_test::{path_problem, ring_problem};

    fn simulated() -> DcopConfig {
        DcopConfig::default()
            .with_simulated_time(true)
            .with_timeout_secs(30)
    }

    #[test]
    fn test_rejects_problem_without_variables() {
        let problem = Problem::new(Optimization::Maximize, Vec::new(), Vec::new()).unwrap();
        assert!(matches!(
            Controller::new(problem, DcopConfig::default()),
            Err(DcopError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_distributed_run_without_tcp() {
        let mut config = DcopConfig::default().with_daemons(["127.0.0.1:9000"]);
        config.agent.transport = TransportKind::InProcess;
        assert!(Controller::new(path_problem(), config).is_err());
    }

    #[test]
    fn test_simulated_run_streams_events() {
        let controller = Controller::new(path_problem(), simulated()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let solution = controller.solve_with_events(tx).unwrap();
        assert!(solution.complete);
        assert_eq!(solution.utility, Some(Utility::of(3.0)));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events.first(),
            Some(&RunEvent::Started {
                run: RunId(0),
                agents: 3
            })
        );
        assert!(matches!(
            events.last(),
            Some(RunEvent::Finished { run: RunId(0), complete: true, .. })
        ));
    }

    #[test]
    fn test_controller_can_solve_repeatedly() {
        let controller = Controller::new(ring_problem(5, &[0, 1, 2]), simulated()).unwrap();
        let first = controller.solve().unwrap();
        let second = controller.solve().unwrap();
        assert_eq!(first.utility, second.utility);
        assert_eq!(first.statistics.simulated_time, second.statistics.simulated_time);
    }

    #[test]
    fn test_pull_mode_in_threaded_run() {
        let config = DcopConfig::default()
            .with_timeout_secs(30)
            .with_util_mode(UtilMode::Pull {
                policy: dcopforge_config::AskPolicyConfig::Whole,
            });
        let solution = Controller::new(path_problem(), config).unwrap().solve().unwrap();
        assert!(solution.complete);
        assert_eq!(solution.utility, Some(Utility::of(3.0)));
    }

    #[test]
    fn test_terminate_flag_ends_run_early() {
        let flag = Arc::new(AtomicBool::new(true));
        let controller = Controller::new(path_problem(), DcopConfig::default())
            .unwrap()
            .with_terminate(Arc::clone(&flag));
        let solution = controller.solve().unwrap();
        assert!(!solution.complete);
        assert!(!solution.timed_out);
    }
}
