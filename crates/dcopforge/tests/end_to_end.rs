//! End-to-end runs through the public API, one per deployment mode.

use dcopforge::{
    solve, solve_with_events, AgentState, AskPolicyConfig, Daemon, DcopConfig, ModuleConfig,
    Optimization, Problem, RunEvent, Solution, TransportKind, UtilMode, Utility,
};
use dcopforge_test::{
    brute_force, disconnected_problem, path_problem, random_problem, triangle_problem,
    RandomProblem,
};
use tokio::sync::mpsc::unbounded_channel;

fn simulated() -> DcopConfig {
    DcopConfig::default()
        .with_simulated_time(true)
        .with_timeout_secs(30)
}

fn threaded() -> DcopConfig {
    DcopConfig::default().with_timeout_secs(30)
}

fn assert_optimal(problem: &Problem, solution: &Solution) {
    let (expected, _) = brute_force(problem);
    let utility = solution.utility.expect("roots reported");
    assert!(
        utility.approx_eq(expected, 1e-9),
        "got {utility}, brute force says {expected}"
    );
    if problem.optimization.is_feasible(expected) {
        assert!(solution.complete);
        let true_utility = solution.true_utility.expect("every variable assigned");
        assert!(true_utility.approx_eq(expected, 1e-9));
    }
}

#[test]
fn test_path_problem_simulated() {
    let problem = path_problem();
    let solution = solve(problem.clone(), simulated()).unwrap();
    assert!(solution.complete);
    assert!(!solution.timed_out);
    assert_eq!(solution.utility, Some(Utility::of(3.0)));
    assert_eq!(solution.true_utility, Some(Utility::of(3.0)));
    assert_eq!(solution.assignment.len(), problem.variables.len());
    assert_eq!(solution.statistics.tree_width, Some(1));
    assert!(solution.statistics.simulated_time.is_some());
}

#[test]
fn test_path_problem_threaded() {
    let solution = solve(path_problem(), threaded()).unwrap();
    assert!(solution.has_solution());
    assert_eq!(solution.utility, Some(Utility::of(3.0)));
    assert!(solution.statistics.simulated_time.is_none());
    assert!(solution
        .statistics
        .agent_states()
        .values()
        .all(|state| *state == AgentState::Finished));
}

#[test]
fn test_triangle_is_reported_infeasible() {
    let solution = solve(triangle_problem(), threaded()).unwrap();
    assert!(solution.complete);
    assert!(!solution.is_feasible());
    assert!(!solution.has_solution());
    assert_eq!(solution.utility, Some(Optimization::Maximize.infeasible()));
}

#[test]
fn test_random_problems_match_brute_force() {
    for seed in 0..4 {
        for optimization in [Optimization::Maximize, Optimization::Minimize] {
            let problem = random_problem(&RandomProblem {
                seed,
                optimization,
                ..RandomProblem::default()
            });
            let solution = solve(problem.clone(), simulated()).unwrap();
            assert_optimal(&problem, &solution);
        }
    }
}

#[test]
fn test_infeasible_random_problems_match_brute_force() {
    for seed in 0..4 {
        let problem = random_problem(&RandomProblem {
            seed,
            infeasible_ratio: 0.3,
            domain_size: 2,
            ..RandomProblem::default()
        });
        let solution = solve(problem.clone(), threaded()).unwrap();
        assert_optimal(&problem, &solution);
    }
}

#[test]
fn test_disconnected_components_are_summed() {
    let problem = disconnected_problem();
    let solution = solve(problem.clone(), simulated()).unwrap();
    assert_optimal(&problem, &solution);
    assert_eq!(solution.statistics.pseudotree.roots().len(), 3);
}

#[test]
fn test_simulated_time_is_reproducible() {
    let problem = random_problem(&RandomProblem::default());
    let first = solve(problem.clone(), simulated()).unwrap();
    let second = solve(problem, simulated()).unwrap();
    assert!(first.statistics.simulated_time.is_some());
    assert_eq!(first.statistics.simulated_time, second.statistics.simulated_time);
    assert_eq!(first.statistics.ncccs, second.statistics.ncccs);
    assert_eq!(first.statistics.message_count(), second.statistics.message_count());
    assert_eq!(first.assignment, second.assignment);
}

#[test]
fn test_per_agent_statistics_add_up() {
    let problem = random_problem(&RandomProblem::default());
    let solution = solve(problem, threaded()).unwrap();
    let stats = &solution.statistics;
    assert_eq!(stats.agent_count(), 4);

    let sent: u64 = stats.per_agent.values().map(|r| r.stats.sent_count()).sum();
    let size: u64 = stats.per_agent.values().map(|r| r.stats.sent_size()).sum();
    let checks: u64 = stats.per_agent.values().map(|r| r.checks.performed()).sum();
    let ncccs = stats
        .per_agent
        .values()
        .map(|r| r.checks.nccc())
        .max()
        .unwrap_or(0);
    assert!(sent > 0);
    assert_eq!(stats.message_count(), sent);
    assert_eq!(stats.message_size(), size);
    assert_eq!(stats.constraint_checks, checks);
    assert_eq!(stats.ncccs, ncccs);
    assert!(stats.ncccs <= stats.constraint_checks);
}

#[test]
fn test_pull_mode_matches_eager() {
    let problem = random_problem(&RandomProblem {
        seed: 3,
        ..RandomProblem::default()
    });
    let eager = solve(problem.clone(), threaded()).unwrap();
    for policy in [
        AskPolicyConfig::Whole,
        AskPolicyConfig::Chunked { chunk_size: 2 },
    ] {
        let pulled = solve(
            problem.clone(),
            threaded().with_util_mode(UtilMode::Pull { policy }),
        )
        .unwrap();
        assert!(pulled.complete);
        assert_eq!(pulled.utility, eager.utility);
        assert_eq!(pulled.true_utility, eager.true_utility);
    }
}

#[test]
fn test_local_tcp_matches_in_process() {
    let problem = random_problem(&RandomProblem {
        seed: 5,
        ..RandomProblem::default()
    });
    let in_process = solve(problem.clone(), threaded()).unwrap();
    let tcp = solve(problem.clone(), threaded().with_transport(TransportKind::Tcp)).unwrap();
    assert!(tcp.complete);
    assert_eq!(tcp.utility, in_process.utility);
    assert_optimal(&problem, &tcp);
}

#[test]
fn test_distributed_run_over_loopback_daemons() {
    let mut daemons: Vec<_> = (0..2)
        .map(|_| Daemon::bind("127.0.0.1:0").unwrap().spawn().unwrap())
        .collect();
    let addresses: Vec<String> = daemons.iter().map(|d| d.address().to_string()).collect();

    let problem = random_problem(&RandomProblem {
        seed: 11,
        agents: 5,
        ..RandomProblem::default()
    });
    let solution = solve(problem.clone(), threaded().with_daemons(addresses.clone())).unwrap();
    assert!(solution.complete);
    assert_optimal(&problem, &solution);
    assert_eq!(solution.statistics.agent_count(), 5);

    // Daemons survive a run and serve the next one.
    let again = solve(problem, threaded().with_daemons(addresses)).unwrap();
    assert_eq!(again.utility, solution.utility);

    for daemon in &mut daemons {
        daemon.shutdown().unwrap();
    }
}

#[test]
fn test_timeout_returns_partial_solution() {
    let mut config = DcopConfig::default().with_timeout_secs(1);
    config.agent.modules = vec![
        ModuleConfig::Election,
        ModuleConfig::Pseudotree,
        ModuleConfig::UtilPropagation,
    ];
    let problem = path_problem();
    let solution = solve(problem.clone(), config).unwrap();
    assert!(solution.timed_out);
    assert!(!solution.complete);
    assert!(solution.assignment.is_empty());
    // UTIL still reached the roots before the deadline.
    assert_eq!(solution.utility, Some(Utility::of(3.0)));
    assert_eq!(solution.statistics.per_agent.len(), problem.agents().len());
    assert!(solution
        .statistics
        .agent_states()
        .values()
        .all(|state| *state == AgentState::Cleared));
}

#[test]
fn test_events_are_streamed_in_order() {
    let (tx, mut rx) = unbounded_channel();
    let solution = solve_with_events(path_problem(), threaded(), tx).unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(RunEvent::Started { agents: 3, .. })));
    assert!(matches!(
        events.last(),
        Some(RunEvent::Finished { complete: true, .. })
    ));
    let finished = events
        .iter()
        .filter(|e| matches!(e, RunEvent::AgentStateChanged { state: AgentState::Finished, .. }))
        .count();
    assert_eq!(finished, 3);
    assert!(solution.complete);
}

#[test]
fn test_empty_problem_is_rejected() {
    let problem = Problem::new(Optimization::Maximize, Vec::new(), Vec::new()).unwrap();
    assert!(solve(problem, simulated()).is_err());
}
