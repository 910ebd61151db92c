use std::time::Duration;

use dcopforge_comm::{
    AgentReport, AgentState, MessageStats, OptimalUtility, Queue, QueueOptions, VariableAssignment,
};
use dcopforge_core::{AgentId, ConstraintChecks, Pseudotree};
use dcopforge_test::path_problem;

use super::*;

fn dispatch(queue: &mut Queue, payload: Payload) {
    let mut msg = Message::new(payload);
    msg.sender = AgentId::new("a1");
    queue.dispatch(msg).unwrap();
}

fn assign(pairs: &[(&str, i64)]) -> Payload {
    Payload::Assignments(
        pairs
            .iter()
            .map(|&(variable, value)| VariableAssignment {
                variable: variable.to_string(),
                value,
            })
            .collect(),
    )
}

fn collector() -> (Queue, SolutionHandle) {
    let (collector, handle) = SolutionCollector::new();
    let mut queue = Queue::new(AgentId::controller(), QueueOptions::default());
    queue.register_listener(Box::new(collector));
    (queue, handle)
}

#[test]
fn test_complete_solution() {
    let problem = path_problem();
    let (mut queue, handle) = collector();
    dispatch(
        &mut queue,
        Payload::OptimalUtility(OptimalUtility {
            root: "A".to_string(),
            utility: Utility::of(3.0),
        }),
    );
    dispatch(&mut queue, assign(&[("A", 1), ("B", 2)]));
    dispatch(&mut queue, assign(&[("C", 1), ("D", 2)]));

    let solution = handle.solution(&problem, RunStatistics::default(), false);
    assert!(solution.complete);
    assert!(solution.has_solution());
    assert_eq!(solution.utility, Some(Utility::of(3.0)));
    assert_eq!(solution.true_utility, Some(Utility::of(3.0)));
    assert_eq!(solution.value_of("C"), Some(1));
}

#[test]
fn test_partial_solution_on_timeout() {
    let problem = path_problem();
    let (mut queue, handle) = collector();
    dispatch(&mut queue, assign(&[("D", 2)]));

    let solution = handle.solution(&problem, RunStatistics::default(), true);
    assert!(!solution.complete);
    assert!(solution.timed_out);
    assert_eq!(solution.utility, None);
    assert_eq!(solution.true_utility, None);
    assert_eq!(handle.assigned_count(), 1);
}

#[test]
fn test_aborted_agent_makes_run_incomplete() {
    let problem = path_problem();
    let (mut queue, handle) = collector();
    dispatch(&mut queue, assign(&[("A", 1), ("B", 2), ("C", 1), ("D", 2)]));

    let mut reports = BTreeMap::new();
    reports.insert(
        AgentId::new("a2"),
        AgentReport {
            agent: AgentId::new("a2"),
            state: AgentState::Aborted,
            stats: MessageStats::new(),
            checks: ConstraintChecks::new(),
            clock: None,
            error: Some("boom".to_string()),
        },
    );
    let stats = RunStatistics::from_reports(reports, Pseudotree::new(), Duration::ZERO);
    let solution = handle.solution(&problem, stats, false);
    assert!(!solution.complete);
}

#[test]
fn test_infeasible_utility() {
    let problem = path_problem();
    let (mut queue, handle) = collector();
    dispatch(
        &mut queue,
        Payload::OptimalUtility(OptimalUtility {
            root: "A".to_string(),
            utility: Optimization::Maximize.infeasible(),
        }),
    );
    let solution = handle.solution(&problem, RunStatistics::default(), false);
    assert!(!solution.is_feasible());
    assert!(!solution.has_solution());
}
