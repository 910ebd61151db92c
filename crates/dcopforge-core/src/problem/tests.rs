use super::*;
use crate::variable::Value;

fn ne(a: &str, b: &str, domain: &[Value]) -> UtilitySpace {
    UtilitySpace::from_fn(
        vec![a.to_string(), b.to_string()],
        vec![domain.to_vec(), domain.to_vec()],
        |v| Utility::of(if v[0] != v[1] { 1.0 } else { 0.0 }),
    )
    .unwrap()
}

fn path() -> Problem {
    let domain = vec![1, 2];
    Problem::new(
        Optimization::Maximize,
        vec![
            Variable::new("A", domain.clone(), "a1"),
            Variable::new("B", domain.clone(), "a1"),
            Variable::new("C", domain.clone(), "a2"),
            Variable::new("D", domain.clone(), "a3"),
        ],
        vec![ne("A", "B", &domain), ne("B", "C", &domain), ne("C", "D", &domain)],
    )
    .unwrap()
}

#[test]
fn test_agents_and_ownership() {
    let problem = path();
    assert_eq!(
        problem.agents(),
        vec![AgentId::new("a1"), AgentId::new("a2"), AgentId::new("a3")]
    );
    assert_eq!(problem.owner_of("C"), Some(&AgentId::new("a2")));
    assert_eq!(problem.variables_of(&AgentId::new("a1")).count(), 2);
}

#[test]
fn test_neighbors() {
    let problem = path();
    let b: Vec<_> = problem.neighbors("B").into_iter().collect();
    assert_eq!(b, vec!["A", "C"]);
    assert!(problem.neighbors("Z").is_empty());
    assert_eq!(problem.constraint_graph()["D"].len(), 1);
}

#[test]
fn test_subproblem_keeps_neighbors_and_constraints() {
    let problem = path();
    let sub = problem.subproblem(&AgentId::new("a2"));
    let names: Vec<_> = sub.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["B", "C", "D"]);
    assert_eq!(sub.constraints.len(), 2);
}

#[test]
fn test_evaluate() {
    let problem = path();
    let good: Assignment = [("A", 1), ("B", 2), ("C", 1), ("D", 2)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    assert_eq!(problem.evaluate(&good), Some(Utility::of(3.0)));

    let mut partial = good.clone();
    partial.remove("D");
    assert_eq!(problem.evaluate(&partial), None);
}

#[test]
fn test_validation_errors() {
    let domain = vec![1, 2];
    let duplicate = Problem::new(
        Optimization::Maximize,
        vec![
            Variable::new("A", domain.clone(), "a"),
            Variable::new("A", domain.clone(), "b"),
        ],
        vec![],
    );
    assert!(duplicate.is_err());

    let unknown = Problem::new(
        Optimization::Maximize,
        vec![Variable::new("A", domain.clone(), "a")],
        vec![ne("A", "B", &domain)],
    );
    assert!(matches!(unknown, Err(DcopError::Configuration(_))));

    let mismatched = Problem::new(
        Optimization::Maximize,
        vec![
            Variable::new("A", vec![1, 2, 3], "a"),
            Variable::new("B", domain.clone(), "a"),
        ],
        vec![ne("A", "B", &domain)],
    );
    assert!(mismatched.is_err());

    let reserved = Problem::new(
        Optimization::Maximize,
        vec![Variable::new("A", domain, AgentId::controller())],
        vec![],
    );
    assert!(reserved.is_err());
}

#[test]
fn test_toml_problem() {
    let problem: Problem = toml::from_str(
        r#"
        optimization = "minimize"

        [[variables]]
        name = "x"
        domain = [0, 1]
        owner = "agent-x"

        [[variables]]
        name = "y"
        domain = [0, 1]
        owner = "agent-y"

        [[constraints]]
        scope = ["x", "y"]
        domains = [[0, 1], [0, 1]]
        utilities = [inf, 1.0, 2.0, inf]
        "#,
    )
    .unwrap();
    problem.validate().unwrap();
    assert_eq!(problem.optimization, Optimization::Minimize);
    let assignment: Assignment = [("x".to_string(), 0), ("y".to_string(), 1)].into();
    assert_eq!(problem.evaluate(&assignment), Some(Utility::of(1.0)));
}

#[test]
fn test_rejects_sentinel_of_the_other_direction() {
    let domain = vec![0, 1];
    let constraint = |u: Utility| {
        UtilitySpace::new(vec!["x".to_string()], vec![domain.clone()], vec![u, Utility::of(1.0)]).unwrap()
    };
    let variables = vec![Variable::new("x", domain.clone(), "a1")];

    let wrong = Problem::new(
        Optimization::Maximize,
        variables.clone(),
        vec![constraint(Utility::PLUS_INFINITY)],
    );
    assert!(matches!(wrong, Err(DcopError::Configuration(_))));

    let wrong = Problem::new(
        Optimization::Minimize,
        variables.clone(),
        vec![constraint(Utility::MINUS_INFINITY)],
    );
    assert!(matches!(wrong, Err(DcopError::Configuration(_))));

    assert!(Problem::new(
        Optimization::Maximize,
        variables,
        vec![constraint(Utility::MINUS_INFINITY)]
    )
    .is_ok());
}
