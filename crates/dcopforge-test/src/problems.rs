//! Problem fixtures.

use dcopforge_core::{Optimization, Problem, Utility, UtilitySpace, Value, Variable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn pair(a: &str, b: &str, domain: &[Value], mut f: impl FnMut(Value, Value) -> Utility) -> UtilitySpace {
    UtilitySpace::from_fn(
        vec![a.to_string(), b.to_string()],
        vec![domain.to_vec(), domain.to_vec()],
        |v| f(v[0], v[1]),
    )
    .expect("fixture constraint is well formed")
}

/// Utility 1 when `a != b`, 0 otherwise.
pub fn soft_not_equal(a: &str, b: &str, domain: &[Value]) -> UtilitySpace {
    pair(a, b, domain, |x, y| Utility::of(if x != y { 1.0 } else { 0.0 }))
}

/// Infeasible when `a == b` under `optimization`, 0 otherwise.
pub fn hard_not_equal(a: &str, b: &str, domain: &[Value], optimization: Optimization) -> UtilitySpace {
    pair(a, b, domain, |x, y| {
        if x != y {
            Utility::ZERO
        } else {
            optimization.infeasible()
        }
    })
}

/// A-B-C-D with domains {1, 2} and soft `!=` on each edge, maximized.
///
/// The optimum is 3. A and B share agent `a1`; C and D have their own.
pub fn path_problem() -> Problem {
    let domain = vec![1, 2];
    Problem::new(
        Optimization::Maximize,
        vec![
            Variable::new("A", domain.clone(), "a1"),
            Variable::new("B", domain.clone(), "a1"),
            Variable::new("C", domain.clone(), "a2"),
            Variable::new("D", domain.clone(), "a3"),
        ],
        vec![
            soft_not_equal("A", "B", &domain),
            soft_not_equal("B", "C", &domain),
            soft_not_equal("C", "D", &domain),
        ],
    )
    .expect("path fixture is valid")
}

/// Three variables with two values and hard pairwise `!=`: infeasible.
pub fn triangle_problem() -> Problem {
    let domain = vec![0, 1];
    let opt = Optimization::Maximize;
    Problem::new(
        opt,
        vec![
            Variable::new("X", domain.clone(), "x"),
            Variable::new("Y", domain.clone(), "y"),
            Variable::new("Z", domain.clone(), "z"),
        ],
        vec![
            hard_not_equal("X", "Y", &domain, opt),
            hard_not_equal("Y", "Z", &domain, opt),
            hard_not_equal("X", "Z", &domain, opt),
        ],
    )
    .expect("triangle fixture is valid")
}

/// A cycle `v0 - v1 - ... - v{n-1} - v0` with soft `!=`, one agent per
/// variable. With an even `n` and two values every edge can be satisfied.
pub fn ring_problem(n: usize, domain: &[Value]) -> Problem {
    let names: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
    let variables = names
        .iter()
        .map(|name| Variable::new(name.clone(), domain.to_vec(), format!("agent-{name}")))
        .collect();
    let constraints = (0..n)
        .filter(|&i| n > 2 || i + 1 < n)
        .map(|i| soft_not_equal(&names[i], &names[(i + 1) % n], domain))
        .collect();
    Problem::new(Optimization::Maximize, variables, constraints).expect("ring fixture is valid")
}

/// Two independent components: `P - Q` and `R - S - T`, minimized.
///
/// Each constraint costs `|x - y|`, so the optimum is 0 with equal values.
pub fn disconnected_problem() -> Problem {
    let domain = vec![0, 1, 2];
    let cost = |x: Value, y: Value| Utility::of((x - y).abs() as f64);
    Problem::new(
        Optimization::Minimize,
        vec![
            Variable::new("P", domain.clone(), "left"),
            Variable::new("Q", domain.clone(), "left"),
            Variable::new("R", domain.clone(), "right"),
            Variable::new("S", domain.clone(), "right"),
            Variable::new("T", domain.clone(), "solo"),
        ],
        vec![
            pair("P", "Q", &domain, cost),
            pair("R", "S", &domain, cost),
            pair("S", "T", &domain, cost),
        ],
    )
    .expect("disconnected fixture is valid")
}

/// Parameters for [`random_problem`].
#[derive(Debug, Clone)]
pub struct RandomProblem {
    pub seed: u64,
    pub variables: usize,
    pub agents: usize,
    pub domain_size: usize,
    /// Extra edges added on top of the spanning tree.
    pub extra_edges: usize,
    /// Probability that an entry of a constraint is infeasible.
    pub infeasible_ratio: f64,
    pub optimization: Optimization,
}

impl Default for RandomProblem {
    fn default() -> Self {
        RandomProblem {
            seed: 7,
            variables: 8,
            agents: 4,
            domain_size: 3,
            extra_edges: 4,
            infeasible_ratio: 0.0,
            optimization: Optimization::Maximize,
        }
    }
}

/// A connected random binary problem, reproducible from the seed.
///
/// Variables `x00`, `x01`, ... are spread round-robin over `agents` agents.
/// A random spanning tree keeps the graph connected.
pub fn random_problem(params: &RandomProblem) -> Problem {
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let n = params.variables.max(1);
    let agents = params.agents.clamp(1, n);
    let domain: Vec<Value> = (0..params.domain_size.max(1) as Value).collect();
    let names: Vec<String> = (0..n).map(|i| format!("x{i:02}")).collect();
    let variables = names
        .iter()
        .enumerate()
        .map(|(i, name)| Variable::new(name.clone(), domain.clone(), format!("agent{}", i % agents)))
        .collect();

    let mut edges: Vec<(usize, usize)> = (1..n).map(|i| (rng.random_range(0..i), i)).collect();
    let max_edges = n * (n - 1) / 2;
    let mut attempts = 0;
    while edges.len() < (n - 1 + params.extra_edges).min(max_edges) && attempts < 1000 {
        attempts += 1;
        let a = rng.random_range(0..n);
        let b = rng.random_range(0..n);
        let edge = (a.min(b), a.max(b));
        if a != b && !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    let constraints = edges
        .iter()
        .map(|&(a, b)| {
            pair(&names[a], &names[b], &domain, |_, _| {
                if rng.random_bool(params.infeasible_ratio.clamp(0.0, 1.0)) {
                    params.optimization.infeasible()
                } else {
                    Utility::of(rng.random_range(0..10) as f64)
                }
            })
        })
        .collect::<Vec<_>>();
    Problem::new(params.optimization, variables, constraints).expect("random fixture is valid")
}
