//! Brute-force reference solver.

use dcopforge_core::{Assignment, Problem, Utility};

/// Enumerates every complete assignment and returns the best utility with
/// the first assignment reaching it, in lexicographic order of variable
/// names and domain order.
///
/// Returns the infeasible sentinel (with the first assignment) when nothing
/// is feasible. Only meant for small problems.
pub fn brute_force(problem: &Problem) -> (Utility, Assignment) {
    let opt = problem.optimization;
    let mut vars: Vec<_> = problem.variables.iter().collect();
    vars.sort_by(|a, b| a.name.cmp(&b.name));

    let mut indices = vec![0usize; vars.len()];
    let mut best: Option<(Utility, Assignment)> = None;
    loop {
        let assignment: Assignment = vars
            .iter()
            .zip(&indices)
            .map(|(v, &i)| (v.name.clone(), v.domain[i]))
            .collect();
        let utility = problem.evaluate(&assignment).unwrap_or(opt.infeasible());
        let improves = match &best {
            None => true,
            Some((incumbent, _)) => opt.is_better(utility, *incumbent),
        };
        if improves {
            best = Some((utility, assignment));
        }

        // Odometer, last variable fastest.
        let mut k = vars.len();
        loop {
            if k == 0 {
                return best.unwrap_or((opt.infeasible(), Assignment::new()));
            }
            k -= 1;
            indices[k] += 1;
            if indices[k] < vars[k].domain.len() {
                break;
            }
            indices[k] = 0;
        }
    }
}
