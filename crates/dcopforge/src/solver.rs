//! Solver entry points that hide the controller wiring.

use std::fs;
use std::path::Path;

use dcopforge_algorithms::Solution;
use dcopforge_config::DcopConfig;
use dcopforge_core::{DcopError, Problem, Result};
use dcopforge_runtime::{Controller, RunEvent};
use tokio::sync::mpsc::UnboundedSender;

/// Solves `problem` with `config`, returning once the run completes or
/// times out.
pub fn solve(problem: Problem, config: DcopConfig) -> Result<Solution> {
    #[cfg(feature = "console")]
    dcopforge_runtime::console::init();

    Controller::new(problem, config)?.solve()
}

/// Like [`solve`], streaming [`RunEvent`]s to `sender` as the run progresses.
pub fn solve_with_events(
    problem: Problem,
    config: DcopConfig,
    sender: UnboundedSender<RunEvent>,
) -> Result<Solution> {
    #[cfg(feature = "console")]
    dcopforge_runtime::console::init();

    Controller::new(problem, config)?.solve_with_events(sender)
}

/// Loads a problem from a `.toml`, `.yaml` or `.yml` file.
pub fn load_problem(path: impl AsRef<Path>) -> Result<Problem> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => problem_from_yaml_str(&contents),
        Some("toml") => problem_from_toml_str(&contents),
        _ => Err(DcopError::Configuration(format!(
            "unknown problem format for {}, expected .toml, .yaml or .yml",
            path.display()
        ))),
    }
}

pub fn problem_from_toml_str(s: &str) -> Result<Problem> {
    let problem: Problem =
        toml::from_str(s).map_err(|e| DcopError::Configuration(format!("problem: {e}")))?;
    problem.validate()?;
    Ok(problem)
}

pub fn problem_from_yaml_str(s: &str) -> Result<Problem> {
    let problem: Problem =
        serde_yaml::from_str(s).map_err(|e| DcopError::Configuration(format!("problem: {e}")))?;
    problem.validate()?;
    Ok(problem)
}
