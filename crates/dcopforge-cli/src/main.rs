//! # DCOPForge CLI
//!
//! - `dcopforge solve PROBLEM [--config FILE] [--timeout SECS] [--daemon ADDR]...`
//!   solves a problem file and prints the assignment and run statistics.
//! - `dcopforge daemon [--listen ADDR]` serves agents for remote controllers.
//!
//! Logging follows `RUST_LOG`, defaulting to `dcopforge=info`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dcopforge::{console, load_problem, Daemon, DcopConfig, DcopError, Result, Solution};
use tracing::{error, info};

/// Distributed constraint optimization with DPOP
#[derive(Parser)]
#[command(name = "dcopforge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem file (.toml, .yaml or .yml)
    Solve {
        /// Problem to solve
        #[arg(value_name = "PROBLEM")]
        problem: PathBuf,

        /// Run configuration (.toml, .yaml or .yml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Global timeout in seconds, overriding the configuration
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Daemon to deploy agents on; repeat for several hosts
        #[arg(long = "daemon", value_name = "ADDR")]
        daemons: Vec<String>,

        /// Measure simulated time instead of wall-clock time
        #[arg(long)]
        simulated: bool,
    },

    /// Serve agents for remote controllers
    Daemon {
        /// Address to listen on
        #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:9000")]
        listen: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    console::init();

    let result = match cli.command {
        Commands::Solve {
            problem,
            config,
            timeout,
            daemons,
            simulated,
        } => solve(&problem, config.as_deref(), timeout, daemons, simulated),
        Commands::Daemon { listen } => serve(&listen),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dcopforge failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DcopConfig> {
    let Some(path) = path else {
        return Ok(DcopConfig::default());
    };
    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => DcopConfig::from_yaml_file(path)?,
        _ => DcopConfig::load(path)?,
    };
    Ok(config)
}

fn solve(
    problem: &Path,
    config: Option<&Path>,
    timeout: Option<u64>,
    daemons: Vec<String>,
    simulated: bool,
) -> Result<()> {
    let problem = load_problem(problem)?;
    let mut config = load_config(config)?;
    if let Some(seconds) = timeout {
        config = config.with_timeout_secs(seconds);
    }
    if !daemons.is_empty() {
        config = config.with_daemons(daemons);
    }
    if simulated {
        config = config.with_simulated_time(true);
    }
    let solution = dcopforge::solve(problem, config)?;
    print_solution(&solution);
    if solution.complete {
        Ok(())
    } else {
        Err(DcopError::InvalidState("run did not complete".to_string()))
    }
}

fn print_solution(solution: &Solution) {
    let stats = &solution.statistics;
    match solution.utility {
        Some(utility) if solution.is_feasible() => println!("utility: {utility}"),
        Some(_) => println!("utility: infeasible"),
        None => println!("utility: unknown"),
    }
    if let Some(true_utility) = solution.true_utility {
        println!("true utility: {true_utility}");
    }
    println!("complete: {}", solution.complete);
    if solution.timed_out {
        println!("timed out: true");
    }
    println!("assignment:");
    for (variable, value) in &solution.assignment {
        println!("  {variable} = {value}");
    }
    println!("agents: {}", stats.agent_count());
    println!("messages: {} ({} bytes)", stats.message_count(), stats.message_size());
    println!("constraint checks: {} (NCCCs: {})", stats.constraint_checks, stats.ncccs);
    if let Some(width) = stats.tree_width {
        println!("pseudotree width: {width}");
    }
    match stats.simulated_time {
        Some(time) => println!("simulated time: {time}"),
        None => println!("wall time: {:?}", stats.wall_time),
    }
}

fn serve(listen: &str) -> Result<()> {
    let daemon = Daemon::bind(listen)?;
    info!(address = %daemon.local_addr(), "daemon ready");
    daemon.serve()
}
