//! Console logging setup.
//!
//! ## Log Levels
//!
//! - **INFO**: Run lifecycle (start, agents ready, finish, timeout)
//! - **DEBUG**: Protocol progress (elections, pseudotree nodes, UTIL/VALUE)
//! - **TRACE**: Every dispatched and sent message

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_DIRECTIVE: &str = "dcopforge=info";

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times - only the first call has effect. `RUST_LOG`
/// overrides the default `dcopforge=info` filter.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::builder()
            .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| directives()));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init();
    });
}

// The crates log under their own targets; `dcopforge` alone only matches
// the facade.
fn directives() -> String {
    let mut directives = DEFAULT_DIRECTIVE.to_string();
    for target in ["dcopforge_comm", "dcopforge_algorithms", "dcopforge_runtime"] {
        directives.push_str(&format!(",{target}=info"));
    }
    directives
}
