//! Tracing subscriber setup for the binary

use crate::config::LoggingConfig;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. `verbose` raises the
/// booksmith crates to debug. Output goes to stderr so reports on stdout stay clean.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> Result<(), TryInitError> {
    let fallback = if verbose {
        format!("booksmith=debug,llm=debug,checkpoint=debug,tooling=debug,{}", config.level)
    } else {
        config.level.clone()
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()
    }
}
