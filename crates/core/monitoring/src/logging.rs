//! A set of utilities to enable logging configuration using tracing_subscriber.

use std::{error::Error, fmt::Write as _, io::IsTerminal, sync::Once};

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static SHIP_LOG_ENV_VAR: &str = "SHIP_LOG";

/// Initializes a tracing subscriber for logging.
///
/// `RUST_LOG` directives are honoured as-is. Every workspace crate not mentioned there logs at
/// the level given by `SHIP_LOG` (default `info`); everything else defaults to `error`.
pub fn init() {
    // Since we also use this function to enable logging in tests, wrap it in `Once` to prevent
    // multiple initializations.
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (env_filter, ship_log_level) = env_filter_and_log_level();

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .init();

        tracing::info!("log level: {}", ship_log_level);
    });
}

/// Renders the chain of `source()` errors below `err`, outermost first.
///
/// Meant for a structured log field next to the error itself:
/// `error = %err, error_source = logging::error_source(&err)`.
/// Returns an empty string when the error has no source.
pub fn error_source(err: &dyn Error) -> String {
    let mut rendered = String::new();
    let mut source = err.source();
    while let Some(cause) = source {
        if !rendered.is_empty() {
            rendered.push_str(": ");
        }
        let _ = write!(rendered, "{cause}");
        source = cause.source();
    }
    rendered
}

/// List of crates in the workspace.
const SHIP_CRATES: &[&str] = &["monitoring", "ship_abi", "ship_client", "shipsync"];

fn env_filter_and_log_level() -> (EnvFilter, String) {
    // Parse directives from RUST_LOG
    let log_filter = EnvFilter::builder().with_default_directive(LevelFilter::ERROR.into());
    let directive_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let mut env_filter = log_filter.parse_lossy(&directive_string);

    let log_level = std::env::var(SHIP_LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string());

    for crate_name in SHIP_CRATES {
        // Add directives for each workspace crate, if not overriden by RUST_LOG
        if directive_string.contains(&format!("{crate_name}=")) {
            continue;
        }
        match format!("{crate_name}={log_level}").parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(err) => {
                eprintln!("ignoring invalid {SHIP_LOG_ENV_VAR} value '{log_level}': {err}");
                break;
            }
        }
    }

    (env_filter, log_level)
}
