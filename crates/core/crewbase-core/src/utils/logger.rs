//! Logging utilities

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when neither `RUST_LOG` nor `CREWBASE_LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Resolve the filter directive used by [`init_logging`]
pub fn log_level() -> String {
    std::env::var("CREWBASE_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

/// Initialize the global logging system
///
/// `RUST_LOG` wins over `CREWBASE_LOG_LEVEL`. Output goes to stderr so
/// command output on stdout stays machine readable. Calling this twice is
/// harmless; the second subscriber is ignored.
pub fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level().into());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
