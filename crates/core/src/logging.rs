use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

pub type LoggingInitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs the global fmt subscriber described by `config`.
///
/// `RUST_LOG` directives, when set, take precedence over `logging.level`.
/// Returns an error instead of panicking when a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let filter = log_filter(&config.level, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

fn log_filter(level: &str, env_directives: Option<String>) -> EnvFilter {
    env_directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.trim().to_ascii_lowercase()))
}
