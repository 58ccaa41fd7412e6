use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level. Returns `false` if a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();

    if installed {
        info!(level = %config.level, "Logging initialized");
    }
    installed
}
