pub mod license;
pub mod resolve;
pub mod serve;

use std::path::PathBuf;

use clap::ArgMatches;
use tracing_subscriber::EnvFilter;
use wayfarer_runtime::config::{AppConfig, LogFormat, LoggingConfig};
use wayfarer_runtime::ConfigError;

/// Read the config named by `--config`, or the default file, plus environment
pub fn read_config(matches: &ArgMatches) -> Result<AppConfig, ConfigError> {
    let path = matches.get_one::<String>("config").map(PathBuf::from);
    AppConfig::read(path.as_deref())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    if let Err(e) = result {
        eprintln!("⚠️  Logging already initialised: {}", e);
    }
}
