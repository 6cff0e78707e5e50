//! Logging with `tracing` and `tracing-subscriber`.
//!
//! The terminal is in raw mode behind the alternate screen while the app runs,
//! so log lines go to a file rather than stderr. `RUST_LOG` overrides the
//! configured level.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Destination file; logging is off when this is `None`
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_file: None,
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(layer)
        .try_init()
        .map_err(io::Error::other)
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_file_means_no_subscriber() {
        assert!(init_logging(&LogConfig::default()).is_ok());
    }

    #[test]
    fn test_unopenable_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LogConfig {
            level: Level::DEBUG,
            // a directory cannot be opened for appending
            log_file: Some(dir.path().to_path_buf()),
        };
        assert!(init_logging(&config).is_err());
    }
}
