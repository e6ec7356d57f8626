//! Diagnostic logging setup.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global fmt subscriber on stderr. `RUST_LOG` wins over the
/// verbosity level when set.
pub fn init(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_for_verbosity(verbosity)))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), "warn");
        assert_eq!(level_for_verbosity(1), "info");
        assert_eq!(level_for_verbosity(2), "debug");
        assert_eq!(level_for_verbosity(3), "trace");
        assert_eq!(level_for_verbosity(9), "trace");
    }

    #[test]
    fn test_levels_are_valid_filters() {
        for verbosity in 0..4 {
            assert!(EnvFilter::try_new(level_for_verbosity(verbosity)).is_ok());
        }
    }
}
