//! Tracing subscriber setup shared by both binaries.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use crate::types::errors::SettingsError;

/// Installs the global fmt subscriber on stderr.
///
/// `RUST_LOG` wins over `configured_filter` (the settings value, which already
/// includes the `SMARTMARKS_LOG` override). Calling this twice keeps the first
/// subscriber.
pub fn init_tracing(configured_filter: &str) -> Result<(), SettingsError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_filter))
        .map_err(|e| SettingsError::InvalidValue(format!("invalid log filter: {}", e)))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        tracing::debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
