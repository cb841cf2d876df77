mod config;
pub mod managed_db;
pub mod migrations;

pub use config::Config;
pub use managed_db::ManagedEventDb;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/timeblock[-dev]/` based on TIMEBLOCK_ENV.
///
/// Set TIMEBLOCK_ENV=dev to use the development data directory.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TIMEBLOCK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("timeblock-dev")
    } else {
        base_dir.join("timeblock")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
