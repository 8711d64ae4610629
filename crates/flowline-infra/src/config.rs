//! Configuration loading for flowline.
//!
//! Reads `config.toml` from the data directory (`~/.flowline/` by default)
//! and deserializes it into [`FlowlineConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use flowline_types::config::FlowlineConfig;

pub const CONFIG_FILE: &str = "config.toml";

/// Load configuration from `{data_dir}/config.toml`.
///
/// A missing file yields the defaults silently; an unreadable or malformed
/// file logs a warning and also yields the defaults.
pub async fn load_config(data_dir: &Path) -> FlowlineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return FlowlineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return FlowlineConfig::default();
        }
    };

    match toml::from_str::<FlowlineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            FlowlineConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `FLOWLINE_DATA_DIR` environment variable
/// 2. `~/.flowline`
/// 3. `.flowline` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLOWLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".flowline");
    }

    PathBuf::from(".flowline")
}
