//! Global configuration types for flowline.
//!
//! `FlowlineConfig` represents the top-level `config.toml` in the data
//! directory. Every section and field has a default, so a partial file is
//! valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowlineConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

/// Limits applied by the workflow engine to every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Steps a single run may execute before aborting with a step-limit error.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Buffer size of the engine event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_steps() -> u32 {
    500
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Agent invocations a single chain run may make.
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
}

fn default_max_hops() -> u32 {
    25
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
        }
    }
}

/// Settings for the built-in HTTP tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = FlowlineConfig::default();
        assert_eq!(config.engine.max_steps, 500);
        assert_eq!(config.engine.event_capacity, 256);
        assert_eq!(config.chain.max_hops, 25);
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: FlowlineConfig = toml::from_str("[engine]\nmax_steps = 10\n").unwrap();
        assert_eq!(config.engine.max_steps, 10);
        assert_eq!(config.engine.event_capacity, 256);
        assert_eq!(config.chain.max_hops, 25);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: FlowlineConfig = toml::from_str("").unwrap();
        assert_eq!(config, FlowlineConfig::default());
    }
}
