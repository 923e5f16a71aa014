// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// Typed configuration for the chat pipeline
//
// YAML file with three sections: server, limits, producer. Every field
// has a default, so an absent file or an empty document yields a fully
// working config. Validation rejects zero-sized windows and budgets up
// front rather than letting them surface as runtime misbehavior.

mod error;
mod source;

pub use error::ConfigError;
pub use source::{ConfigSource, FileSource, StringSource};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub producer: ProducerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Chat-message admission: higher throughput, short window.
    pub chat: WindowConfig,
    /// Auth-attempt admission: low throughput, long window.
    pub auth: WindowConfig,
}

/// One sliding-window policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerSettings {
    /// Delay between emitted increments, in milliseconds. Zero disables
    /// pacing; the value is cosmetic and not part of the protocol.
    pub pacing_ms: u64,
    /// Ceiling on waiting for the generation service, in milliseconds.
    pub generation_timeout_ms: u64,
    /// Maximum sanitized message length in characters.
    pub max_message_chars: usize,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            producer: ProducerSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3800 }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chat: WindowConfig {
                max_requests: 20,
                window_ms: 60_000,
            },
            auth: WindowConfig {
                max_requests: 5,
                window_ms: 300_000,
            },
        }
    }
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            pacing_ms: 50,
            generation_timeout_ms: 30_000,
            max_message_chars: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and validate a config from the given source.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw = source.load()?;
    let config: Config = serde_yaml::from_str(&raw)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    for (name, window) in [("chat", &config.limits.chat), ("auth", &config.limits.auth)] {
        if window.max_requests == 0 {
            return Err(ConfigError::Validation(format!(
                "limits.{name}.max_requests must be at least 1"
            )));
        }
        if window.window_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "limits.{name}.window_ms must be at least 1"
            )));
        }
    }
    if config.producer.max_message_chars == 0 {
        return Err(ConfigError::Validation(
            "producer.max_message_chars must be at least 1".to_string(),
        ));
    }
    if config.producer.generation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "producer.generation_timeout_ms must be at least 1".to_string(),
        ));
    }
    Ok(())
}
