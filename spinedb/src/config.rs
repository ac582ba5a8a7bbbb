//! Engine configuration module.
//!
//! Tuning knobs for a [`Database`](crate::storage::Database), loaded from
//! environment variables by the CLI or built directly by embedders.
//!
//! # Environment Variables
//!
//! - `SPINEDB_MAX_BLOCK_ENTRIES`: Maximum entries per block node (default: `64`, range `4..=65536`)
//! - `SPINEDB_INLINE_LIMIT`: Largest key or value stored inside a node (default: `128`)
//! - `SPINEDB_SYNC_ON_COMMIT`: Flush to stable storage on every commit (default: `true`)
//!
//! # Invariants
//!
//! - `max_block_entries >= MIN_BLOCK_ENTRIES`, so a split always yields
//!   blocks with at least two entries
//! - `max_block_entries <= MAX_BLOCK_ENTRIES`, so a block's entry count
//!   always fits its `u32` prefix

/// Engine configuration.
///
/// None of these values are recorded in the file. A database written with
/// one fan-out can be reopened with another; existing blocks stay as they
/// are and new blocks follow the new limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of entries in a block node before it is split.
    pub max_block_entries: usize,
    /// Keys and values up to this many bytes are stored inline in nodes.
    /// Longer ones get their own data block.
    pub inline_limit: usize,
    /// Whether each commit is flushed with `fdatasync` before it is visible.
    pub sync_on_commit: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_block_entries: Self::DEFAULT_MAX_BLOCK_ENTRIES,
            inline_limit: Self::DEFAULT_INLINE_LIMIT,
            sync_on_commit: true,
        }
    }
}

impl EngineConfig {
    /// Default block fan-out.
    pub const DEFAULT_MAX_BLOCK_ENTRIES: usize = 64;
    /// Smallest fan-out accepted.
    pub const MIN_BLOCK_ENTRIES: usize = 4;
    /// Largest fan-out accepted.
    pub const MAX_BLOCK_ENTRIES: usize = 1 << 16;
    /// Default inline threshold in bytes.
    pub const DEFAULT_INLINE_LIMIT: usize = 128;

    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration using `lookup` to fetch each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_block_entries = match lookup("SPINEDB_MAX_BLOCK_ENTRIES") {
            Some(value) => parse_usize("SPINEDB_MAX_BLOCK_ENTRIES", &value)?,
            None => Self::DEFAULT_MAX_BLOCK_ENTRIES,
        };
        let inline_limit = match lookup("SPINEDB_INLINE_LIMIT") {
            Some(value) => parse_usize("SPINEDB_INLINE_LIMIT", &value)?,
            None => Self::DEFAULT_INLINE_LIMIT,
        };
        let sync_on_commit = match lookup("SPINEDB_SYNC_ON_COMMIT") {
            Some(value) => parse_bool("SPINEDB_SYNC_ON_COMMIT", &value)?,
            None => true,
        };

        let config = Self {
            max_block_entries,
            inline_limit,
            sync_on_commit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can be used to build trees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_entries < Self::MIN_BLOCK_ENTRIES {
            return Err(ConfigError::InvalidValue {
                name: "SPINEDB_MAX_BLOCK_ENTRIES".to_string(),
                message: format!(
                    "{} is below the minimum of {}",
                    self.max_block_entries,
                    Self::MIN_BLOCK_ENTRIES
                ),
            });
        }
        if self.max_block_entries > Self::MAX_BLOCK_ENTRIES {
            return Err(ConfigError::InvalidValue {
                name: "SPINEDB_MAX_BLOCK_ENTRIES".to_string(),
                message: format!(
                    "{} is above the maximum of {}",
                    self.max_block_entries,
                    Self::MAX_BLOCK_ENTRIES
                ),
            });
        }
        Ok(())
    }
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a non-negative integer"),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_block_entries, 64);
        assert_eq!(config.inline_limit, 128);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SPINEDB_MAX_BLOCK_ENTRIES", "8"),
            ("SPINEDB_INLINE_LIMIT", " 0 "),
            ("SPINEDB_SYNC_ON_COMMIT", "off"),
        ])
        .expect("config");
        assert_eq!(
            config,
            EngineConfig {
                max_block_entries: 8,
                inline_limit: 0,
                sync_on_commit: false,
            }
        );
    }

    #[test]
    fn test_fan_out_below_minimum() {
        let err = load(&[("SPINEDB_MAX_BLOCK_ENTRIES", "3")]).expect_err("too small");
        assert_eq!(
            err.to_string(),
            "invalid value for SPINEDB_MAX_BLOCK_ENTRIES: 3 is below the minimum of 4"
        );
    }

    #[test]
    fn test_fan_out_above_maximum() {
        assert!(load(&[("SPINEDB_MAX_BLOCK_ENTRIES", "65536")]).is_ok());
        let err = load(&[("SPINEDB_MAX_BLOCK_ENTRIES", "65537")]).expect_err("too large");
        assert_eq!(
            err.to_string(),
            "invalid value for SPINEDB_MAX_BLOCK_ENTRIES: 65537 is above the maximum of 65536"
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("SPINEDB_INLINE_LIMIT", "-1")]).is_err());
        assert!(load(&[("SPINEDB_MAX_BLOCK_ENTRIES", "lots")]).is_err());
        let err = load(&[("SPINEDB_SYNC_ON_COMMIT", "maybe")]).expect_err("bad bool");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "SPINEDB_SYNC_ON_COMMIT".to_string(),
                message: "'maybe' is not a boolean".to_string(),
            }
        );
    }
}
