//! Index engine configuration.
//!
//! # Environment Variables
//!
//! - `XBASE_STRICT_KEY_TYPES`: comparing keys of different kinds is an
//!   error (default: `true`); `false` restores the legacy "mixed kinds sort
//!   as less" behaviour
//! - `XBASE_SYNC_ON_FLUSH`: sync the file after header writes
//!   (default: `false`)
//!
//! Flags accept `1`/`0`, `true`/`false`, `yes`/`no` and `on`/`off` in any
//! letter case.

use crate::index::KeyComparison;

/// Settings shared by every index opened with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexConfig {
    /// How keys of different kinds compare.
    pub key_comparison: KeyComparison,
    /// Whether header writes are followed by a sync.
    pub sync_on_flush: bool,
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

impl IndexConfig {
    pub const STRICT_KEY_TYPES_VAR: &'static str = "XBASE_STRICT_KEY_TYPES";
    pub const SYNC_ON_FLUSH_VAR: &'static str = "XBASE_SYNC_ON_FLUSH";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to something that is not a flag.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let strict = load_flag(&lookup, Self::STRICT_KEY_TYPES_VAR, true)?;
        let sync_on_flush = load_flag(&lookup, Self::SYNC_ON_FLUSH_VAR, false)?;

        Ok(Self {
            key_comparison: if strict {
                KeyComparison::Strict
            } else {
                KeyComparison::Lenient
            },
            sync_on_flush,
        })
    }
}

fn load_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    lookup(name).map_or(Ok(default), |value| parse_flag(name, &value))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a flag (expected true or false)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_default_values() {
        let config = IndexConfig::default();
        assert_eq!(config.key_comparison, KeyComparison::Strict);
        assert!(!config.sync_on_flush);
        assert_eq!(IndexConfig::from_lookup(lookup(&[])), Ok(config));
    }

    #[test]
    fn test_flags_from_lookup() {
        let config = IndexConfig::from_lookup(lookup(&[
            ("XBASE_STRICT_KEY_TYPES", "No"),
            ("XBASE_SYNC_ON_FLUSH", " 1 "),
        ]))
        .expect("config");
        assert_eq!(config.key_comparison, KeyComparison::Lenient);
        assert!(config.sync_on_flush);
    }

    #[test]
    fn test_invalid_flag() {
        let error = IndexConfig::from_lookup(lookup(&[("XBASE_SYNC_ON_FLUSH", "maybe")]))
            .expect_err("invalid");
        assert_eq!(
            error.to_string(),
            "invalid value for XBASE_SYNC_ON_FLUSH: 'maybe' is not a flag (expected true or false)"
        );
    }
}
