//! Mapper configuration and builder

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::env;

use crate::error::{ModelError, ModelResult};

/// Configuration shared by every model class defined through a [`crate::Stash`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct StashConfig {
    /// Whether lifecycle hooks maintain identity maps and `get` consults them
    #[builder(getter, default = "true")]
    pub identity_map: bool,

    /// Prefix prepended to every store key (`"<prefix>:users:1"`)
    #[builder(getter, default)]
    pub key_prefix: Option<String>,
}

impl Default for StashConfig {
    fn default() -> Self {
        StashConfig::builder()
            .identity_map(true)
            .key_prefix(None)
            .build()
            .unwrap()
    }
}

// Add convenience methods to the generated builder
impl StashConfigBuilder {
    pub fn without_identity_map(self) -> Self {
        self.identity_map(false)
    }

    pub fn prefix<S: Into<String>>(self, prefix: S) -> Self {
        self.key_prefix(Some(prefix.into()))
    }

    pub fn build_config(self) -> StashConfig {
        self.build_with_defaults().unwrap()
    }
}

impl StashConfig {
    /// Load configuration from `STASH_IDENTITY_MAP` and `STASH_KEY_PREFIX`,
    /// falling back to defaults for unset variables
    pub fn from_env() -> ModelResult<Self> {
        let identity_map = match env::var("STASH_IDENTITY_MAP") {
            Ok(value) => parse_flag("STASH_IDENTITY_MAP", &value)?,
            Err(_) => true,
        };
        let key_prefix = env::var("STASH_KEY_PREFIX").ok().filter(|p| !p.is_empty());

        let config = StashConfig {
            identity_map,
            key_prefix,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if let Some(prefix) = &self.key_prefix {
            if prefix.trim().is_empty() || prefix.contains(char::is_whitespace) {
                return Err(ModelError::Configuration(format!(
                    "Key prefix '{}' must be non-empty and contain no whitespace",
                    prefix
                )));
            }
        }
        Ok(())
    }
}

fn parse_flag(var: &str, value: &str) -> ModelResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ModelError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            var, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StashConfig::default();
        assert!(config.identity_map);
        assert_eq!(config.key_prefix, None);
    }

    #[test]
    fn test_config_builder() {
        let config = StashConfig::builder()
            .without_identity_map()
            .prefix("app")
            .build_config();

        assert!(!config.identity_map);
        assert_eq!(config.key_prefix.as_deref(), Some("app"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(parse_flag("X", " on ").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(matches!(
            parse_flag("X", "maybe"),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_blank_prefix() {
        let config = StashConfig {
            identity_map: true,
            key_prefix: Some("  ".to_string()),
        };
        assert!(config.validate().is_err());
    }
}
