//! TOML configuration for the inline cache layer

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use otter_vm_feedback::state::MAX_POLYMORPHIC_CAPACITY;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config '{path}': {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Inline cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IcConfig {
    /// Shapes a polymorphic site holds before going megamorphic
    pub polymorphic_capacity: usize,

    /// Maximum nesting of accessor and trap calls
    pub max_call_depth: usize,

    /// Capacity of the default write barrier buffer
    pub barrier_buffer_size: usize,
}

impl Default for IcConfig {
    fn default() -> Self {
        Self {
            polymorphic_capacity: 4,
            max_call_depth: 256,
            barrier_buffer_size: 1024,
        }
    }
}

impl IcConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, falling back to defaults on any error.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "using default IC configuration");
                Self::default()
            }
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_POLYMORPHIC_CAPACITY).contains(&self.polymorphic_capacity) {
            return Err(ConfigError::Invalid(format!(
                "polymorphic_capacity must be in 1..={MAX_POLYMORPHIC_CAPACITY}, got {}",
                self.polymorphic_capacity
            )));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be positive".into()));
        }
        if self.barrier_buffer_size == 0 {
            return Err(ConfigError::Invalid("barrier_buffer_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = IcConfig::from_toml_str("polymorphic_capacity = 2").unwrap();
        assert_eq!(config.polymorphic_capacity, 2);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_out_of_range_capacity() {
        let err = IcConfig::from_toml_str("polymorphic_capacity = 9").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(matches!(
            IcConfig::from_toml_str("max_call_depth = \"deep\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_call_depth = 8\nbarrier_buffer_size = 16").unwrap();
        let config = IcConfig::load(file.path()).unwrap();
        assert_eq!(config.max_call_depth, 8);
        assert_eq!(config.barrier_buffer_size, 16);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = IcConfig::load_or_default(Some(&dir.path().join("absent.toml")));
        assert_eq!(config, IcConfig::default());
    }
}
