//! Bridge configuration
//!
//! Parsed from TOML and installed once per process with [`configure`].
//! Without a call to `configure`, defaults apply.
//!
//! ```toml
//! [runtime]
//! worker_threads = 4
//! thread_name = "tether-worker"
//!
//! [conversion]
//! native_containers = true
//!
//! [reflection]
//! cache_members = true
//! ```

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Async runtime used for suspending calls and stream pumping
    pub runtime: RuntimeConfig,

    /// Default conversion options
    pub conversion: ConversionConfig,

    /// Reflective invocation
    pub reflection: ReflectionConfig,
}

/// Async runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker thread count (default: number of CPUs)
    pub worker_threads: usize,

    /// Worker thread name
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            thread_name: "tether-worker".to_string(),
        }
    }
}

/// Default container representation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversionConfig {
    /// Produce plain foreign containers
    pub native_containers: bool,

    /// Treat outermost values as plain foreign containers
    pub interop_compatible_containers: bool,
}

/// Reflection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Cache member lists per class
    pub cache_members: bool,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            cache_members: true,
        }
    }
}

impl BridgeConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML file
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.runtime.worker_threads == 0 {
            return Err(BridgeError::Config(
                "runtime.worker_threads must be at least 1".to_string(),
            ));
        }
        if self.runtime.thread_name.is_empty() {
            return Err(BridgeError::Config(
                "runtime.thread_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Conversion options implied by `[conversion]`
    pub fn default_options(&self) -> ConversionOptions {
        let mut options = ConversionOptions::NONE;
        if self.conversion.native_containers {
            options |= ConversionOptions::NATIVE_CONTAINER;
        }
        if self.conversion.interop_compatible_containers {
            options |= ConversionOptions::INTEROP_COMPATIBLE_CONTAINER;
        }
        options
    }
}

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Install the process-wide configuration. Fails if a configuration is
/// already in effect (installed, or defaulted by an earlier bridge call).
pub fn configure(config: BridgeConfig) -> BridgeResult<()> {
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| BridgeError::Config("bridge already configured".to_string()))?;
    tracing::debug!("bridge configuration installed");
    Ok(())
}

/// The configuration in effect
pub fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [runtime]
            worker_threads = 2
            thread_name = "bridge"

            [conversion]
            native_containers = true

            [reflection]
            cache_members = false
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.worker_threads, 2);
        assert_eq!(config.runtime.thread_name, "bridge");
        assert!(!config.reflection.cache_members);
        assert_eq!(config.default_options(), ConversionOptions::NATIVE_CONTAINER);
    }

    #[test]
    fn test_missing_sections_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert!(config.reflection.cache_members);
        assert_eq!(config.default_options(), ConversionOptions::NONE);
        assert!(config.runtime.worker_threads >= 1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = BridgeConfig::from_toml_str("[runtime]\nworker_threads = 0\n").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(BridgeConfig::from_toml_str("[runtime\n").is_err());
    }
}
