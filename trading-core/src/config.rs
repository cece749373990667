//! Layered configuration loading.
//!
//! Sources are applied in order, later ones winning:
//! 1. serde defaults declared on the target type
//! 2. an optional TOML file
//! 3. environment variables prefixed with `TRADING_`, nested keys separated by `__`
//!    (e.g. `TRADING_RISK__MAX_POSITION_SIZE=0.05`)

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

pub const ENV_PREFIX: &str = "TRADING";

/// Loads `T` from the layered sources.
///
/// # Arguments
///
/// * `path` - Optional configuration file. When given it must exist.
///
/// # Returns
///
/// * `Ok(T)` with every missing key filled from the serde defaults.
/// * `Err` if the file is missing or a value has the wrong type.
pub fn load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    load_with_prefix(path, ENV_PREFIX)
}

/// Same as [`load`] with a custom environment prefix.
pub fn load_with_prefix<T: DeserializeOwned>(path: Option<&Path>, prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(prefix)
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true),
    );

    let config = builder
        .build()
        .with_context(|| format!("Failed to build configuration (file: {:?})", path))?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default)]
        nested: Nested,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Nested {
        #[serde(default)]
        enabled: bool,
    }

    fn default_threshold() -> f64 {
        0.05
    }

    #[test]
    fn test_defaults_without_file() {
        let sample: Sample = load_with_prefix(None, "TRADING_CORE_TEST_EMPTY").unwrap();
        assert!((sample.threshold - 0.05).abs() < 1e-12);
        assert!(!sample.nested.enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("trading-core-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sample.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "threshold = 0.1\n[nested]\nenabled = true").unwrap();

        let sample: Sample = load_with_prefix(Some(&path), "TRADING_CORE_TEST_FILE").unwrap();
        assert!((sample.threshold - 0.1).abs() < 1e-12);
        assert!(sample.nested.enabled);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result: Result<Sample> =
            load_with_prefix(Some(Path::new("/nonexistent/trading.toml")), "TRADING_CORE_TEST");
        assert!(result.is_err());
    }
}
