//! Defines the standard command-line arguments of the trading binaries.
//!
//! Every flag has a default so the service starts with no arguments at all; the
//! configuration file and environment variables supply everything else.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Holds the standard configuration parameters parsed from the command line.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct CommonArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the data directory (for state saving)
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Overrides the configured log level (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,
}

impl CommonArgs {
    /// Parses an explicit argument list. Used by tests and embedding binaries.
    pub fn parse_args(args: Vec<String>) -> Self {
        CommonArgs::parse_from(args)
    }

    pub fn get_config_path(&self) -> Option<PathBuf> {
        self.config.clone()
    }

    /// Returns the path to the data directory.
    ///
    /// This directory is used for runtime state persistence (e.g. `portfolio_history.json`).
    pub fn get_data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn get_log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CommonArgs::parse_args(vec!["trader".into()]);
        assert_eq!(args.get_config_path(), None);
        assert_eq!(args.get_data_dir(), PathBuf::from("./data"));
        assert_eq!(args.get_log_level(), None);
    }

    #[test]
    fn test_overrides() {
        let args = CommonArgs::parse_args(vec![
            "trader".into(),
            "--config".into(),
            "config/paper.toml".into(),
            "--log-level".into(),
            "debug".into(),
        ]);
        assert_eq!(args.get_config_path(), Some(PathBuf::from("config/paper.toml")));
        assert_eq!(args.get_log_level(), Some("debug"));
    }
}
