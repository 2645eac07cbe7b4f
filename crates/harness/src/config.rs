//! Harness configuration

use std::path::PathBuf;

use fixsim_model::NetworkConfig;

use crate::error::{HarnessError, Result};

/// Where golden data and parameters live, and which cases to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Directory holding one subdirectory per case
    pub data_dir: PathBuf,

    /// Directory holding the layer weight files
    pub params_dir: PathBuf,

    /// JSON network description; the reference network when unset
    pub network_config: Option<PathBuf>,

    /// Case directory names under `data_dir`
    pub cases: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            params_dir: PathBuf::from("data/parameters"),
            network_config: None,
            cases: (1..=8).map(|i| format!("im{i}")).collect(),
        }
    }
}

impl HarnessConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FIXSIM_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("FIXSIM_PARAMS_DIR") {
            config.params_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("FIXSIM_NETWORK_CONFIG") {
            config.network_config = Some(PathBuf::from(path));
        }

        if let Ok(cases) = std::env::var("FIXSIM_CASES") {
            config.cases = parse_cases(&cases);
        }

        config
    }

    /// Load the configured network description
    pub fn network(&self) -> Result<NetworkConfig> {
        match &self.network_config {
            Some(path) => Ok(NetworkConfig::from_json_file(path)?),
            None => Ok(NetworkConfig::reference()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cases.is_empty() {
            return Err(HarnessError::InvalidInput("no cases configured".into()));
        }
        Ok(())
    }
}

/// Split a comma-separated case list, dropping empty entries
pub(crate) fn parse_cases(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.params_dir, PathBuf::from("data/parameters"));
        assert_eq!(config.cases.len(), 8);
        assert_eq!(config.cases[0], "im1");
        assert_eq!(config.cases[7], "im8");
        assert_eq!(config.network().unwrap(), NetworkConfig::reference());
    }

    #[test]
    fn test_parse_cases() {
        assert_eq!(parse_cases("im1, im3,,im9 "), vec!["im1", "im3", "im9"]);
        assert!(parse_cases(" , ").is_empty());
    }

    #[test]
    fn test_empty_cases_rejected() {
        let config = HarnessConfig {
            cases: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HarnessError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_network_file() {
        let config = HarnessConfig {
            network_config: Some(PathBuf::from("/nonexistent/network.json")),
            ..Default::default()
        };
        assert!(matches!(config.network(), Err(HarnessError::Model(_))));
    }
}
