//! Marketplace configuration.
//!
//! Configuration is fixed when a marketplace is deployed and read-only
//! afterwards. It names the custody account that holds escrowed funds and the
//! input limits enforced on every call.

use std::path::Path;

use encode_ledger::AccountId;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default maximum title length, in characters.
pub const DEFAULT_MAX_TITLE_LEN: usize = 64;

/// Default maximum description length, in unicode scalar values.
pub const DEFAULT_MAX_DESCRIPTION_LEN: usize = 256;

/// Default cap on proposals submitted against a single job.
pub const DEFAULT_MAX_PROPOSALS_PER_JOB: u64 = 256;

/// Limits enforced on user-supplied input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum job title length.
    pub max_title_len: usize,
    /// Maximum job or proposal description length.
    pub max_description_len: usize,
    /// Maximum number of proposals ever submitted to one job.
    pub max_proposals_per_job: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_title_len: DEFAULT_MAX_TITLE_LEN,
            max_description_len: DEFAULT_MAX_DESCRIPTION_LEN,
            max_proposals_per_job: DEFAULT_MAX_PROPOSALS_PER_JOB,
        }
    }
}

/// Main marketplace configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketConfig {
    /// Account on the host ledger that custodies escrowed funds.
    pub custody_account: AccountId,
    /// Input limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl MarketConfig {
    /// Configuration with default limits.
    #[must_use]
    pub fn new(custody_account: AccountId) -> Self {
        Self {
            custody_account,
            limits: LimitsConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
                path: path.as_ref().display().to_string(),
                source,
            })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_title_len == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_title_len must be greater than 0".to_string(),
            ));
        }

        if self.limits.max_description_len == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_description_len must be greater than 0".to_string(),
            ));
        }

        if self.limits.max_proposals_per_job == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_proposals_per_job must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            custody_account = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.encode-marketplace"
        "#;

        let config = MarketConfig::from_toml(toml).expect("should parse minimal config");

        assert_eq!(
            config.custody_account.as_str(),
            "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.encode-marketplace"
        );
        assert_eq!(config.limits, LimitsConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            custody_account = "escrow"

            [limits]
            max_title_len = 32
            max_description_len = 1024
            max_proposals_per_job = 8
        "#;

        let config = MarketConfig::from_toml(toml).expect("should parse full config");
        assert_eq!(config.limits.max_title_len, 32);
        assert_eq!(config.limits.max_description_len, 1024);
        assert_eq!(config.limits.max_proposals_per_job, 8);
    }

    #[test]
    fn test_partial_limits_use_defaults() {
        let toml = r#"
            custody_account = "escrow"

            [limits]
            max_title_len = 10
        "#;

        let config = MarketConfig::from_toml(toml).expect("should parse");
        assert_eq!(config.limits.max_title_len, 10);
        assert_eq!(config.limits.max_description_len, DEFAULT_MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn test_missing_custody_account_fails() {
        let result = MarketConfig::from_toml("[limits]\nmax_title_len = 10\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_custody_account_fails() {
        let result = MarketConfig::from_toml(r#"custody_account = "has space""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_limits_fail_validation() {
        for field in ["max_title_len", "max_description_len", "max_proposals_per_job"] {
            let toml = format!("custody_account = \"escrow\"\n[limits]\n{field} = 0\n");
            let result = MarketConfig::from_toml(&toml);
            assert!(
                matches!(result, Err(ConfigError::Invalid(ref msg)) if msg.contains(field)),
                "expected validation failure for {field}"
            );
        }
    }

    #[test]
    fn test_from_file() {
        let file = create_temp_config(
            r#"
            custody_account = "escrow"

            [limits]
            max_proposals_per_job = 3
        "#,
        );

        let config = MarketConfig::from_file(file.path()).expect("should load from file");
        assert_eq!(config.limits.max_proposals_per_job, 3);
    }

    #[test]
    fn test_from_missing_file() {
        let result = MarketConfig::from_file("/nonexistent/encode-market.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_defaults_validate() {
        let config = MarketConfig::new(AccountId::new("escrow").unwrap());
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_title_len, 64);
        assert_eq!(config.limits.max_description_len, 256);
    }
}
