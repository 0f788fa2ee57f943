//! Import configuration.
//!
//! Values come from environment variables (`JURIS_*` prefixed) with the
//! constants in [`crate::defaults`] as fallbacks:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `JURIS_IMPORT_BATCH_SIZE` | 50 |
//! | `JURIS_IN_CLAUSE_LIMIT` | 500 |
//! | `JURIS_MAX_ERROR_DETAILS` | 20 |
//!
//! ```
//! use juris_core::ImportConfig;
//!
//! let config = ImportConfig::default().with_batch_size(100);
//! assert!(config.validate().is_ok());
//! ```

use std::env;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};

/// Tunables for the import pipeline and bulk tag lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records per `insert_many` call.
    pub batch_size: usize,
    /// Largest id set per `IN (...)` lookup.
    pub in_clause_limit: usize,
    /// Error messages kept verbatim in the import result.
    pub max_error_details: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::IMPORT_BATCH_SIZE,
            in_clause_limit: defaults::IN_CLAUSE_LIMIT,
            max_error_details: defaults::MAX_ERROR_DETAILS,
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to the defaults; call [`validate`]
    /// afterwards to reject out-of-range ones.
    ///
    /// [`validate`]: ImportConfig::validate
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, fallback: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(fallback)
        };

        let config = Self {
            batch_size: read("JURIS_IMPORT_BATCH_SIZE", defaults::IMPORT_BATCH_SIZE),
            in_clause_limit: read("JURIS_IN_CLAUSE_LIMIT", defaults::IN_CLAUSE_LIMIT),
            max_error_details: read("JURIS_MAX_ERROR_DETAILS", defaults::MAX_ERROR_DETAILS),
        };
        debug!(
            batch_size = config.batch_size,
            in_clause_limit = config.in_clause_limit,
            max_error_details = config.max_error_details,
            "Loaded import config"
        );
        config
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Set the `IN (...)` chunk size.
    pub fn with_in_clause_limit(mut self, n: usize) -> Self {
        self.in_clause_limit = n;
        self
    }

    /// Set how many error messages are kept.
    pub fn with_max_error_details(mut self, n: usize) -> Self {
        self.max_error_details = n;
        self
    }

    /// Reject values that would stall or break the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.in_clause_limit == 0 {
            return Err(Error::Config(
                "in_clause_limit must be at least 1".to_string(),
            ));
        }
        // Postgres caps bind parameters at 65535 per statement.
        if self.in_clause_limit > 65_000 {
            return Err(Error::Config(format!(
                "in_clause_limit must be at most 65000, got {}",
                self.in_clause_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ImportConfig::from_lookup(|_| None);
        assert_eq!(config, ImportConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reads_overrides() {
        let config = ImportConfig::from_lookup(lookup_from(&[
            ("JURIS_IMPORT_BATCH_SIZE", "200"),
            ("JURIS_IN_CLAUSE_LIMIT", " 100 "),
            ("JURIS_MAX_ERROR_DETAILS", "5"),
        ]));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.in_clause_limit, 100);
        assert_eq!(config.max_error_details, 5);
    }

    #[test]
    fn test_unparseable_falls_back() {
        let config =
            ImportConfig::from_lookup(lookup_from(&[("JURIS_IMPORT_BATCH_SIZE", "lots")]));
        assert_eq!(config.batch_size, defaults::IMPORT_BATCH_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(ImportConfig::default()
            .with_batch_size(0)
            .validate()
            .is_err());
        assert!(ImportConfig::default()
            .with_in_clause_limit(0)
            .validate()
            .is_err());
        assert!(ImportConfig::default()
            .with_in_clause_limit(70_000)
            .validate()
            .is_err());
    }
}
