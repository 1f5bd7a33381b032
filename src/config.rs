//! Compile-run configuration.

use crate::ident::IdentifierStrategy;
use crate::version::IR_VERSION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for a single compile run.
///
/// The compiler output is a pure function of (source text, prior snapshot,
/// configuration); every knob here is therefore part of the cache key a
/// caller should use when memoizing artifacts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct CompileConfig {
    /// How source names map to SQL identifiers.
    pub identifier_strategy: IdentifierStrategy,
    /// Emit RLS blocks for tables carrying an `rls` annotation.
    pub enable_rls: bool,
    /// Version stamped into the snapshot.
    pub ir_version: String,
    /// `lock_timeout` the executor should apply to the transactional batch.
    pub lock_timeout_ms: u64,
    /// `statement_timeout` the executor should apply to the transactional batch.
    pub statement_timeout_ms: u64,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            identifier_strategy: IdentifierStrategy::Preserve,
            enable_rls: true,
            ir_version: IR_VERSION.to_string(),
            lock_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
        }
    }
}

impl CompileConfig {
    /// Load configuration from TOML text, filling omitted keys with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Toml(e.to_string()))
    }
}

/// Configuration loading errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Toml(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = CompileConfig::default();
        assert_eq!(cfg.identifier_strategy, IdentifierStrategy::Preserve);
        assert!(cfg.enable_rls);
        assert_eq!(cfg.ir_version, "1.0.0");
        assert_eq!(cfg.lock_timeout_ms, 5_000);
        assert_eq!(cfg.statement_timeout_ms, 30_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = CompileConfig::from_toml_str(
            r#"
            identifier_strategy = "snake_case"
            lock_timeout_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.identifier_strategy, IdentifierStrategy::SnakeCase);
        assert_eq!(cfg.lock_timeout_ms, 1_000);
        assert_eq!(cfg.statement_timeout_ms, 30_000);
        assert!(cfg.enable_rls);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(CompileConfig::from_toml_str("identifier_strategy = 3").is_err());
    }
}
