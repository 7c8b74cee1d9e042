//! Error taxonomy for the ambient layers around the dispatcher.
//!
//! The dispatcher itself never fails: unset attributes resolve to
//! `Undefined` and the rejection path synthesizes a payload. Errors only
//! arise while loading configuration, encoding snapshots or journal
//! exports, and parsing interaction scripts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ERROR_INVALID_CONFIG: &str = "FE-ADAPTER-0001";
pub const ERROR_CONFIG_PARSE: &str = "FE-ADAPTER-0002";
pub const ERROR_SNAPSHOT_ENCODE: &str = "FE-ADAPTER-0003";
pub const ERROR_SCRIPT_PARSE: &str = "FE-ADAPTER-0004";
pub const ERROR_JOURNAL_ENCODE: &str = "FE-ADAPTER-0005";

/// Placeholder written into the `error_code` field of successful events.
pub const NO_ERROR: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AdapterError {
    #[error("invalid adapter config: `{field}` must not be empty")]
    InvalidConfig { field: String },
    #[error("failed to parse adapter config: {0}")]
    ConfigParse(String),
    #[error("failed to encode adapter snapshot: {0}")]
    SnapshotEncode(String),
    #[error("failed to parse interaction script: {0}")]
    ScriptParse(String),
    #[error("failed to encode interaction journal: {0}")]
    JournalEncode(String),
}

impl AdapterError {
    pub fn stable_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => ERROR_INVALID_CONFIG,
            Self::ConfigParse(_) => ERROR_CONFIG_PARSE,
            Self::SnapshotEncode(_) => ERROR_SNAPSHOT_ENCODE,
            Self::ScriptParse(_) => ERROR_SCRIPT_PARSE,
            Self::JournalEncode(_) => ERROR_JOURNAL_ENCODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_codes_are_distinct() {
        let errors = [
            AdapterError::InvalidConfig {
                field: "traceId".to_string(),
            },
            AdapterError::ConfigParse("x".to_string()),
            AdapterError::SnapshotEncode("x".to_string()),
            AdapterError::ScriptParse("x".to_string()),
            AdapterError::JournalEncode("x".to_string()),
        ];
        let mut codes: Vec<_> = errors.iter().map(AdapterError::stable_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn journal_encode_has_its_own_code() {
        let err = AdapterError::JournalEncode("bad utf-8".to_string());
        assert_eq!(err.stable_code(), ERROR_JOURNAL_ENCODE);
        assert_ne!(err.stable_code(), ERROR_SNAPSHOT_ENCODE);
        assert_eq!(
            err.to_string(),
            "failed to encode interaction journal: bad utf-8"
        );
    }

    #[test]
    fn display_names_the_field() {
        let err = AdapterError::InvalidConfig {
            field: "targetName".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid adapter config: `targetName` must not be empty"
        );
    }
}
