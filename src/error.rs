// 🚨 Error taxonomy
//
// Only structural failures become errors. Field-level parse problems and
// missing columns are recovered during ingestion and show up in the stats.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for campaign-atlas operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader failure that is not a per-row problem
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encode/decode error outside the ledger files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A ledger file exists but cannot be read or parsed.
    /// The merger never proceeds with a partial ledger.
    #[error("Ledger {path} is unusable: {reason}")]
    Ledger { path: PathBuf, reason: String },

    /// Required input file is not present
    #[error("Source not found: {0}")]
    MissingSource(PathBuf),
}

impl Error {
    pub fn ledger(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Ledger {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures the serving boundary must report explicitly
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Ledger { .. } | Error::MissingSource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_message_names_path() {
        let err = Error::ledger("votos_data.json", "expected value at line 1");
        let msg = err.to_string();
        assert!(msg.contains("votos_data.json"));
        assert!(msg.contains("expected value"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_config_error_is_not_structural() {
        let err = Error::Config("region_code must not be empty".to_string());
        assert!(!err.is_structural());
    }
}
