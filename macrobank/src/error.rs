//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum MacrobankError {
    #[error("None of the candidate input files exist. Tried: {}",
        .tried.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    SourceNotFound { tried: Vec<PathBuf> },
    #[error("{message}. Found columns: {columns:?}")]
    Schema {
        message: String,
        columns: Vec<String>,
    },
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl MacrobankError {
    /// Convenience constructor carrying the full observed column list, to aid diagnosis of
    /// upstream data drift.
    pub fn schema(message: impl Into<String>, columns: &[&str]) -> Self {
        Self::Schema {
            message: message.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MacrobankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_not_found_lists_all_paths() {
        let err = MacrobankError::SourceNotFound {
            tried: vec!["a.csv".into(), "b/c.csv".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a.csv"));
        assert!(msg.contains("b/c.csv"));
    }

    #[test]
    fn test_schema_error_lists_columns() {
        let err = MacrobankError::schema("Could not identify country/year keys", &["foo", "bar"]);
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains("bar"));
    }
}
