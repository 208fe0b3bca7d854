//! Error types for the expense ETL pipeline.
//!
//! Errors are grouped by concern:
//!
//! - [`TableError`] - reading/writing delimited tables, missing columns (schema errors)
//! - [`ArchiveError`] - statement archives and their storage paths
//! - [`ConfigError`] - environment and CLI configuration
//! - [`QueryError`] - read-side lookups over produced tables
//! - [`PipelineError`] - top-level stage orchestration
//!
//! Lower-level errors convert into [`PipelineError`] through `From`,
//! so `?` works across stage boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Errors reading or writing a delimited table.
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to read or write the file.
    #[error("Table IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited content.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Content could not be decoded.
    #[error("Failed to decode content as {0}")]
    Encoding(String),

    /// No header row.
    #[error("Table '{0}' has no header row")]
    NoHeaders(String),

    /// Required columns are entirely absent.
    #[error("Table '{table}' is missing required columns {missing:?} (found {found:?})")]
    Schema {
        table: String,
        missing: Vec<String>,
        found: Vec<String>,
    },
}

// =============================================================================
// Archive Errors
// =============================================================================

/// Errors from statement archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Failed to open the archive.
    #[error("Archive IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unsupported archive.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Year/quarter cannot be inferred from the storage path.
    #[error("Cannot infer year/quarter from path: {}", path.display())]
    PathInference { path: PathBuf },

    /// Table inside the archive could not be parsed.
    #[error("Archive table error: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors building the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be interpreted.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors from read-side lookups.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Page or limit out of range.
    #[error("Invalid page request: page={page}, limit={limit} (page >= 1, 1 <= limit <= {max_limit})")]
    InvalidPage {
        page: usize,
        limit: usize,
        max_limit: usize,
    },

    /// Unknown operator.
    #[error("Operator not found: {0}")]
    NotFound(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level errors that abort a stage, and therefore the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Table error (includes schema errors).
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Archive error (includes path inference errors).
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Query error.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// IO error outside table/archive handling.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON report serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream format drift under the strict policy.
    #[error("Source format drift in {source_name}: {detail}")]
    SourceFormatDrift { source_name: String, detail: String },

    /// A stage input file does not exist.
    #[error("Stage '{stage}' input not found: {}", path.display())]
    MissingInput { stage: String, path: PathBuf },

    /// A stage produced no rows where at least one was expected.
    #[error("Stage '{stage}' produced no rows: {reason}")]
    EmptyResult { stage: String, reason: String },
}

impl PipelineError {
    /// True for errors caused by missing required columns.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Table(TableError::Schema { .. })
                | PipelineError::Archive(ArchiveError::Table(TableError::Schema { .. }))
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for queries.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let table_err = TableError::NoHeaders("registry".into());
        let pipeline_err: PipelineError = table_err.into();
        assert!(pipeline_err.to_string().contains("registry"));

        let archive_err = ArchiveError::PathInference {
            path: PathBuf::from("raw/statements.zip"),
        };
        let pipeline_err: PipelineError = archive_err.into();
        assert!(pipeline_err.to_string().contains("raw/statements.zip"));
    }

    #[test]
    fn test_schema_error_detection() {
        let err: PipelineError = TableError::Schema {
            table: "consolidated".into(),
            missing: vec!["taxId".into()],
            found: vec!["foo".into()],
        }
        .into();
        assert!(err.is_schema_error());
        assert!(err.to_string().contains("taxId"));

        let err = PipelineError::EmptyResult {
            stage: "consolidate".into(),
            reason: "no archives".into(),
        };
        assert!(!err.is_schema_error());
    }
}
