//! Error types for the KPI ingestion and derivation pipeline.
//!
//! - [`CsvError`] - the upload is not readable delimited data (fatal)
//! - [`SchemaError`] - a required canonical column is missing (fatal)
//! - [`ConfigError`] - alias tables and environment configuration
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Non-fatal conditions are not errors: they are reported as
//! [`PipelineWarning`]s and only degrade the affected view.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Row context
// =============================================================================

/// A problem tied to one line of the upload.
///
/// Used both for fatal parse failures and for rows dropped during coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl RowIssue {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// The upload could not be read as delimited tabular data.
///
/// The user has to re-upload; nothing downstream runs.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Row-level structural problem (ragged row, broken quoting).
    #[error("Invalid CSV format: {0}")]
    Malformed(RowIssue),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Schema violation. Fail-fast: only the first missing column is reported.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading alias tables or environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Alias file does not match the embedded schema.
    #[error("Invalid column alias table: {}", .0.join("; "))]
    InvalidAliases(Vec<String>),

    /// Alias table names a column the pipeline does not know.
    #[error("Unknown canonical column in alias table: {0}")]
    UnknownCanonical(String),

    /// Environment variable holds an unusable value.
    #[error("Invalid value for {key}: '{value}' ({message})")]
    InvalidEnv {
        key: String,
        value: String,
        message: String,
    },

    /// IO error.
    #[error("Config IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Config JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Everything here is fatal to the run and surfaced verbatim to the user.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Schema error.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Threshold outside the range the controls allow.
    #[error("{name} threshold {value} is outside [{min}, {max}]")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Date window with start after end.
    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No session with that id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Warnings
// =============================================================================

/// Pipeline stage that produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GeoSanitizer,
    Filter,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::GeoSanitizer => "geo sanitizer",
            Stage::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Non-fatal condition local to one view.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A requested chart column does not exist; that chart is empty.
    #[error("Column '{column}' not found")]
    UnknownColumn { column: String },

    /// A stage left zero rows; dependent views show "no data".
    #[error("No data left after {stage}")]
    EmptyResult { stage: Stage },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> PipelineError
        let csv_err = CsvError::EmptyFile;
        let pipeline_err: PipelineError = csv_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // SchemaError -> PipelineError keeps the message verbatim
        let schema_err = SchemaError::MissingColumn("lat".into());
        let pipeline_err: PipelineError = schema_err.into();
        assert_eq!(pipeline_err.to_string(), "Missing required column: lat");
    }

    #[test]
    fn test_row_issue_format() {
        let issue = RowIssue::new(5, "not a number")
            .with_column("availability")
            .with_value("abc");

        let msg = issue.to_string();
        assert!(msg.contains("Line 5"));
        assert!(msg.contains("column 'availability'"));
        assert!(msg.contains("value 'abc'"));
    }

    #[test]
    fn test_warning_serialization() {
        let warning = PipelineWarning::EmptyResult { stage: Stage::Filter };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "empty_result");
        assert_eq!(json["stage"], "filter");
        assert_eq!(warning.to_string(), "No data left after filter");
    }

    #[test]
    fn test_threshold_error_format() {
        let err = PipelineError::InvalidThreshold {
            name: "availability",
            value: 80.0,
            min: 90.0,
            max: 100.0,
        };
        assert_eq!(err.to_string(), "availability threshold 80 is outside [90, 100]");
    }
}
