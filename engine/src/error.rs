//! Error types for the creative pipeline.
//!
//! Only *configuration* and *input decoding* problems are errors here.
//! Malformed data (ragged CSV rows, values that fail coercion, unresolved
//! template variables) is reported as diagnostics alongside the output.
//!
//! - [`CsvError`] - undecodable CSV input
//! - [`ConfigError`] - author-time mistakes in transform, rule or linker config
//! - [`FilterError`] - failures raised by a template filter
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::models::ValidationIssue;

// =============================================================================
// CSV Errors
// =============================================================================

/// Fatal errors while reading CSV input.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read input.
    #[error("Failed to read input: {0}")]
    IoError(#[from] std::io::Error),

    /// Bytes could not be decoded with the detected encoding.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// The CSV writer rejected a record.
    #[error("Failed to write CSV: {0}")]
    WriteError(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in author-supplied configuration.
///
/// These are raised before any row is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Aggregation function name outside the closed set.
    #[error("Unknown aggregation function: {0}")]
    UnknownFunction(String),

    /// Condition operator outside the closed set.
    #[error("Unsupported condition operator: {0}")]
    UnsupportedOperator(String),

    /// Two aggregations (or an aggregation and a group key) share an output name.
    #[error("Duplicate output field: {0}")]
    DuplicateOutputField(String),

    /// Aggregation function needs a source field but none was given.
    #[error("Aggregation '{output}' ({function}) requires a sourceField")]
    MissingSourceField { output: String, function: String },

    /// COUNT_IF without a condition.
    #[error("Aggregation '{0}' (COUNT_IF) requires a condition")]
    MissingCondition(String),

    /// Transform has nothing to group by.
    #[error("groupBy must name at least one field")]
    EmptyGroupBy,

    /// A condition that can never be evaluated meaningfully.
    #[error("Invalid condition in '{owner}': {message}")]
    InvalidCondition { owner: String, message: String },

    /// A validation rule whose parameters cannot be applied.
    #[error("Invalid rule for '{field}': {message}")]
    InvalidRule { field: String, message: String },

    /// Two creative rules share an id.
    #[error("Duplicate creative rule id: {0}")]
    DuplicateRuleId(String),

    /// Malformed JSON configuration.
    #[error("Invalid configuration JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err.to_string())
    }
}

// =============================================================================
// Filter Errors
// =============================================================================

/// Errors raised by a template filter.
///
/// These never escape substitution; they become warnings (or errors for
/// required fields) on the substitution result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// No filter registered under this name.
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Filter cannot operate on this value.
    #[error("Filter '{filter}' cannot process value '{value}'")]
    InvalidInput { filter: String, value: String },

    /// A filter argument is malformed.
    #[error("Filter '{filter}': invalid argument '{arg}': {message}")]
    InvalidArgument {
        filter: String,
        arg: String,
        message: String,
    },

    /// A required filter argument is missing.
    #[error("Filter '{filter}' requires {expected} argument(s)")]
    MissingArgument { filter: String, expected: usize },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::pipeline::Pipeline::run`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The transform configuration failed static validation.
    #[error("Transform configuration is invalid: {}", summarize(.0))]
    InvalidTransform(Vec<ValidationIssue>),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("[{}] {}", i.code, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for filter application.
pub type FilterResult<T> = Result<T, FilterError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
