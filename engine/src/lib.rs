//! # Creative Sync - CSV to ad creative pipeline
//!
//! Creative Sync turns tabular campaign data into validated, templated ad
//! creatives and links each one to assets from a catalogue.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Normalize  │────▶│  Validate   │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (typed)    │     │  (rules)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                   │
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐           │
//! │  Creatives  │◀────│   Linker    │◀────│  Variables  │◀── [Transform]
//! │  (payloads) │     │  (assets)   │     │ (templates) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use creative_sync::{Pipeline, PipelineConfig, FilterRegistry};
//!
//! let config = PipelineConfig::from_json(&std::fs::read_to_string("pipeline.json")?)?;
//! let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None)?;
//! let output = pipeline.run_bytes(&std::fs::read("campaign.csv")?)?;
//! println!("{} creatives, {} blocked", output.stats.creatives, output.stats.blocked);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`models`] - Cell values, rows, issues and codes
//! - [`parser`] - CSV parsing with auto-detection
//! - [`normalize`] - Column names, type inference and coercion
//! - [`validation`] - Declarative row rules
//! - [`transform`] - Group-by aggregation and its static checks
//! - [`variables`] - `{field|filter}` templates and the filter registry
//! - [`creative`] - Asset selection and creative field constraints
//! - [`pipeline`] - End-to-end orchestration

// Core modules
pub mod error;
pub mod models;

// Ingestion
pub mod normalize;
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Rendering
pub mod creative;
pub mod variables;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, CsvError, CsvResult, FilterError, FilterResult, PipelineError, PipelineResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CellValue, ColumnType, EntityContext, EntityType, ErrorCode, FieldSchema, Row, ValidationIssue};

// =============================================================================
// Re-exports - CSV Parsing and normalization
// =============================================================================

pub use normalize::{analyze_columns, normalize_column_name, normalize_rows, ColumnAnalysis, NormalizedData};
pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv, preview_csv, write_csv,
    CsvOptions, ParsedCsv,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_row, validate_rows, RuleCheck, ValidationResult, ValidationRule};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    AggregationConfig, AggregationFunction, Condition, ConditionOperator, TransformConfig, TransformResult,
    TransformValidationResult,
};

// =============================================================================
// Re-exports - Variables
// =============================================================================

pub use variables::{extract_variables, Filter, FilterRegistry, SubstitutionResult, TemplateField, VariableEngine};

// =============================================================================
// Re-exports - Creative
// =============================================================================

pub use creative::{
    validate_creative_fields, CreativeAsset, CreativeLinker, CreativeMapping, CreativeSelectionRule, FieldConstraint,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{CreativePayload, Pipeline, PipelineConfig, PipelineOutput, PipelineStats};
