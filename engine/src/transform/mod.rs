//! Transformation module.
//!
//! This module turns a row set into a derived virtual data source:
//! - Condition: operator set shared by COUNT_IF and creative rules
//! - Aggregation: functions applied to one group
//! - Grouper: rows to first-seen ordered groups
//! - Engine: group-by + aggregation
//! - Validator: static config checks and output schema

pub mod aggregation;
pub mod condition;
pub mod engine;
pub mod grouper;
pub mod validator;

pub use aggregation::{execute, lenient_number, AggregationConfig, AggregationFunction, AggregationOptions};
pub use condition::{Condition, ConditionOperator};
pub use engine::{run, GroupBy, TransformConfig, TransformResult};
pub use grouper::{group_rows, Group, GroupKey, Grouping};
pub use validator::{output_schema, validate, TransformValidationResult};

use crate::models::{EntityType, ErrorCode, ValidationIssue};

/// Issue attached to the transform itself rather than a source row.
pub(crate) fn transform_issue(field: &str, code: ErrorCode, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue::new(EntityType::Transform, "transform", "transform", field, code, message)
}
