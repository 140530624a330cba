//! Group-by + aggregation over a row set.
//!
//! [`run`] produces a fresh row set (a virtual data source). The input rows
//! are never modified.
//!
//! # Example
//!
//! ```
//! use creative_sync::models::{CellValue, Row};
//! use creative_sync::transform::{run, TransformConfig};
//!
//! let rows = vec![
//!     Row::from_pairs([("country", "US"), ("spend", "10")]),
//!     Row::from_pairs([("country", "US"), ("spend", "5")]),
//!     Row::from_pairs([("country", "UK"), ("spend", "3")]),
//! ];
//! let config = TransformConfig::from_json(r#"{
//!     "groupBy": "country",
//!     "aggregations": [{"sourceField": "spend", "outputField": "total_spend", "function": "SUM"}],
//!     "includeGroupKey": true
//! }"#).unwrap();
//!
//! let result = run(&rows, &config).unwrap();
//! assert_eq!(result.rows[0].get("country"), Some(&CellValue::from("US")));
//! assert_eq!(result.rows[0].get("total_spend"), Some(&CellValue::Number(15.0)));
//! assert_eq!(result.rows[1].get("total_spend"), Some(&CellValue::Number(3.0)));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::aggregation::{excluded_count, execute, AggregationConfig, AggregationFunction};
use super::grouper::group_rows;
use super::transform_issue;
use crate::error::{ConfigError, ConfigResult};
use crate::models::{ErrorCode, Row, ValidationIssue};

// =============================================================================
// Configuration
// =============================================================================

/// A single group-by field or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupBy {
    Single(String),
    Multiple(Vec<String>),
}

impl GroupBy {
    pub fn fields(&self) -> &[String] {
        match self {
            GroupBy::Single(field) => std::slice::from_ref(field),
            GroupBy::Multiple(fields) => fields,
        }
    }
}

impl From<&str> for GroupBy {
    fn from(field: &str) -> Self {
        GroupBy::Single(field.to_string())
    }
}

impl From<Vec<String>> for GroupBy {
    fn from(fields: Vec<String>) -> Self {
        GroupBy::Multiple(fields)
    }
}

fn default_include_group_key() -> bool {
    true
}

/// Declarative transform: `groupBy` + aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    pub group_by: GroupBy,
    #[serde(default)]
    pub aggregations: Vec<AggregationConfig>,
    #[serde(default = "default_include_group_key")]
    pub include_group_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_field_prefix: Option<String>,
}

impl TransformConfig {
    pub fn new(group_by: impl Into<GroupBy>, aggregations: Vec<AggregationConfig>) -> Self {
        Self {
            group_by: group_by.into(),
            aggregations,
            include_group_key: true,
            output_field_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_field_prefix = Some(prefix.into());
        self
    }

    pub fn without_group_key(mut self) -> Self {
        self.include_group_key = false;
        self
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Output column name of an aggregation, prefix applied.
    pub fn output_name(&self, aggregation: &AggregationConfig) -> String {
        match &self.output_field_prefix {
            Some(prefix) => format!("{}{}", prefix, aggregation.output_field),
            None => aggregation.output_field.clone(),
        }
    }

    /// Columns of the produced rows, in order.
    pub fn output_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.include_group_key {
            fields.extend(self.group_by.fields().iter().cloned());
        }
        fields.extend(self.aggregations.iter().map(|a| self.output_name(a)));
        fields
    }

    /// Input columns the transform reads: group keys, aggregation sources
    /// and `COUNT_IF` condition fields.
    pub fn input_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.group_by.fields().to_vec();
        for aggregation in &self.aggregations {
            let condition = aggregation.options.condition.as_ref().map(|c| &c.field);
            for field in aggregation.source_field.iter().chain(condition) {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields
    }

    /// Structural checks that need no schema.
    pub fn check(&self) -> ConfigResult<()> {
        let keys = self.group_by.fields();
        if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::EmptyGroupBy);
        }
        for aggregation in &self.aggregations {
            aggregation.check()?;
        }
        let mut seen = HashSet::new();
        for name in self.output_fields() {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateOutputField(name));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Output of [`run`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub rows: Vec<Row>,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub group_count: usize,
    pub source_row_count: usize,
    /// Input row indices behind each output row.
    #[serde(skip)]
    pub members: Vec<Vec<usize>>,
}

/// Group `rows` and aggregate each group.
///
/// Fails only on malformed configuration. Data problems are reported as
/// warnings (or errors for conditions that can never match) on the result.
pub fn run(rows: &[Row], config: &TransformConfig) -> ConfigResult<TransformResult> {
    config.check()?;

    let mut result = TransformResult {
        source_row_count: rows.len(),
        ..TransformResult::default()
    };

    if rows.is_empty() {
        result.warnings.push(transform_issue(
            "",
            ErrorCode::EmptySource,
            "Transform input has no rows",
        ));
        return Ok(result);
    }
    if config.aggregations.is_empty() {
        result.warnings.push(transform_issue(
            "aggregations",
            ErrorCode::NoAggregations,
            "Transform has no aggregations; only group keys are produced",
        ));
    }

    for aggregation in &config.aggregations {
        check_against_rows(rows, aggregation, &mut result);
    }

    let fields = config.group_by.fields();
    let grouping = group_rows(rows, fields);
    if !grouping.missing_key_rows.is_empty() {
        let count = grouping.missing_key_rows.len();
        warn!(rows = count, "rows without a complete group key");
        result.warnings.push(transform_issue(
            &fields.join(","),
            ErrorCode::MissingGroupKey,
            format!("{} row(s) have no value for the group key and were grouped together", count),
        ));
    }

    let mut mismatches = vec![0usize; config.aggregations.len()];
    for group in &grouping.groups {
        let values = execute(&group.rows, &config.aggregations)?;

        let mut out = Row::new();
        if config.include_group_key {
            for (field, value) in fields.iter().zip(&group.key_values) {
                out.insert(field.clone(), value.clone());
            }
        }
        for (i, aggregation) in config.aggregations.iter().enumerate() {
            let value = values.get(&aggregation.output_field).cloned().unwrap_or_default();
            out.insert(config.output_name(aggregation), value);
            mismatches[i] += excluded_count(&group.rows, aggregation);
        }
        result.rows.push(out);
        result.members.push(group.indices.clone());
    }

    for (aggregation, count) in config.aggregations.iter().zip(mismatches) {
        if count > 0 {
            result.warnings.push(transform_issue(
                aggregation.source_field.as_deref().unwrap_or(""),
                ErrorCode::TypeMismatch,
                format!(
                    "{} excluded {} non-numeric value(s) of '{}'",
                    aggregation.function,
                    count,
                    aggregation.source_field.as_deref().unwrap_or("")
                ),
            ));
        }
    }

    result.group_count = grouping.groups.len();
    debug!(
        source_rows = result.source_row_count,
        groups = result.group_count,
        warnings = result.warnings.len(),
        "transform complete"
    );
    Ok(result)
}

fn check_against_rows(rows: &[Row], aggregation: &AggregationConfig, result: &mut TransformResult) {
    if let Some(field) = aggregation.source_field.as_deref() {
        if !rows.iter().any(|r| r.contains(field)) {
            result.warnings.push(transform_issue(
                field,
                ErrorCode::MissingSourceField,
                format!("Source field '{}' of '{}' is absent from every row", field, aggregation.output_field),
            ));
        }
    }
    if aggregation.function == AggregationFunction::CountIf {
        if let Some(condition) = &aggregation.options.condition {
            if let Err(message) = condition.check() {
                result.errors.push(
                    transform_issue(&condition.field, ErrorCode::InvalidCondition, message)
                        .with_value(condition.value.to_string()),
                );
            }
        }
    }
}
