//! Static checks of a [`TransformConfig`] against a source schema.
//!
//! Nothing here touches row data; the result says whether the transform may
//! run and what schema its output will have.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::aggregation::AggregationFunction;
use super::engine::TransformConfig;
use super::transform_issue;
use crate::models::{ColumnType, ErrorCode, FieldSchema, ValidationIssue};

/// Output of [`validate`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformValidationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Schema of the virtual data source the transform produces.
    pub output_schema: Vec<FieldSchema>,
}

impl TransformValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn schema_types(source_schema: &[FieldSchema]) -> HashMap<&str, ColumnType> {
    source_schema
        .iter()
        .map(|f| (f.name.as_str(), f.column_type))
        .collect()
}

fn numeric_source(function: AggregationFunction, column_type: ColumnType) -> bool {
    match column_type {
        ColumnType::Number => true,
        ColumnType::Date => matches!(function, AggregationFunction::Min | AggregationFunction::Max),
        _ => false,
    }
}

/// Field schema of the rows [`super::run`] would produce.
pub fn output_schema(config: &TransformConfig, source_schema: &[FieldSchema]) -> Vec<FieldSchema> {
    let types = schema_types(source_schema);
    let mut schema = Vec::new();

    if config.include_group_key {
        for field in config.group_by.fields() {
            let column_type = match types.get(field.as_str()) {
                Some(ColumnType::Mixed) | None => ColumnType::String,
                Some(t) => *t,
            };
            schema.push(FieldSchema::new(field.clone(), column_type));
        }
    }
    for aggregation in &config.aggregations {
        let source = aggregation
            .source_field
            .as_deref()
            .and_then(|f| types.get(f).copied());
        schema.push(FieldSchema::new(
            config.output_name(aggregation),
            aggregation.function.output_type(source),
        ));
    }
    schema
}

/// Check every reference and output name in `config` against `source_schema`.
pub fn validate(config: &TransformConfig, source_schema: &[FieldSchema]) -> TransformValidationResult {
    let types = schema_types(source_schema);
    let mut result = TransformValidationResult::default();
    let unknown = |field: &str, role: &str| {
        transform_issue(field, ErrorCode::UnknownField, format!("{} '{}' is not in the source schema", role, field))
            .with_value(field)
    };

    let group_by = config.group_by.fields();
    if group_by.is_empty() {
        result.errors.push(transform_issue(
            "groupBy",
            ErrorCode::RequiredField,
            "groupBy must name at least one field",
        ));
    }
    for field in group_by {
        if !types.contains_key(field.as_str()) {
            result.errors.push(unknown(field, "Group-by field"));
        }
    }

    if config.aggregations.is_empty() {
        result.warnings.push(transform_issue(
            "aggregations",
            ErrorCode::NoAggregations,
            "Transform has no aggregations; only group keys are produced",
        ));
    }

    for aggregation in &config.aggregations {
        let output = aggregation.output_field.as_str();
        let function = aggregation.function;

        match aggregation.source_field.as_deref().filter(|f| !f.is_empty()) {
            None if function.requires_source_field() => result.errors.push(transform_issue(
                output,
                ErrorCode::MissingSourceField,
                format!("{} for '{}' requires a sourceField", function, output),
            )),
            None => {}
            Some(source) => match types.get(source) {
                None => result.errors.push(unknown(source, "Source field")),
                Some(t) if function.is_numeric() && !numeric_source(function, *t) => {
                    result.warnings.push(
                        transform_issue(
                            source,
                            ErrorCode::TypeMismatch,
                            format!("{} over '{}' of type {}; non-numeric values are excluded", function, source, t),
                        )
                        .with_value(t.to_string())
                        .with_expected(ColumnType::Number.to_string()),
                    );
                }
                Some(_) => {}
            },
        }

        if function == AggregationFunction::CountIf {
            match &aggregation.options.condition {
                None => result.errors.push(transform_issue(
                    output,
                    ErrorCode::InvalidCondition,
                    format!("COUNT_IF for '{}' requires a condition", output),
                )),
                Some(condition) => {
                    if let Err(message) = condition.check() {
                        result.errors.push(
                            transform_issue(&condition.field, ErrorCode::InvalidCondition, message)
                                .with_value(condition.value.to_string()),
                        );
                    } else if !types.contains_key(condition.field.as_str()) {
                        result.errors.push(unknown(&condition.field, "Condition field"));
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for name in config.output_fields() {
        if !seen.insert(name.clone()) {
            result.errors.push(
                transform_issue(&name, ErrorCode::DuplicateOutputField, format!("Output field '{}' is produced twice", name))
                    .with_value(name.clone()),
            );
        }
    }

    result.output_schema = output_schema(config, source_schema);
    result
}
