//! Per-field constraints on rendered creatives (character limits, URL and
//! date formats, allowed values).
//!
//! Constraints are expressed as [`ValidationRule`]s so rendered fields go
//! through the same checks as source rows.

use serde::{Deserialize, Serialize};

use crate::models::{ColumnType, EntityContext, Row};
use crate::validation::{validate_row, RowReport, RuleCheck, ValidationRule};

/// Format a rendered field must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    Url,
    Datetime,
    Number,
}

/// Platform constraint on one creative field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConstraint {
    pub field: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    pub case_sensitive: bool,
}

impl FieldConstraint {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn allowed(mut self, values: Vec<String>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// The equivalent validation rules.
    pub fn rules(&self) -> Vec<ValidationRule> {
        let mut rules = Vec::new();
        let rule = |check| ValidationRule::new(self.field.clone(), check);

        if self.required {
            rules.push(rule(RuleCheck::Required));
        }
        if self.min_length.is_some() || self.max_length.is_some() {
            rules.push(rule(RuleCheck::Length {
                min: self.min_length,
                max: self.max_length,
            }));
        }
        match self.format {
            Some(FieldFormat::Url) => rules.push(rule(RuleCheck::Url)),
            Some(FieldFormat::Datetime) => rules.push(rule(RuleCheck::DateTime {
                not_before: None,
                not_after: None,
            })),
            Some(FieldFormat::Number) => rules.push(rule(RuleCheck::Type {
                expected: ColumnType::Number,
            })),
            None => {}
        }
        if let Some(values) = &self.allowed_values {
            rules.push(rule(RuleCheck::Enum {
                values: values.clone(),
                case_sensitive: self.case_sensitive,
            }));
        }
        rules
    }
}

/// Check rendered creative fields against platform constraints.
pub fn validate_creative_fields(
    fields: &Row,
    constraints: &[FieldConstraint],
    ctx: &EntityContext,
    index: usize,
) -> RowReport {
    let rules: Vec<ValidationRule> = constraints.iter().flat_map(FieldConstraint::rules).collect();
    validate_row(fields, index, &rules, ctx)
}
