//! Variable substitution.
//!
//! A [`VariableEngine`] owns a [`FilterRegistry`] and renders templates
//! against rows. Rendering is a pure function of (template, row, registry).
//!
//! Problems never abort a render. Each one becomes a [`SubstitutionIssue`]:
//! a warning by default, an error when the field is marked required. The
//! raw reference text stays in the output for unresolved references and
//! failed filters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::filters::FilterRegistry;
use super::template::{parse, ExtractedVariable, Segment, Span, Template};
use crate::error::FilterError;
use crate::models::{CellValue, EntityType, ErrorCode, Row, ValidationIssue};

// =============================================================================
// Results
// =============================================================================

/// A problem found while rendering or checking a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionIssue {
    pub code: ErrorCode,
    /// Referenced field, or empty for syntax problems.
    pub field: String,
    /// Reference text as written.
    pub reference: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl SubstitutionIssue {
    fn new(code: ErrorCode, variable: &ExtractedVariable, message: impl Into<String>) -> Self {
        Self {
            code,
            field: variable.field_name.clone(),
            reference: variable.raw.clone(),
            message: message.into(),
            span: Some(variable.span),
        }
    }

    /// Attach the issue to an entity, under the template field it came from.
    pub fn to_validation_issue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        entity_name: &str,
        template_field: &str,
    ) -> ValidationIssue {
        ValidationIssue::new(entity_type, entity_id, entity_name, template_field, self.code, &self.message)
            .with_value(&self.reference)
    }
}

/// Output of [`VariableEngine::substitute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubstitutionResult {
    pub output: String,
    pub warnings: Vec<SubstitutionIssue>,
    pub errors: Vec<SubstitutionIssue>,
}

impl SubstitutionResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn report(&mut self, issue: SubstitutionIssue, required: bool) {
        if required {
            self.errors.push(issue);
        } else {
            self.warnings.push(issue);
        }
    }
}

/// A named creative field rendered from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub required: bool,
}

impl TemplateField {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One rendered field with its own issues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub name: String,
    #[serde(flatten)]
    pub result: SubstitutionResult,
}

/// Output of [`VariableEngine::validate`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateValidation {
    pub variables: Vec<ExtractedVariable>,
    pub errors: Vec<SubstitutionIssue>,
    pub warnings: Vec<SubstitutionIssue>,
}

impl TemplateValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One row of a [`PreviewResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSample {
    pub row_index: usize,
    #[serde(flatten)]
    pub result: SubstitutionResult,
}

/// Output of [`VariableEngine::preview`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub samples: Vec<PreviewSample>,
    pub rows_with_warnings: usize,
    pub rows_with_errors: usize,
}

// =============================================================================
// Engine
// =============================================================================

/// Renders templates with a fixed set of filters.
#[derive(Debug, Clone)]
pub struct VariableEngine {
    filters: FilterRegistry,
}

impl Default for VariableEngine {
    fn default() -> Self {
        Self::new(FilterRegistry::with_builtins())
    }
}

impl VariableEngine {
    pub fn new(filters: FilterRegistry) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Render `template` against `row`.
    ///
    /// ```
    /// use creative_sync::models::Row;
    /// use creative_sync::variables::VariableEngine;
    ///
    /// let engine = VariableEngine::default();
    /// let row = Row::from_pairs([("name", "ana"), ("amount", "12.5")]);
    /// let result = engine.substitute("Hi {name|capitalize}, {amount|currency:USD}", &row, false);
    /// assert_eq!(result.output, "Hi Ana, $12.50");
    /// ```
    pub fn substitute(&self, template: &str, row: &Row, required: bool) -> SubstitutionResult {
        self.render(&parse(template), row, required)
    }

    /// Render every field of a creative against one row.
    pub fn substitute_fields(&self, fields: &[TemplateField], row: &Row) -> Vec<RenderedField> {
        fields
            .iter()
            .map(|f| RenderedField {
                name: f.name.clone(),
                result: self.substitute(&f.template, row, f.required),
            })
            .collect()
    }

    /// Check references and filters of `template` without row data.
    pub fn validate(&self, template: &str, available_fields: &[String]) -> TemplateValidation {
        let parsed = parse(template);
        let known: HashSet<&str> = available_fields.iter().map(String::as_str).collect();
        let mut result = TemplateValidation {
            warnings: syntax_issues(&parsed),
            ..TemplateValidation::default()
        };

        for variable in parsed.variables() {
            if !known.contains(variable.field_name.as_str()) {
                result.errors.push(SubstitutionIssue::new(
                    ErrorCode::UnknownField,
                    variable,
                    format!("Field '{}' is not available", variable.field_name),
                ));
            }
            for call in &variable.filters {
                match self.filters.get(&call.name) {
                    None => result.errors.push(SubstitutionIssue::new(
                        ErrorCode::UnknownFilter,
                        variable,
                        FilterError::UnknownFilter(call.name.clone()).to_string(),
                    )),
                    Some(filter) => {
                        if let Err(e) = filter.check_args(&call.args) {
                            result
                                .errors
                                .push(SubstitutionIssue::new(ErrorCode::FilterFailed, variable, e.to_string()));
                        }
                    }
                }
            }
            result.variables.push(variable.clone());
        }
        result
    }

    /// Render `template` against each sample row.
    pub fn preview(&self, template: &str, sample_rows: &[Row]) -> PreviewResult {
        let parsed = parse(template);
        let mut preview = PreviewResult::default();
        for (row_index, row) in sample_rows.iter().enumerate() {
            let result = self.render(&parsed, row, false);
            if !result.warnings.is_empty() {
                preview.rows_with_warnings += 1;
            }
            if !result.errors.is_empty() {
                preview.rows_with_errors += 1;
            }
            preview.samples.push(PreviewSample { row_index, result });
        }
        preview
    }

    fn render(&self, template: &Template, row: &Row, required: bool) -> SubstitutionResult {
        let mut result = SubstitutionResult::default();
        for issue in syntax_issues(template) {
            result.report(issue, required);
        }

        for segment in &template.segments {
            match segment {
                Segment::Text(text) => result.output.push_str(text),
                Segment::Variable(variable) => match self.resolve(variable, row) {
                    Ok(value) => {
                        if value.is_empty() {
                            result.report(
                                SubstitutionIssue::new(
                                    ErrorCode::EmptyValue,
                                    variable,
                                    format!("Field '{}' is empty", variable.field_name),
                                ),
                                required,
                            );
                        }
                        result.output.push_str(&value.to_string());
                    }
                    Err(issue) => {
                        result.output.push_str(&variable.raw);
                        result.report(issue, required);
                    }
                },
            }
        }

        if !result.warnings.is_empty() || !result.errors.is_empty() {
            debug!(
                warnings = result.warnings.len(),
                errors = result.errors.len(),
                "template rendered with issues"
            );
        }
        result
    }

    /// Value of one reference after its filter chain.
    fn resolve(&self, variable: &ExtractedVariable, row: &Row) -> Result<CellValue, SubstitutionIssue> {
        let present = row.get(&variable.field_name);
        let unresolved = || {
            SubstitutionIssue::new(
                ErrorCode::UnresolvedVariable,
                variable,
                format!("Field '{}' is not present in the row", variable.field_name),
            )
        };

        let mut value = present.cloned().unwrap_or(CellValue::Null);
        for call in &variable.filters {
            let filter = self.filters.get(&call.name).ok_or_else(|| {
                SubstitutionIssue::new(
                    ErrorCode::UnknownFilter,
                    variable,
                    FilterError::UnknownFilter(call.name.clone()).to_string(),
                )
            })?;
            value = match filter.apply(&value, &call.args, row) {
                Ok(v) => v,
                Err(_) if present.is_none() => return Err(unresolved()),
                Err(e) => return Err(SubstitutionIssue::new(ErrorCode::FilterFailed, variable, e.to_string())),
            };
        }

        if present.is_none() && value.is_null() {
            return Err(unresolved());
        }
        Ok(value)
    }
}

fn syntax_issues(template: &Template) -> Vec<SubstitutionIssue> {
    template
        .problems
        .iter()
        .map(|p| SubstitutionIssue {
            code: ErrorCode::TemplateSyntax,
            field: String::new(),
            reference: p.text.clone(),
            message: format!("{} at offset {}", p.message, p.position),
            span: None,
        })
        .collect()
}
