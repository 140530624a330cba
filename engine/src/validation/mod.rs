//! Declarative row validation.
//!
//! A [`ValidationRule`] binds a field to one [`RuleCheck`]. Every applicable
//! rule is evaluated for every row, so one row can carry several issues.
//! Rows are never modified.
//!
//! # Example
//!
//! ```
//! use creative_sync::models::{EntityContext, Row};
//! use creative_sync::validation::{validate_rows, RuleCheck, ValidationRule};
//!
//! let rules = vec![
//!     ValidationRule::new("headline", RuleCheck::Required),
//!     ValidationRule::new("final_url", RuleCheck::Url),
//! ];
//! let rows = vec![Row::from_pairs([("headline", ""), ("final_url", "nope")])];
//!
//! let result = validate_rows(&rows, &rules, &EntityContext::default());
//! assert_eq!(result.error_count, 2);
//! ```

pub mod fields;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{CellValue, ColumnType, EntityContext, ErrorCode, Row, ValidationIssue};
use crate::normalize::{coerce_value, parse_number};

/// Share of a maximum length above which a warning is raised.
pub const NEAR_LIMIT_RATIO: f64 = 0.9;

/// One check bound to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct ValidationRule {
    pub field: String,
    #[serde(flatten)]
    pub check: RuleCheck,
}

#[derive(Deserialize)]
struct RawRule {
    field: String,
    #[serde(flatten)]
    check: RuleCheck,
}

impl TryFrom<RawRule> for ValidationRule {
    type Error = ConfigError;

    fn try_from(raw: RawRule) -> ConfigResult<Self> {
        let rule = ValidationRule::new(raw.field, raw.check);
        rule.verify()?;
        Ok(rule)
    }
}

impl ValidationRule {
    pub fn new(field: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            field: field.into(),
            check,
        }
    }

    /// Reject rule parameters that could never be applied, such as a date
    /// bound that does not parse.
    pub fn verify(&self) -> ConfigResult<()> {
        if let RuleCheck::DateTime { not_before, not_after } = &self.check {
            for bound in not_before.iter().chain(not_after) {
                if fields::parse_datetime(bound).is_none() {
                    return Err(ConfigError::InvalidRule {
                        field: self.field.clone(),
                        message: format!("'{}' is not an ISO-8601 date", bound),
                    });
                }
            }
        }
        if let RuleCheck::Length { min: Some(min), max: Some(max) } = self.check {
            if min > max {
                return Err(ConfigError::InvalidRule {
                    field: self.field.clone(),
                    message: format!("min length {} exceeds max length {}", min, max),
                });
            }
        }
        Ok(())
    }
}

/// Available checks. Only `Required` fires on empty values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCheck {
    Required,
    Type {
        expected: ColumnType,
    },
    #[serde(rename_all = "camelCase")]
    Enum {
        values: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Url,
    #[serde(rename_all = "camelCase")]
    DateTime {
        #[serde(default)]
        not_before: Option<String>,
        #[serde(default)]
        not_after: Option<String>,
    },
    /// This field is a start date; `end_field` must not precede it.
    #[serde(rename_all = "camelCase")]
    DateRange {
        end_field: String,
    },
}

/// Issues found on one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowReport {
    pub row_index: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl RowReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Issues found across all rows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub rows: Vec<RowReport>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    pub fn valid_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_valid()).count()
    }
}

struct Subject<'a> {
    ctx: &'a EntityContext,
    id: String,
    name: String,
}

impl Subject<'_> {
    fn issue(&self, field: &str, code: ErrorCode, message: impl Into<String>) -> ValidationIssue {
        ValidationIssue::new(self.ctx.entity_type, &self.id, &self.name, field, code, message)
    }
}

/// Validate one row against every rule.
pub fn validate_row(row: &Row, row_index: usize, rules: &[ValidationRule], ctx: &EntityContext) -> RowReport {
    let (id, name) = ctx.identify(row, row_index);
    let subject = Subject { ctx, id, name };
    let mut report = RowReport {
        row_index,
        ..RowReport::default()
    };

    for rule in rules {
        apply_rule(row, rule, &subject, &mut report);
    }
    report
}

/// Validate all rows.
pub fn validate_rows(rows: &[Row], rules: &[ValidationRule], ctx: &EntityContext) -> ValidationResult {
    let mut result = ValidationResult::default();
    for (i, row) in rows.iter().enumerate() {
        let report = validate_row(row, i, rules, ctx);
        result.error_count += report.errors.len();
        result.warning_count += report.warnings.len();
        result.rows.push(report);
    }
    debug!(
        rows = rows.len(),
        errors = result.error_count,
        warnings = result.warning_count,
        "validated rows"
    );
    result
}

fn apply_rule(row: &Row, rule: &ValidationRule, subject: &Subject<'_>, report: &mut RowReport) {
    let field = rule.field.as_str();
    let value = row.get(field).unwrap_or(&CellValue::Null);

    if let RuleCheck::Required = rule.check {
        if value.is_empty() {
            report.errors.push(
                subject.issue(field, ErrorCode::RequiredField, format!("{} is required", field)),
            );
        }
        return;
    }
    if value.is_empty() {
        return;
    }
    let text = value.to_string();

    match &rule.check {
        RuleCheck::Required => {}
        RuleCheck::Type { expected } => {
            let matches = value.column_type() == Some(*expected)
                || value.as_str().is_some_and(|s| {
                    *expected != ColumnType::List && coerce_value(s, *expected).is_ok()
                });
            if !matches {
                report.errors.push(
                    subject
                        .issue(field, ErrorCode::InvalidType, format!("{} must be a {}", field, expected))
                        .with_value(&text)
                        .with_expected(expected.to_string()),
                );
            }
        }
        RuleCheck::Enum { values, case_sensitive } => {
            if let Some(issue) = fields::validate_enum_field(
                Some(&text),
                values,
                *case_sensitive,
                field,
                subject.ctx.entity_type,
                &subject.id,
                &subject.name,
                true,
            ) {
                report.errors.push(issue);
            }
        }
        RuleCheck::Length { min, max } => {
            let len = text.chars().count();
            if let Some(min) = min.filter(|m| len < *m) {
                report.errors.push(
                    subject
                        .issue(
                            field,
                            ErrorCode::LengthBelowMinimum,
                            format!("{} is {} characters, minimum is {}", field, len, min),
                        )
                        .with_value(&text)
                        .with_expected(format!(">= {} characters", min)),
                );
            }
            if let Some(max) = *max {
                match fields::validate_string_length(
                    &text,
                    max,
                    field,
                    subject.ctx.entity_type,
                    &subject.id,
                    &subject.name,
                ) {
                    Some(issue) => report.errors.push(issue),
                    None if max > 0 && len as f64 >= max as f64 * NEAR_LIMIT_RATIO => {
                        report.warnings.push(
                            subject
                                .issue(
                                    field,
                                    ErrorCode::LengthNearLimit,
                                    format!("{} uses {} of {} characters", field, len, max),
                                )
                                .with_value(&text),
                        );
                    }
                    None => {}
                }
            }
        }
        RuleCheck::Range { min, max } => {
            let number = value.as_f64().or_else(|| value.as_str().and_then(parse_number));
            match number {
                None => report.errors.push(
                    subject
                        .issue(field, ErrorCode::InvalidType, format!("{} must be a number", field))
                        .with_value(&text)
                        .with_expected("number"),
                ),
                Some(n) if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) => {
                    report.errors.push(
                        subject
                            .issue(field, ErrorCode::OutOfRange, format!("{} is out of range", field))
                            .with_value(&text)
                            .with_expected(describe_bounds(min.map(|m| m.to_string()), max.map(|m| m.to_string()))),
                    );
                }
                Some(_) => {}
            }
        }
        RuleCheck::Url => {
            if let Some(issue) = fields::validate_url_field(
                Some(&text),
                field,
                subject.ctx.entity_type,
                &subject.id,
                &subject.name,
                false,
            ) {
                report.errors.push(issue);
            }
        }
        RuleCheck::DateTime { not_before, not_after } => {
            let parsed = match value {
                CellValue::Date(d) => Some(*d),
                _ => fields::parse_datetime(&text),
            };
            let Some(date) = parsed else {
                report.errors.push(
                    subject
                        .issue(field, ErrorCode::InvalidDate, format!("{} must be an ISO-8601 date", field))
                        .with_value(&text)
                        .with_expected("YYYY-MM-DD[THH:MM:SS]"),
                );
                return;
            };
            let before = not_before.as_deref().and_then(fields::parse_datetime);
            let after = not_after.as_deref().and_then(fields::parse_datetime);
            if before.is_some_and(|b| date < b) || after.is_some_and(|a| date > a) {
                report.errors.push(
                    subject
                        .issue(field, ErrorCode::OutOfRange, format!("{} is outside the allowed dates", field))
                        .with_value(&text)
                        .with_expected(describe_bounds(not_before.clone(), not_after.clone())),
                );
            }
        }
        RuleCheck::DateRange { end_field } => {
            let end = row.get(end_field).filter(|v| !v.is_empty()).map(|v| v.to_string());
            if let Some(issue) = fields::validate_date_range(
                Some(&text),
                end.as_deref(),
                end_field,
                subject.ctx.entity_type,
                &subject.id,
                &subject.name,
            ) {
                report.errors.push(issue);
            }
        }
    }
}

fn describe_bounds(min: Option<String>, max: Option<String>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("{}..={}", lo, hi),
        (Some(lo), None) => format!(">= {}", lo),
        (None, Some(hi)) => format!("<= {}", hi),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    fn ctx() -> EntityContext {
        EntityContext {
            entity_type: EntityType::Ad,
            id_field: Some("ad_id".into()),
            name_field: Some("name".into()),
        }
    }

    #[test]
    fn test_reports_every_failure_on_a_row() {
        let rules = vec![
            ValidationRule::new("headline", RuleCheck::Required),
            ValidationRule::new("final_url", RuleCheck::Url),
            ValidationRule::new("bid", RuleCheck::Range { min: Some(0.0), max: Some(10.0) }),
        ];
        let row = Row::from_pairs([
            ("ad_id", CellValue::from("A1")),
            ("name", CellValue::from("Spring")),
            ("final_url", CellValue::from("shop")),
            ("bid", CellValue::Number(12.0)),
        ]);

        let report = validate_row(&row, 0, &rules, &ctx());
        let codes: Vec<ErrorCode> = report.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![ErrorCode::RequiredField, ErrorCode::InvalidUrl, ErrorCode::OutOfRange]
        );
        assert!(report.errors.iter().all(|e| e.entity_id == "A1" && e.entity_name == "Spring"));
    }

    #[test]
    fn test_optional_checks_skip_empty_values() {
        let rules = vec![
            ValidationRule::new("final_url", RuleCheck::Url),
            ValidationRule::new("start", RuleCheck::DateTime { not_before: None, not_after: None }),
        ];
        let row = Row::from_pairs([("final_url", CellValue::Null)]);
        assert!(validate_row(&row, 0, &rules, &ctx()).is_valid());
    }

    #[test]
    fn test_length_near_limit_is_warning() {
        let rules = vec![ValidationRule::new("headline", RuleCheck::Length { min: None, max: Some(10) })];

        let report = validate_row(&Row::from_pairs([("headline", "123456789")]), 0, &rules, &ctx());
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].code, ErrorCode::LengthNearLimit);

        let report = validate_row(&Row::from_pairs([("headline", "12345678901")]), 0, &rules, &ctx());
        assert_eq!(report.errors[0].code, ErrorCode::LengthExceeded);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_type_check_accepts_coercible_strings() {
        let rules = vec![ValidationRule::new("spend", RuleCheck::Type { expected: ColumnType::Number })];
        assert!(validate_row(&Row::from_pairs([("spend", "1,200")]), 0, &rules, &ctx()).is_valid());
        let report = validate_row(&Row::from_pairs([("spend", "many")]), 0, &rules, &ctx());
        assert_eq!(report.errors[0].code, ErrorCode::InvalidType);
    }

    #[test]
    fn test_date_checks() {
        let rules = vec![
            ValidationRule::new(
                "start",
                RuleCheck::DateTime {
                    not_before: Some("2024-01-01".into()),
                    not_after: None,
                },
            ),
            ValidationRule::new("start", RuleCheck::DateRange { end_field: "end".into() }),
        ];
        let row = Row::from_pairs([("start", "2023-12-01"), ("end", "2023-11-01")]);
        let report = validate_row(&row, 3, &rules, &EntityContext::default());
        let codes: Vec<ErrorCode> = report.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::OutOfRange, ErrorCode::InvalidDateRange]);
        assert_eq!(report.errors[0].entity_id, "row-3");
    }

    #[test]
    fn test_rules_deserialize_from_json() {
        let rules: Vec<ValidationRule> = serde_json::from_str(
            r#"[
                {"field": "cta", "type": "enum", "values": ["SHOP_NOW"], "caseSensitive": true},
                {"field": "headline", "type": "length", "max": 30},
                {"field": "start", "type": "date_time", "notBefore": "2024-01-01"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            rules[0].check,
            RuleCheck::Enum {
                values: vec!["SHOP_NOW".into()],
                case_sensitive: true
            }
        );
        assert_eq!(rules[1].check, RuleCheck::Length { min: None, max: Some(30) });
        assert!(matches!(rules[2].check, RuleCheck::DateTime { .. }));
    }

    #[test]
    fn test_unparseable_date_bound_is_rejected() {
        let err = serde_json::from_str::<ValidationRule>(
            r#"{"field": "start", "type": "date_time", "notBefore": "tomorrow"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tomorrow"));

        let rule = ValidationRule::new(
            "start",
            RuleCheck::DateTime {
                not_before: None,
                not_after: Some("2024-13-45".into()),
            },
        );
        assert!(matches!(rule.verify(), Err(ConfigError::InvalidRule { ref field, .. }) if field == "start"));

        let inverted = ValidationRule::new("headline", RuleCheck::Length { min: Some(10), max: Some(5) });
        assert!(inverted.verify().is_err());
    }

    #[test]
    fn test_validate_rows_counts() {
        let rules = vec![ValidationRule::new("headline", RuleCheck::Required)];
        let rows = vec![
            Row::from_pairs([("headline", "ok")]),
            Row::from_pairs([("headline", "")]),
        ];
        let result = validate_rows(&rows, &rules, &ctx());
        assert_eq!(result.error_count, 1);
        assert_eq!(result.valid_rows(), 1);
        assert!(!result.is_valid());
    }
}
