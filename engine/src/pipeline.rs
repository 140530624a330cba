//! End-to-end pipeline: CSV content to validated creative payloads.
//!
//! ```text
//! content ─► parse ─► analyze/normalize ─► validate rows
//!                                              │
//!                    ┌─────────────────────────┘
//!                    ▼
//!        [transform validate ─► transform run ─► re-validate]
//!                    │
//!                    ▼
//!        render fields ─► field constraints ─► link assets ─► payloads
//! ```
//!
//! Every stage reports problems as data. Only configuration problems, and
//! a transform that fails static validation, end the run with an error.
//!
//! A row with errors still renders but is blocked. After a transform, an
//! output row is blocked when any of its source rows has an error on a field
//! the transform reads, and it carries those errors.
//!
//! # Example
//!
//! ```
//! use creative_sync::pipeline::{Pipeline, PipelineConfig};
//! use creative_sync::variables::FilterRegistry;
//!
//! let config = PipelineConfig::from_json(r#"{
//!     "fields": [{"name": "headline", "template": "Shop {product|title}", "required": true}],
//!     "constraints": [{"field": "headline", "maxLength": 30}]
//! }"#).unwrap();
//! let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
//!
//! let output = pipeline.run("product\nrunning shoes\n").unwrap();
//! assert_eq!(output.creatives[0].fields.get("headline").map(|v| v.to_string()), Some("Shop Running Shoes".into()));
//! assert!(!output.creatives[0].blocked);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::creative::{validate_creative_fields, CreativeLinker, CreativeMapping, FieldConstraint};
use crate::error::{ConfigResult, PipelineError, PipelineResult};
use crate::models::{CellValue, EntityContext, Row, ValidationIssue};
use crate::normalize::{analyze_columns, normalize_rows, ColumnAnalysis, NormalizationWarning};
use crate::parser::{parse_bytes_auto, parse_csv, CsvOptions, CsvRowError, ParsedCsv};
use crate::transform::{self, TransformConfig};
use crate::validation::{validate_rows, ValidationResult, ValidationRule};
use crate::variables::{FilterRegistry, TemplateField, VariableEngine};

// =============================================================================
// Configuration
// =============================================================================

/// Everything a pipeline run needs besides the data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub csv: CsvOptions,
    pub entity: EntityContext,
    /// Row rules, checked on source rows (and on transformed rows for the
    /// fields that survive the transform).
    pub rules: Vec<ValidationRule>,
    pub transform: Option<TransformConfig>,
    /// Creative fields rendered for every output row.
    pub fields: Vec<TemplateField>,
    pub constraints: Vec<FieldConstraint>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// =============================================================================
// Output
// =============================================================================

/// One rendered creative.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativePayload {
    /// Index into the output row set (source rows, or transformed rows).
    pub row_index: usize,
    pub entity_id: String,
    pub entity_name: String,
    /// Rendered fields, in config order.
    pub fields: Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<CreativeMapping>,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// The row or a rendered field carries errors; not fit for publishing.
    pub blocked: bool,
}

/// Counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub source_rows: usize,
    pub output_rows: usize,
    pub groups: Option<usize>,
    pub creatives: usize,
    pub blocked: usize,
    pub linked: usize,
    pub unlinked: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    /// Normalized column names of the source.
    pub headers: Vec<String>,
    pub columns: Vec<ColumnAnalysis>,
    pub creatives: Vec<CreativePayload>,
    pub parse_errors: Vec<CsvRowError>,
    pub normalization_warnings: Vec<NormalizationWarning>,
    /// Row, transform and creative issues, in stage order.
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub stats: PipelineStats,
}

// =============================================================================
// Pipeline
// =============================================================================

/// A configured, caller-owned pipeline. Holds no state between runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    variables: VariableEngine,
    linker: Option<CreativeLinker>,
}

impl Pipeline {
    /// Build a pipeline, rejecting malformed rules and transform configuration.
    ///
    /// Templates naming unregistered filters are accepted; those references
    /// render as `UNKNOWN_FILTER` issues on every row.
    pub fn new(config: PipelineConfig, filters: FilterRegistry, linker: Option<CreativeLinker>) -> PipelineResult<Self> {
        for rule in &config.rules {
            rule.verify()?;
        }
        if let Some(transform) = &config.transform {
            transform.check()?;
        }

        let variables = VariableEngine::new(filters);
        for field in &config.fields {
            let parsed = crate::variables::parse(&field.template);
            for call in parsed.variables().flat_map(|v| &v.filters) {
                if !variables.filters().contains(&call.name) {
                    warn!(field = %field.name, filter = %call.name, "template uses an unregistered filter");
                }
            }
        }

        Ok(Self {
            config,
            variables,
            linker,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on CSV text.
    pub fn run(&self, content: &str) -> PipelineResult<PipelineOutput> {
        let parsed = parse_csv(content, &self.config.csv);
        self.run_parsed(parsed)
    }

    /// Run on raw bytes, detecting the encoding.
    pub fn run_bytes(&self, bytes: &[u8]) -> PipelineResult<PipelineOutput> {
        let parsed = parse_bytes_auto(bytes, &self.config.csv)?;
        self.run_parsed(parsed)
    }

    fn run_parsed(&self, parsed: ParsedCsv) -> PipelineResult<PipelineOutput> {
        let mut output = self.run_rows(&parsed.headers, &parsed.rows)?;
        output.parse_errors = parsed.errors;
        Ok(output)
    }

    /// Run on already-split rows.
    pub fn run_rows(&self, headers: &[String], rows: &[Vec<String>]) -> PipelineResult<PipelineOutput> {
        let config = &self.config;
        let columns = analyze_columns(headers, rows);
        let normalized = normalize_rows(rows, &columns);
        let validation = validate_rows(&normalized.rows, &config.rules, &config.entity);

        let mut output = PipelineOutput {
            headers: columns.iter().map(|c| c.name.clone()).collect(),
            stats: PipelineStats {
                source_rows: normalized.rows.len(),
                ..PipelineStats::default()
            },
            ..PipelineOutput::default()
        };
        collect(&mut output, &validation);

        let (target_rows, target_validation, inherited) = match &config.transform {
            None => (normalized.rows, validation, Vec::new()),
            Some(transform_config) => {
                let schema: Vec<_> = columns.iter().map(ColumnAnalysis::schema).collect();
                let check = transform::validate(transform_config, &schema);
                if !check.is_valid() {
                    return Err(PipelineError::InvalidTransform(check.errors));
                }
                output.warnings.extend(check.warnings);

                let result = transform::run(&normalized.rows, transform_config)?;
                output.errors.extend(result.errors);
                output.warnings.extend(result.warnings);
                output.stats.groups = Some(result.group_count);

                let kept: HashSet<&str> = check.output_schema.iter().map(|f| f.name.as_str()).collect();
                let rules: Vec<ValidationRule> = config
                    .rules
                    .iter()
                    .filter(|r| kept.contains(r.field.as_str()))
                    .cloned()
                    .collect();
                let revalidation = validate_rows(&result.rows, &rules, &config.entity);
                collect(&mut output, &revalidation);
                let inherited = inherited_errors(&result.members, &validation, &transform_config.input_fields());
                (result.rows, revalidation, inherited)
            }
        };
        output.stats.output_rows = target_rows.len();
        output.normalization_warnings = normalized.warnings;
        output.columns = columns;

        for (index, row) in target_rows.iter().enumerate() {
            let source_errors = inherited.get(index).cloned().unwrap_or_default();
            let row_blocked = !source_errors.is_empty()
                || target_validation.rows.get(index).is_some_and(|r| !r.is_valid());
            let mut creative = self.render(index, row, row_blocked);
            output.errors.extend(creative.errors.iter().cloned());
            output.warnings.extend(creative.warnings.iter().cloned());
            // Already reported once in `output.errors` by the source validation.
            creative.errors.extend(source_errors);
            output.creatives.push(creative);
        }

        let stats = &mut output.stats;
        stats.creatives = output.creatives.len();
        stats.blocked = output.creatives.iter().filter(|c| c.blocked).count();
        stats.linked = output
            .creatives
            .iter()
            .filter(|c| c.mapping.as_ref().is_some_and(CreativeMapping::is_match))
            .count();
        stats.unlinked = if self.linker.is_some() {
            stats.creatives - stats.linked
        } else {
            0
        };
        stats.errors = output.errors.len();
        stats.warnings = output.warnings.len();

        info!(
            source_rows = stats.source_rows,
            creatives = stats.creatives,
            blocked = stats.blocked,
            linked = stats.linked,
            errors = stats.errors,
            warnings = stats.warnings,
            "pipeline complete"
        );
        Ok(output)
    }

    fn render(&self, index: usize, row: &Row, row_blocked: bool) -> CreativePayload {
        let ctx = &self.config.entity;
        let (entity_id, entity_name) = ctx.identify(row, index);

        let mut fields = Row::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for rendered in self.variables.substitute_fields(&self.config.fields, row) {
            let to_issue = |i: &crate::variables::SubstitutionIssue| {
                i.to_validation_issue(ctx.entity_type, &entity_id, &entity_name, &rendered.name)
            };
            errors.extend(rendered.result.errors.iter().map(to_issue));
            warnings.extend(rendered.result.warnings.iter().map(to_issue));
            fields.insert(rendered.name.clone(), CellValue::String(rendered.result.output.clone()));
        }

        let linking_row = row.overlay(&fields);
        let report = validate_creative_fields(&linking_row, &self.config.constraints, ctx, index);
        errors.extend(report.errors);
        warnings.extend(report.warnings);

        let mapping = self.linker.as_ref().map(|l| l.link(&linking_row));
        if let Some(m) = &mapping {
            warnings.extend(m.warnings.iter().cloned());
        }

        let blocked = row_blocked || !errors.is_empty();
        if blocked {
            debug!(row = index, entity = %entity_id, "creative blocked");
        }

        CreativePayload {
            row_index: index,
            entity_id,
            entity_name,
            fields,
            mapping,
            errors,
            warnings,
            blocked,
        }
    }
}

/// Source-row errors on fields the transform reads, per output row.
fn inherited_errors(members: &[Vec<usize>], validation: &ValidationResult, fields: &[String]) -> Vec<Vec<ValidationIssue>> {
    members
        .iter()
        .map(|indices| {
            indices
                .iter()
                .filter_map(|&i| validation.rows.get(i))
                .flat_map(|report| &report.errors)
                .filter(|issue| fields.contains(&issue.field))
                .cloned()
                .collect()
        })
        .collect()
}

fn collect(output: &mut PipelineOutput, validation: &ValidationResult) {
    for report in &validation.rows {
        output.errors.extend(report.errors.iter().cloned());
        output.warnings.extend(report.warnings.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creative::{AssetKind, CreativeAsset, CreativeSelectionRule};
    use crate::error::ConfigError;
    use crate::models::ErrorCode;
    use crate::transform::{Condition, ConditionOperator};

    const CSV: &str = "Ad ID,Country,Spend,Product,Landing URL\n\
                       A1,US,10,running shoes,https://shop.example.com/shoes\n\
                       A2,US,5,trail shoes,https://shop.example.com/trail\n\
                       A3,UK,3,hiking boots,not-a-url\n";

    fn base_config() -> PipelineConfig {
        PipelineConfig::from_json(
            r#"{
                "entity": {"entityType": "ad", "idField": "ad_id"},
                "rules": [
                    {"field": "landing_url", "type": "url"},
                    {"field": "country", "type": "required"}
                ],
                "fields": [
                    {"name": "headline", "template": "{product|title} in {country}", "required": true},
                    {"name": "final_url", "template": "{landing_url}"}
                ],
                "constraints": [{"field": "headline", "maxLength": 30}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rows_with_errors_are_blocked_not_dropped() {
        let pipeline = Pipeline::new(base_config(), FilterRegistry::with_builtins(), None).unwrap();
        let output = pipeline.run(CSV).unwrap();

        assert_eq!(output.headers, vec!["ad_id", "country", "spend", "product", "landing_url"]);
        assert_eq!(output.creatives.len(), 3);
        assert_eq!(output.creatives[0].entity_id, "A1");
        assert_eq!(
            output.creatives[0].fields.get("headline"),
            Some(&CellValue::from("Running Shoes in US"))
        );
        assert!(!output.creatives[0].blocked);
        assert!(output.creatives[2].blocked);
        assert_eq!(output.stats.blocked, 1);
        assert_eq!(output.errors[0].code, ErrorCode::InvalidUrl);
        assert_eq!(output.errors[0].entity_id, "A3");
    }

    #[test]
    fn test_transform_feeds_templates() {
        let mut config = base_config();
        config.transform = Some(
            TransformConfig::from_json(
                r#"{"groupBy": "country", "aggregations": [
                    {"sourceField": "spend", "outputField": "total_spend", "function": "SUM"},
                    {"sourceField": "product", "outputField": "products", "function": "CONCAT", "options": {"separator": " & "}}
                ]}"#,
            )
            .unwrap(),
        );
        config.entity.id_field = Some("country".into());
        config.fields = vec![TemplateField::new("headline", "{country}: {total_spend|currency:USD,0} on {products}")];
        config.constraints.clear();

        let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
        let output = pipeline.run(CSV).unwrap();

        assert_eq!(output.stats.groups, Some(2));
        assert_eq!(output.creatives.len(), 2);
        assert_eq!(
            output.creatives[0].fields.get("headline"),
            Some(&CellValue::from("US: $15 on running shoes & trail shoes"))
        );
        assert_eq!(output.creatives[1].entity_id, "UK");
        assert!(output.creatives.iter().all(|c| !c.blocked));
    }

    #[test]
    fn test_invalid_source_rows_block_their_group() {
        let config = PipelineConfig::from_json(
            r#"{
                "rules": [
                    {"field": "spend", "type": "range", "min": 0, "max": 100},
                    {"field": "landing", "type": "url"}
                ],
                "transform": {"groupBy": "country", "aggregations": [
                    {"sourceField": "spend", "outputField": "total_spend", "function": "SUM"}
                ]},
                "fields": [{"name": "summary", "template": "{country} {total_spend}"}]
            }"#,
        )
        .unwrap();
        let csv = "country,spend,landing\n\
                   US,10,https://a.example.com\n\
                   US,1000000,https://b.example.com\n\
                   UK,3,not-a-url\n";

        let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
        let output = pipeline.run(csv).unwrap();

        assert_eq!(output.creatives.len(), 2);
        let us = &output.creatives[0];
        assert!(us.blocked);
        assert!(us
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::OutOfRange && e.field == "spend" && e.entity_id == "row-1"));

        // `landing` is not read by the transform.
        assert!(!output.creatives[1].blocked);
        assert_eq!(output.stats.blocked, 1);
        let out_of_range = output.errors.iter().filter(|e| e.code == ErrorCode::OutOfRange).count();
        assert_eq!(out_of_range, 1);
    }

    #[test]
    fn test_configured_delimiter_wins_over_detection() {
        let config = PipelineConfig::from_json(
            r#"{"csv": {"delimiter": ";"}, "fields": [{"name": "h", "template": "{price}"}]}"#,
        )
        .unwrap();
        let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
        let output = pipeline.run_bytes(b"\"Sale, Now\";price\nx;10\n").unwrap();

        assert_eq!(output.headers, vec!["sale_now", "price"]);
        assert_eq!(output.creatives[0].fields.get("h"), Some(&CellValue::from("10")));
    }

    #[test]
    fn test_invalid_transform_aborts() {
        let mut config = base_config();
        config.transform = Some(TransformConfig::from_json(r#"{"groupBy": "region"}"#).unwrap());

        let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
        match pipeline.run(CSV) {
            Err(PipelineError::InvalidTransform(issues)) => assert_eq!(issues[0].code, ErrorCode::UnknownField),
            other => panic!("expected InvalidTransform, got {:?}", other.map(|o| o.stats)),
        }
    }

    #[test]
    fn test_unusable_rule_is_rejected_at_construction() {
        let mut config = base_config();
        config.rules.push(ValidationRule::new(
            "start",
            crate::validation::RuleCheck::DateTime {
                not_before: Some("next week".into()),
                not_after: None,
            },
        ));

        let err = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::InvalidRule { .. })));

        let parsed = PipelineConfig::from_json(
            r#"{"rules": [{"field": "start", "type": "date_time", "notAfter": "someday"}]}"#,
        );
        assert!(matches!(parsed, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_unknown_filter_degrades_to_issue() {
        let mut config = base_config();
        config.fields.push(TemplateField::new("badge", "{product|sparkle}"));
        let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();

        let output = pipeline.run(CSV).unwrap();
        let first = &output.creatives[0];
        assert_eq!(first.fields.get("badge"), Some(&CellValue::from("{product|sparkle}")));
        assert_eq!(first.warnings[0].code, ErrorCode::UnknownFilter);
        assert!(!first.blocked);
    }

    #[test]
    fn test_linking_uses_rendered_fields() {
        let rules = vec![
            CreativeSelectionRule::new("boots", "Boots", 1)
                .when(Condition::new("headline", ConditionOperator::Contains, "boots"))
                .assets(["img-boots"]),
            CreativeSelectionRule::new("us", "US", 2)
                .when(Condition::new("country", ConditionOperator::Equals, "US"))
                .assets(["img-us"]),
        ];
        let assets = vec![
            CreativeAsset::new("img-boots", "Boots", AssetKind::Image),
            CreativeAsset::new("img-us", "US", AssetKind::Image),
        ];
        let linker = CreativeLinker::new(rules, assets).unwrap();
        let pipeline = Pipeline::new(base_config(), FilterRegistry::with_builtins(), Some(linker)).unwrap();

        let output = pipeline.run(CSV).unwrap();
        let picked: Vec<Option<String>> = output
            .creatives
            .iter()
            .map(|c| c.mapping.as_ref().and_then(|m| m.rule.as_ref()).map(|r| r.id.clone()))
            .collect();
        assert_eq!(picked, vec![Some("us".into()), Some("us".into()), Some("boots".into())]);
        assert_eq!(output.stats.linked, 3);
        assert_eq!(output.stats.unlinked, 0);
    }
}
