//! End-to-end tests: CSV text in, creative payloads out.

use creative_sync::creative::{AssetKind, CreativeAsset, CreativeLinker, CreativeSelectionRule};
use creative_sync::models::{CellValue, EntityType, ErrorCode, Row};
use creative_sync::transform::{self, AggregationConfig, AggregationFunction, Condition, ConditionOperator};
use creative_sync::validation::fields::validate_url_field;
use creative_sync::variables::{extract_variables, FilterRegistry, VariableEngine};
use creative_sync::FilterResult;
use creative_sync::{
    analyze_columns, normalize_rows, parse_csv, ColumnType, CsvOptions, FieldSchema, Pipeline, PipelineConfig,
    PipelineError, TransformConfig,
};

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_group_by_country_sums_spend_in_first_seen_order() {
    let parsed = parse_csv("country,spend\nUS,10\nUS,5\nUK,3\n", &CsvOptions::default());
    let columns = analyze_columns(&parsed.headers, &parsed.rows);
    let rows = normalize_rows(&parsed.rows, &columns).rows;

    let config = TransformConfig::from_json(
        r#"{"groupBy": "country", "includeGroupKey": true,
            "aggregations": [{"sourceField": "spend", "outputField": "total_spend", "function": "SUM"}]}"#,
    )
    .unwrap();
    let result = transform::run(&rows, &config).unwrap();

    let expected = vec![
        Row::from_pairs([("country", CellValue::from("US")), ("total_spend", CellValue::from(15.0))]),
        Row::from_pairs([("country", CellValue::from("UK")), ("total_spend", CellValue::from(3.0))]),
    ];
    assert_eq!(result.rows, expected);
    assert!(result.errors.is_empty());
}

#[test]
fn test_count_if_active_rows() {
    let rows: Vec<Row> = ["active", "paused", "active", "archived", "active"]
        .iter()
        .map(|s| Row::from_pairs([("status", *s)]))
        .collect();
    let config = AggregationConfig::new(AggregationFunction::CountIf, "active_count")
        .with_condition(Condition::new("status", ConditionOperator::Equals, "active"));

    let out = transform::execute(&rows, &[config]).unwrap();
    assert_eq!(out.get("active_count"), Some(&CellValue::from(3.0)));
}

#[test]
fn test_extract_variables_with_currency() {
    let vars = extract_variables("Hello {name}, you owe {amount|currency:USD}");
    assert_eq!(vars.len(), 2);
    assert_eq!(vars[0].field_name, "name");
    assert!(vars[0].filters.is_empty());
    assert_eq!(vars[1].field_name, "amount");
    assert_eq!(vars[1].filters.len(), 1);
    assert_eq!(vars[1].filters[0].name, "currency");
    assert_eq!(vars[1].filters[0].args, vec!["USD".to_string()]);
}

#[test]
fn test_url_field_scenarios() {
    let issue = validate_url_field(Some("not-a-url"), "finalUrl", EntityType::Ad, "id1", "Ad 1", true).unwrap();
    assert_eq!(issue.code, ErrorCode::InvalidUrl);
    assert_eq!(issue.entity_id, "id1");

    let issue = validate_url_field(None, "finalUrl", EntityType::Ad, "id1", "Ad 1", true).unwrap();
    assert_eq!(issue.code, ErrorCode::RequiredField);

    assert!(validate_url_field(None, "finalUrl", EntityType::Ad, "id1", "Ad 1", false).is_none());
}

#[test]
fn test_sum_and_avg_without_numbers() {
    let rows = vec![Row::from_pairs([("spend", "n/a")]), Row::from_pairs([("spend", "")])];
    let configs = vec![
        AggregationConfig::new(AggregationFunction::Sum, "total").source("spend"),
        AggregationConfig::new(AggregationFunction::Avg, "mean").source("spend"),
    ];
    let out = transform::execute(&rows, &configs).unwrap();
    assert_eq!(out.get("total"), Some(&CellValue::from(0.0)));
    assert_eq!(out.get("mean"), Some(&CellValue::Null));
}

// =============================================================================
// Transform validation
// =============================================================================

#[test]
fn test_transform_validation_is_static() {
    let schema = vec![
        FieldSchema::new("country", ColumnType::String),
        FieldSchema::new("headline", ColumnType::String),
    ];
    let config = TransformConfig::new(
        "country",
        vec![
            AggregationConfig::new(AggregationFunction::Sum, "total").source("headline"),
            AggregationConfig::new(AggregationFunction::Max, "peak").source("budget"),
        ],
    );

    let result = transform::validate(&config, &schema);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.code == ErrorCode::UnknownField && e.value.as_deref() == Some("budget")));
    assert!(result.warnings.iter().any(|w| w.code == ErrorCode::TypeMismatch && w.field == "headline"));
}

// =============================================================================
// Full pipeline
// =============================================================================

const CAMPAIGN: &str = "\u{feff}Campaign;Country;Product;Price;Discount;Landing Page\n\
                        Spring;US;running shoes;89.5;30;https://shop.example.com/run\n\
                        Spring;FR;trail shoes;120;10;https://shop.example.com/trail\n\
                        Spring;DE;;75;0;https://shop.example.com/misc\n";

fn linker() -> CreativeLinker {
    let rules = vec![
        CreativeSelectionRule::new("sale", "Big discount", 1)
            .when(Condition::new("discount", ConditionOperator::GreaterThanOrEqual, 25.0))
            .assets(["banner-sale"]),
        CreativeSelectionRule::new("eu", "Europe", 2)
            .when(Condition::new("country", ConditionOperator::In, CellValue::List(vec!["FR".into(), "DE".into()])))
            .assets(["banner-eu"]),
    ];
    let assets = vec![
        CreativeAsset::new("banner-sale", "Sale banner", AssetKind::Image).with_url("https://cdn.example.com/sale.png"),
        CreativeAsset::new("banner-eu", "EU banner", AssetKind::Image),
    ];
    CreativeLinker::new(rules, assets).unwrap()
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig::from_json(
        r#"{
            "entity": {"entityType": "ad", "idField": "country"},
            "rules": [{"field": "landing_page", "type": "url"}],
            "fields": [
                {"name": "headline", "template": "{product|title} from {price|currency:EUR}", "required": true},
                {"name": "description", "template": "Save {discount}% in {country}"},
                {"name": "final_url", "template": "{landing_page}"}
            ],
            "constraints": [
                {"field": "headline", "required": true, "maxLength": 30},
                {"field": "final_url", "format": "url"}
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn test_render_and_link_campaign() {
    let pipeline = Pipeline::new(pipeline_config(), FilterRegistry::with_builtins(), Some(linker())).unwrap();
    let output = pipeline.run_bytes(CAMPAIGN.as_bytes()).unwrap();

    assert_eq!(output.headers[0], "campaign");
    assert_eq!(output.headers[5], "landing_page");
    assert_eq!(output.stats.source_rows, 3);
    assert_eq!(output.stats.creatives, 3);

    let us = &output.creatives[0];
    assert_eq!(us.entity_id, "US");
    assert_eq!(us.fields.get("headline"), Some(&CellValue::from("Running Shoes from €89.50")));
    assert_eq!(us.fields.get("description"), Some(&CellValue::from("Save 30% in US")));
    assert!(!us.blocked);
    let mapping = us.mapping.as_ref().unwrap();
    assert_eq!(mapping.rule.as_ref().map(|r| r.id.as_str()), Some("sale"));
    assert_eq!(mapping.assets[0].url.as_deref(), Some("https://cdn.example.com/sale.png"));

    let fr = &output.creatives[1];
    assert_eq!(fr.mapping.as_ref().and_then(|m| m.rule.as_ref()).map(|r| r.id.as_str()), Some("eu"));

    // Empty product in a required field blocks the DE creative.
    let de = &output.creatives[2];
    assert!(de.blocked);
    assert!(de.errors.iter().any(|e| e.field == "headline"));
    assert_eq!(output.stats.blocked, 1);
    assert_eq!(output.stats.linked, 3);
}

#[test]
fn test_render_after_transform() {
    let csv = "country,status,spend\nUS,active,10\nUS,paused,5\nUK,active,3\nUS,active,1\n";
    let mut config = PipelineConfig::from_json(
        r#"{
            "transform": {
                "groupBy": "country",
                "aggregations": [
                    {"sourceField": "spend", "outputField": "total_spend", "function": "SUM"},
                    {"outputField": "live", "function": "COUNT_IF",
                     "options": {"condition": {"field": "status", "operator": "equals", "value": "active"}}}
                ]
            },
            "fields": [{"name": "summary", "template": "{country}: {live} live, {total_spend|number:1} spent"}]
        }"#,
    )
    .unwrap();
    config.entity.id_field = Some("country".into());

    let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();
    let output = pipeline.run(csv).unwrap();

    assert_eq!(output.stats.source_rows, 4);
    assert_eq!(output.stats.output_rows, 2);
    let summaries: Vec<String> = output
        .creatives
        .iter()
        .filter_map(|c| c.fields.get("summary").map(|v| v.to_string()))
        .collect();
    assert_eq!(summaries, vec!["US: 2 live, 16.0 spent", "UK: 1 live, 3.0 spent"]);
    assert!(output.creatives.iter().all(|c| c.mapping.is_none()));
}

#[test]
fn test_transform_with_unknown_field_never_runs() {
    let mut config = pipeline_config();
    config.transform = Some(TransformConfig::new(
        "region",
        vec![AggregationConfig::new(AggregationFunction::Count, "ads")],
    ));
    let pipeline = Pipeline::new(config, FilterRegistry::with_builtins(), None).unwrap();

    let err = pipeline.run_bytes(CAMPAIGN.as_bytes()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransform(_)));
    assert!(err.to_string().contains("UNKNOWN_FIELD"));
}

#[test]
fn test_custom_filter_is_available_to_templates() {
    let mut filters = FilterRegistry::with_builtins();
    filters.register("shout", |value: &CellValue, _args: &[String], _row: &Row| -> FilterResult<CellValue> {
        Ok(CellValue::String(format!("{}!", value.to_string().to_uppercase())))
    });
    let engine = VariableEngine::new(filters);

    let row = Row::from_pairs([("offer", "free shipping")]);
    let result = engine.substitute("{offer|shout}", &row, false);
    assert_eq!(result.output, "FREE SHIPPING!");
    assert!(result.is_ok());
}
