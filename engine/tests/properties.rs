//! Property-based tests for the parser, the transform engine and template
//! substitution.

use creative_sync::models::{CellValue, Row};
use creative_sync::transform::{self, AggregationConfig, AggregationFunction, TransformConfig};
use creative_sync::variables::VariableEngine;
use creative_sync::{parse_csv, write_csv, CsvOptions};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// A table of plain cells: no quotes, delimiters or line breaks.
fn plain_table() -> impl Strategy<Value = (Vec<String>, Vec<Vec<String>>)> {
    (1usize..6).prop_flat_map(|width| {
        let headers = (0..width).map(|i| format!("col_{}", i)).collect::<Vec<_>>();
        let row = prop::collection::vec("[A-Za-z0-9 ._-]{0,12}", width)
            .prop_filter("blank rows are skipped", |cells| cells.iter().any(|c| !c.trim().is_empty()));
        (Just(headers), prop::collection::vec(row, 0..20))
    })
}

fn keyed_rows() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(("[a-d]", 0i64..1000), 0..50).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(key, spend)| Row::from_pairs([("key", CellValue::from(key)), ("spend", CellValue::from(spend))]))
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn csv_round_trip((headers, rows) in plain_table()) {
        let options = CsvOptions::default();
        let text = write_csv(&headers, &rows, &options).unwrap();
        let parsed = parse_csv(&text, &options);

        prop_assert_eq!(parsed.headers, headers);
        prop_assert_eq!(parsed.rows, rows);
        prop_assert!(parsed.errors.is_empty());
    }

    #[test]
    fn count_is_conserved_across_groups(rows in keyed_rows()) {
        let config = TransformConfig::new(
            "key",
            vec![AggregationConfig::new(AggregationFunction::Count, "n")],
        );
        let result = transform::run(&rows, &config).unwrap();

        let total: f64 = result
            .rows
            .iter()
            .filter_map(|r| r.get("n").and_then(CellValue::as_f64))
            .sum();
        prop_assert_eq!(total as usize, rows.len());
        prop_assert!(result.group_count <= 4);
    }

    #[test]
    fn sum_never_fails_on_text(values in prop::collection::vec("[a-z ]{0,6}", 1..10)) {
        let rows: Vec<Row> = values.iter().map(|v| Row::from_pairs([("spend", v.as_str())])).collect();
        let configs = vec![
            AggregationConfig::new(AggregationFunction::Sum, "total").source("spend"),
            AggregationConfig::new(AggregationFunction::Avg, "mean").source("spend"),
        ];
        let out = transform::execute(&rows, &configs).unwrap();
        prop_assert_eq!(out.get("total"), Some(&CellValue::from(0.0)));
        prop_assert_eq!(out.get("mean"), Some(&CellValue::Null));
    }

    #[test]
    fn static_text_is_unchanged(text in "[A-Za-z0-9 .,!?:;'|%$-]{0,60}", value in "[a-z]{0,8}") {
        let engine = VariableEngine::default();
        let row = Row::from_pairs([("name", value.as_str())]);
        let result = engine.substitute(&text, &row, true);

        prop_assert_eq!(result.output, text);
        prop_assert!(result.errors.is_empty());
        prop_assert!(result.warnings.is_empty());
    }
}
