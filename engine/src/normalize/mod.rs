//! Column name normalization, type inference and cell coercion.
//!
//! Inference is a pure function from a sample of raw strings to one
//! [`ColumnType`]. Priority order: number, boolean, date, string. A column
//! whose values only partly match a non-string type is [`ColumnType::Mixed`]
//! and keeps string cells.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{CellValue, ColumnType, FieldSchema, Row};

/// Rows examined per column by [`analyze_columns`].
pub const SAMPLE_SIZE: usize = 1000;

const MAX_SAMPLES: usize = 5;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\d{1,3}(,\d{3})+|\d+)?(\.\d+)?$").expect("valid number regex")
});

static CAMEL_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel regex"));

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid alnum regex"));

// =============================================================================
// Column names
// =============================================================================

/// Canonical key for a raw header: `"Final URL"` → `final_url`,
/// `"finalUrl"` → `final_url`.
///
/// Returns an empty string when nothing usable remains.
pub fn normalize_column_name(raw: &str) -> String {
    let split = CAMEL_BOUNDARY_RE.replace_all(raw.trim(), "${1}_${2}");
    let lower = split.to_lowercase();
    NON_ALNUM_RE.replace_all(&lower, "_").trim_matches('_').to_string()
}

/// Normalize every header, filling blanks with `column_<n>` and
/// de-duplicating collisions with `_2`, `_3`, … in column order.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(headers.len());

    for (i, raw) in headers.iter().enumerate() {
        let mut base = normalize_column_name(raw);
        if base.is_empty() {
            base = format!("column_{}", i + 1);
        }

        let mut name = base.clone();
        let mut suffix = 2;
        while seen.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        result.push(name);
    }

    result
}

// =============================================================================
// Literal parsing
// =============================================================================

/// Strict number literal: optional sign, optional `,` thousands grouping,
/// optional decimals.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) || !NUMBER_RE.is_match(s) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok()
}

pub fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// ISO-8601-like date or datetime. Offsets are converted to UTC.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.len() < 10 {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// =============================================================================
// Type detection
// =============================================================================

/// Classify a sample of raw values.
pub fn detect_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    classify(values).column_type
}

struct Classification {
    column_type: ColumnType,
    non_empty: usize,
    empty: usize,
    consistency: f64,
}

fn classify<'a, I>(values: I) -> Classification
where
    I: IntoIterator<Item = &'a str>,
{
    let (mut non_empty, mut empty) = (0usize, 0usize);
    let (mut numbers, mut booleans, mut dates) = (0usize, 0usize, 0usize);

    for value in values {
        if value.trim().is_empty() {
            empty += 1;
            continue;
        }
        non_empty += 1;
        if parse_number(value).is_some() {
            numbers += 1;
        }
        if parse_boolean(value).is_some() {
            booleans += 1;
        }
        if parse_date(value).is_some() {
            dates += 1;
        }
    }

    let (column_type, matched) = if non_empty == 0 {
        (ColumnType::String, 0)
    } else if numbers == non_empty {
        (ColumnType::Number, numbers)
    } else if booleans == non_empty {
        (ColumnType::Boolean, booleans)
    } else if dates == non_empty {
        (ColumnType::Date, dates)
    } else {
        let best = numbers.max(booleans).max(dates);
        if best > 0 {
            (ColumnType::Mixed, best)
        } else {
            (ColumnType::String, non_empty)
        }
    };

    let consistency = if non_empty == 0 {
        1.0
    } else {
        matched as f64 / non_empty as f64
    };

    Classification {
        column_type,
        non_empty,
        empty,
        consistency,
    }
}

/// Inferred description of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAnalysis {
    /// Normalized column key.
    pub name: String,
    pub original_name: String,
    pub column_type: ColumnType,
    /// Up to five distinct non-empty values, first-seen order.
    pub samples: Vec<String>,
    pub non_empty_count: usize,
    pub empty_count: usize,
    /// Share of non-empty values matching the inferred (or dominant) type.
    pub consistency: f64,
    pub is_mixed: bool,
}

impl ColumnAnalysis {
    pub fn schema(&self) -> FieldSchema {
        let column_type = match self.column_type {
            ColumnType::Mixed => ColumnType::String,
            other => other,
        };
        FieldSchema::new(&self.name, column_type)
    }
}

/// Run type detection over each column of raw rows.
pub fn analyze_columns(headers: &[String], rows: &[Vec<String>]) -> Vec<ColumnAnalysis> {
    let names = normalize_headers(headers);
    let sample = &rows[..rows.len().min(SAMPLE_SIZE)];

    let analysis: Vec<ColumnAnalysis> = headers
        .iter()
        .zip(names)
        .enumerate()
        .map(|(i, (original, name))| {
            let values = sample.iter().map(|r| r.get(i).map(String::as_str).unwrap_or(""));
            let c = classify(values);

            let mut samples: Vec<String> = Vec::new();
            for row in sample {
                if let Some(v) = row.get(i).filter(|v| !v.trim().is_empty()) {
                    if !samples.contains(v) {
                        samples.push(v.clone());
                        if samples.len() == MAX_SAMPLES {
                            break;
                        }
                    }
                }
            }

            ColumnAnalysis {
                name,
                original_name: original.clone(),
                column_type: c.column_type,
                samples,
                non_empty_count: c.non_empty,
                empty_count: c.empty,
                consistency: c.consistency,
                is_mixed: c.column_type == ColumnType::Mixed,
            }
        })
        .collect();

    debug!(columns = analysis.len(), sampled = sample.len(), "analyzed columns");
    analysis
}

// =============================================================================
// Coercion
// =============================================================================

/// A cell that did not match its column's type. The string value was kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationWarning {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub expected: ColumnType,
    pub message: String,
}

/// Typed rows plus coercion warnings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedData {
    pub rows: Vec<Row>,
    pub warnings: Vec<NormalizationWarning>,
}

/// Coerce one raw value to a column type.
pub fn coerce_value(raw: &str, column_type: ColumnType) -> Result<CellValue, String> {
    if raw.trim().is_empty() {
        return Ok(CellValue::Null);
    }
    match column_type {
        ColumnType::Number => parse_number(raw)
            .map(CellValue::Number)
            .ok_or_else(|| format!("'{}' is not a number", raw)),
        ColumnType::Boolean => parse_boolean(raw)
            .map(CellValue::Boolean)
            .ok_or_else(|| format!("'{}' is not a boolean", raw)),
        ColumnType::Date => parse_date(raw)
            .map(CellValue::Date)
            .ok_or_else(|| format!("'{}' is not an ISO-8601 date", raw)),
        ColumnType::String | ColumnType::Mixed | ColumnType::List => Ok(CellValue::String(raw.to_string())),
    }
}

/// Coerce raw rows into typed rows keyed by normalized column names.
///
/// Coercion failures keep the original string and add a warning.
pub fn normalize_rows(rows: &[Vec<String>], analysis: &[ColumnAnalysis]) -> NormalizedData {
    let mut data = NormalizedData::default();

    for (row_idx, raw) in rows.iter().enumerate() {
        let mut row = Row::new();
        for (col_idx, column) in analysis.iter().enumerate() {
            let value = raw.get(col_idx).map(String::as_str).unwrap_or("");
            let cell = match coerce_value(value, column.column_type) {
                Ok(cell) => cell,
                Err(message) => {
                    data.warnings.push(NormalizationWarning {
                        row: row_idx,
                        column: column.name.clone(),
                        value: value.to_string(),
                        expected: column.column_type,
                        message,
                    });
                    CellValue::String(value.to_string())
                }
            };
            row.insert(column.name.clone(), cell);
        }
        data.rows.push(row);
    }

    if !data.warnings.is_empty() {
        warn!(count = data.warnings.len(), "cells kept as strings after failed coercion");
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("  Final URL "), "final_url");
        assert_eq!(normalize_column_name("finalUrl"), "final_url");
        assert_eq!(normalize_column_name("Spend ($)"), "spend");
        assert_eq!(normalize_column_name("Ad-Group #2"), "ad_group_2");
        assert_eq!(normalize_column_name("!!!"), "");
    }

    #[test]
    fn test_normalize_headers_dedupes_deterministically() {
        let headers = strings(&["Name", "name", "NAME", "", "name_2"]);
        assert_eq!(
            normalize_headers(&headers),
            vec!["name", "name_2", "name_3", "column_4", "name_2_2"]
        );
    }

    #[test]
    fn test_detect_number() {
        assert_eq!(detect_column_type(["1", "2.5", "-3", "1,234", ""]), ColumnType::Number);
    }

    #[test]
    fn test_detect_boolean() {
        assert_eq!(detect_column_type(["true", "No", "YES"]), ColumnType::Boolean);
    }

    #[test]
    fn test_number_wins_over_boolean_for_digits() {
        assert_eq!(detect_column_type(["1", "0"]), ColumnType::Number);
    }

    #[test]
    fn test_detect_date() {
        assert_eq!(
            detect_column_type(["2024-01-15", "2024-02-01T10:30:00Z", "2024-03-01 08:00"]),
            ColumnType::Date
        );
    }

    #[test]
    fn test_detect_mixed_and_string() {
        assert_eq!(detect_column_type(["10", "ten"]), ColumnType::Mixed);
        assert_eq!(detect_column_type(["red", "blue"]), ColumnType::String);
        assert_eq!(detect_column_type(["", " "]), ColumnType::String);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("12,34"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("1e5"), None);
    }

    #[test]
    fn test_parse_date_with_offset_converts_to_utc() {
        let dt = parse_date("2024-06-01T12:00:00+02:00").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "10:00");
        assert!(parse_date("06/01/2024").is_none());
    }

    #[test]
    fn test_analyze_columns() {
        let headers = strings(&["Country", "Spend", "Notes"]);
        let rows = vec![
            strings(&["US", "10", "ok"]),
            strings(&["US", "5", "12"]),
            strings(&["UK", "", "n/a"]),
        ];
        let analysis = analyze_columns(&headers, &rows);

        assert_eq!(analysis[0].name, "country");
        assert_eq!(analysis[0].column_type, ColumnType::String);
        assert_eq!(analysis[0].samples, vec!["US", "UK"]);

        assert_eq!(analysis[1].column_type, ColumnType::Number);
        assert_eq!(analysis[1].empty_count, 1);
        assert_eq!(analysis[1].non_empty_count, 2);

        assert!(analysis[2].is_mixed);
        assert!((analysis[2].consistency - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(analysis[2].schema().column_type, ColumnType::String);
    }

    #[test]
    fn test_normalize_rows_coerces_and_warns() {
        let analysis = vec![ColumnAnalysis {
            name: "spend".into(),
            original_name: "Spend".into(),
            column_type: ColumnType::Number,
            samples: vec![],
            non_empty_count: 0,
            empty_count: 0,
            consistency: 1.0,
            is_mixed: false,
        }];
        let rows = vec![strings(&["10"]), strings(&[""]), strings(&["lots"])];
        let data = normalize_rows(&rows, &analysis);

        assert_eq!(data.rows[0].get("spend"), Some(&CellValue::Number(10.0)));
        assert_eq!(data.rows[1].get("spend"), Some(&CellValue::Null));
        assert_eq!(data.rows[2].get("spend"), Some(&CellValue::from("lots")));
        assert_eq!(data.warnings.len(), 1);
        assert_eq!(data.warnings[0].row, 2);
    }
}
