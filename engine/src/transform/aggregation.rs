//! Aggregation functions applied to one group of rows.
//!
//! Numeric functions use their own lenient parse ([`lenient_number`]) and
//! exclude values that do not parse, independently of column typing.
//! "Non-null" below means not [`CellValue::is_empty`].

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use super::condition::Condition;
use crate::error::{ConfigError, ConfigResult};
use crate::models::{CellValue, ColumnType, Row};
use crate::normalize::parse_date;

/// Closed set of aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    First,
    Last,
    Concat,
    Collect,
    DistinctCount,
    CountIf,
}

impl AggregationFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationFunction::Count => "COUNT",
            AggregationFunction::Sum => "SUM",
            AggregationFunction::Min => "MIN",
            AggregationFunction::Max => "MAX",
            AggregationFunction::Avg => "AVG",
            AggregationFunction::First => "FIRST",
            AggregationFunction::Last => "LAST",
            AggregationFunction::Concat => "CONCAT",
            AggregationFunction::Collect => "COLLECT",
            AggregationFunction::DistinctCount => "DISTINCT_COUNT",
            AggregationFunction::CountIf => "COUNT_IF",
        }
    }

    /// Everything except COUNT and COUNT_IF reads a source field.
    pub fn requires_source_field(&self) -> bool {
        !matches!(self, AggregationFunction::Count | AggregationFunction::CountIf)
    }

    /// SUM, MIN, MAX and AVG.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AggregationFunction::Sum | AggregationFunction::Min | AggregationFunction::Max | AggregationFunction::Avg
        )
    }

    /// Type of the produced column given the source column type.
    pub fn output_type(&self, source: Option<ColumnType>) -> ColumnType {
        match self {
            AggregationFunction::Count
            | AggregationFunction::Sum
            | AggregationFunction::Avg
            | AggregationFunction::DistinctCount
            | AggregationFunction::CountIf => ColumnType::Number,
            AggregationFunction::Min | AggregationFunction::Max => match source {
                Some(ColumnType::Date) => ColumnType::Date,
                _ => ColumnType::Number,
            },
            AggregationFunction::First | AggregationFunction::Last => match source {
                Some(ColumnType::Mixed) | None => ColumnType::String,
                Some(t) => t,
            },
            AggregationFunction::Concat => ColumnType::String,
            AggregationFunction::Collect => ColumnType::List,
        }
    }
}

impl FromStr for AggregationFunction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_uppercase().replace(&['-', ' '][..], "_");
        let f = match key.as_str() {
            "COUNT" => AggregationFunction::Count,
            "SUM" => AggregationFunction::Sum,
            "MIN" => AggregationFunction::Min,
            "MAX" => AggregationFunction::Max,
            "AVG" | "AVERAGE" => AggregationFunction::Avg,
            "FIRST" => AggregationFunction::First,
            "LAST" => AggregationFunction::Last,
            "CONCAT" => AggregationFunction::Concat,
            "COLLECT" => AggregationFunction::Collect,
            "DISTINCT_COUNT" => AggregationFunction::DistinctCount,
            "COUNT_IF" => AggregationFunction::CountIf,
            _ => return Err(ConfigError::UnknownFunction(s.to_string())),
        };
        Ok(f)
    }
}

impl TryFrom<String> for AggregationFunction {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationFunction> for String {
    fn from(f: AggregationFunction) -> Self {
        f.as_str().to_string()
    }
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function-specific parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregationOptions {
    /// CONCAT separator. Defaults to the empty string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// COUNT_IF predicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// COUNT counts distinct source values; CONCAT/COLLECT drop repeats.
    pub distinct: bool,
    /// COLLECT keeps at most this many values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One aggregation: `function(sourceField) AS outputField`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    pub output_field: String,
    pub function: AggregationFunction,
    #[serde(default)]
    pub options: AggregationOptions,
}

impl AggregationConfig {
    pub fn new(function: AggregationFunction, output_field: impl Into<String>) -> Self {
        Self {
            source_field: None,
            output_field: output_field.into(),
            function,
            options: AggregationOptions::default(),
        }
    }

    pub fn source(mut self, field: impl Into<String>) -> Self {
        self.source_field = Some(field.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.options.separator = Some(separator.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.options.condition = Some(condition);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.options.distinct = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Structural requirements that must hold before execution.
    pub fn check(&self) -> ConfigResult<()> {
        if self.function.requires_source_field() && self.source_field.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingSourceField {
                output: self.output_field.clone(),
                function: self.function.to_string(),
            });
        }
        if self.function == AggregationFunction::CountIf && self.options.condition.is_none() {
            return Err(ConfigError::MissingCondition(self.output_field.clone()));
        }
        Ok(())
    }
}

/// Lenient number parse: accepts numbers, and strings with currency
/// symbols, `,` grouping, spaces or a trailing `%`.
pub fn lenient_number(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches(&['$', '€', '£', '¥'][..])
                .trim_end_matches('%')
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

fn as_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::String(s) => parse_date(s),
        _ => None,
    }
}

fn row<R: Borrow<Row>>(r: &R) -> &Row {
    r.borrow()
}

/// Key used for value equality in DISTINCT handling.
fn distinct_key(value: &CellValue) -> String {
    value.to_string()
}

/// Compute every aggregation over one group, in config order.
///
/// Fails only on malformed configuration, including two aggregations with
/// the same output field; data never causes an error.
pub fn execute<R: Borrow<Row>>(group_rows: &[R], configs: &[AggregationConfig]) -> ConfigResult<Row> {
    let mut outputs = HashSet::new();
    for config in configs {
        config.check()?;
        if !outputs.insert(config.output_field.as_str()) {
            return Err(ConfigError::DuplicateOutputField(config.output_field.clone()));
        }
    }

    let mut output = Row::new();
    for config in configs {
        output.insert(config.output_field.clone(), aggregate(group_rows, config));
    }
    Ok(output)
}

/// Non-null values of the source field, in group order.
fn source_values<'a, R: Borrow<Row>>(rows: &'a [R], field: &str) -> impl Iterator<Item = &'a CellValue> + 'a {
    let field = field.to_string();
    rows.iter()
        .filter_map(move |r| row(r).get(&field))
        .filter(|v| !v.is_empty())
}

fn dedupe<'a>(values: impl Iterator<Item = &'a CellValue>, distinct: bool) -> Vec<&'a CellValue> {
    if !distinct {
        return values.collect();
    }
    let mut seen = HashSet::new();
    values.filter(|v| seen.insert(distinct_key(v))).collect()
}

fn aggregate<R: Borrow<Row>>(rows: &[R], config: &AggregationConfig) -> CellValue {
    let field = config.source_field.as_deref().unwrap_or("");
    let options = &config.options;

    match config.function {
        AggregationFunction::Count => {
            if options.distinct && !field.is_empty() {
                let distinct: HashSet<String> = source_values(rows, field).map(distinct_key).collect();
                CellValue::Number(distinct.len() as f64)
            } else {
                CellValue::Number(rows.len() as f64)
            }
        }
        AggregationFunction::CountIf => {
            let count = options
                .condition
                .as_ref()
                .map_or(0, |c| rows.iter().filter(|r| c.evaluate(row(*r))).count());
            CellValue::Number(count as f64)
        }
        AggregationFunction::DistinctCount => {
            let distinct: HashSet<String> = source_values(rows, field).map(distinct_key).collect();
            CellValue::Number(distinct.len() as f64)
        }
        AggregationFunction::Sum => {
            CellValue::Number(source_values(rows, field).filter_map(lenient_number).sum())
        }
        AggregationFunction::Avg => {
            let numbers: Vec<f64> = source_values(rows, field).filter_map(lenient_number).collect();
            if numbers.is_empty() {
                CellValue::Null
            } else {
                CellValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregationFunction::Min | AggregationFunction::Max => {
            let pick_max = config.function == AggregationFunction::Max;
            let number = source_values(rows, field)
                .filter_map(lenient_number)
                .reduce(|a, b| if (b > a) == pick_max { b } else { a });
            if let Some(n) = number {
                return CellValue::Number(n);
            }
            // Date columns reduce chronologically.
            source_values(rows, field)
                .filter_map(as_date)
                .reduce(|a, b| if (b > a) == pick_max { b } else { a })
                .map_or(CellValue::Null, CellValue::Date)
        }
        AggregationFunction::First => rows
            .first()
            .and_then(|r| row(r).get(field).cloned())
            .unwrap_or(CellValue::Null),
        AggregationFunction::Last => rows
            .last()
            .and_then(|r| row(r).get(field).cloned())
            .unwrap_or(CellValue::Null),
        AggregationFunction::Concat => {
            let separator = options.separator.as_deref().unwrap_or("");
            let parts: Vec<String> = dedupe(source_values(rows, field), options.distinct)
                .into_iter()
                .map(|v| v.to_string())
                .collect();
            CellValue::String(parts.join(separator))
        }
        AggregationFunction::Collect => {
            let mut items: Vec<CellValue> = dedupe(source_values(rows, field), options.distinct)
                .into_iter()
                .cloned()
                .collect();
            if let Some(limit) = options.limit {
                items.truncate(limit);
            }
            CellValue::List(items)
        }
    }
}

/// Count of non-null source values a numeric function had to exclude.
pub fn excluded_count<R: Borrow<Row>>(rows: &[R], config: &AggregationConfig) -> usize {
    match (&config.source_field, config.function.is_numeric()) {
        (Some(field), true) => source_values(rows, field)
            .filter(|v| lenient_number(v).is_none())
            .count(),
        _ => 0,
    }
}
