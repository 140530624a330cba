//! Domain models shared across the pipeline.
//!
//! - [`CellValue`] - a typed cell (string, number, boolean, date, list, null)
//! - [`Row`] - an ordered column → cell mapping
//! - [`ColumnType`] - closed set of inferred column types
//! - [`FieldSchema`] - a named, typed field of a data source
//! - [`EntityType`] / [`ErrorCode`] / [`ValidationIssue`] - the diagnostic contract

use chrono::{NaiveDateTime, Timelike};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

// =============================================================================
// Cell Value
// =============================================================================

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum CellValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    /// Produced by COLLECT aggregations.
    List(Vec<CellValue>),
    #[default]
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Null, a blank string or an empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::String(s) => s.trim().is_empty(),
            CellValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number held by a `Number` cell. No string parsing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            CellValue::String(_) => Some(ColumnType::String),
            CellValue::Number(_) => Some(ColumnType::Number),
            CellValue::Boolean(_) => Some(ColumnType::Boolean),
            CellValue::Date(_) => Some(ColumnType::Date),
            CellValue::List(_) => Some(ColumnType::List),
            CellValue::Null => None,
        }
    }
}

/// Format a number without a trailing `.0` when it is integral.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Format a date as `YYYY-MM-DD`, adding the time when it is not midnight.
pub fn format_date(d: &NaiveDateTime) -> String {
    if d.hour() == 0 && d.minute() == 0 && d.second() == 0 && d.nanosecond() == 0 {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::Date(d) => write!(f, "{}", format_date(d)),
            CellValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            CellValue::Null => Ok(()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::Date(d) => serializer.serialize_str(&format_date(d)),
            CellValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            CellValue::Null => serializer.serialize_unit(),
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(b),
            Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
            Value::String(s) => CellValue::String(s),
            Value::Array(items) => CellValue::List(items.into_iter().map(CellValue::from).collect()),
            Value::Object(_) => CellValue::String(value.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

// =============================================================================
// Row
// =============================================================================

/// One record: column name → cell, in insertion order.
///
/// Column names are unique; inserting an existing name replaces the cell
/// in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<CellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(k, v);
        }
        row
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.iter().any(|(k, _)| k == column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// A copy of this row with `other`'s cells written over it.
    pub fn overlay(&self, other: &Row) -> Row {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            merged.insert(k, v.clone());
        }
        merged
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row::from_pairs(iter)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// =============================================================================
// Column Types and Schemas
// =============================================================================

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    /// Some but not all values match a non-string type. Coerced as string.
    Mixed,
    /// Sequence values, produced by COLLECT.
    List,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Mixed => "mixed",
            ColumnType::List => "list",
        };
        f.write_str(s)
    }
}

/// A named field of a (possibly virtual) data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Kind of entity an issue is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Campaign,
    AdGroup,
    Ad,
    Keyword,
    Creative,
    #[default]
    Row,
    Transform,
}

/// Stable vocabulary of diagnostic codes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RequiredField,
    InvalidUrl,
    InvalidDate,
    InvalidDateRange,
    InvalidEnum,
    LengthExceeded,
    LengthBelowMinimum,
    LengthNearLimit,
    InvalidType,
    OutOfRange,
    UnknownField,
    DuplicateOutputField,
    MissingSourceField,
    InvalidCondition,
    TypeMismatch,
    MissingGroupKey,
    EmptySource,
    NoAggregations,
    UnresolvedVariable,
    UnknownFilter,
    FilterFailed,
    EmptyValue,
    TemplateSyntax,
    AssetNotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RequiredField => "REQUIRED_FIELD",
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::InvalidDate => "INVALID_DATE",
            ErrorCode::InvalidDateRange => "INVALID_DATE_RANGE",
            ErrorCode::InvalidEnum => "INVALID_ENUM",
            ErrorCode::LengthExceeded => "LENGTH_EXCEEDED",
            ErrorCode::LengthBelowMinimum => "LENGTH_BELOW_MINIMUM",
            ErrorCode::LengthNearLimit => "LENGTH_NEAR_LIMIT",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::UnknownField => "UNKNOWN_FIELD",
            ErrorCode::DuplicateOutputField => "DUPLICATE_OUTPUT_FIELD",
            ErrorCode::MissingSourceField => "MISSING_SOURCE_FIELD",
            ErrorCode::InvalidCondition => "INVALID_CONDITION",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::MissingGroupKey => "MISSING_GROUP_KEY",
            ErrorCode::EmptySource => "EMPTY_SOURCE",
            ErrorCode::NoAggregations => "NO_AGGREGATIONS",
            ErrorCode::UnresolvedVariable => "UNRESOLVED_VARIABLE",
            ErrorCode::UnknownFilter => "UNKNOWN_FILTER",
            ErrorCode::FilterFailed => "FILTER_FAILED",
            ErrorCode::EmptyValue => "EMPTY_VALUE",
            ErrorCode::TemplateSyntax => "TEMPLATE_SYNTAX",
            ErrorCode::AssetNotFound => "ASSET_NOT_FOUND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation error or warning.
///
/// Errors and warnings share this shape; which list an issue lands in
/// decides whether it blocks downstream use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub field: String,
    pub code: ErrorCode,
    pub message: String,
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
        field: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            field: field.into(),
            code,
            message: message.into(),
            value: None,
            expected: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' field '{}': [{}] {}",
            serde_json::to_value(self.entity_type)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default(),
            self.entity_name,
            self.field,
            self.code,
            self.message
        )
    }
}

/// Identity of the entity a row describes, used to label issues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityContext {
    pub entity_type: EntityType,
    /// Column holding the entity id. Falls back to `row-<index>`.
    pub id_field: Option<String>,
    /// Column holding the entity display name. Falls back to the id.
    pub name_field: Option<String>,
}

impl EntityContext {
    /// Resolve `(id, name)` for the row at `index`.
    pub fn identify(&self, row: &Row, index: usize) -> (String, String) {
        let lookup = |field: &Option<String>| {
            field
                .as_deref()
                .and_then(|f| row.get(f))
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };
        let id = lookup(&self.id_field).unwrap_or_else(|| format!("row-{}", index));
        let name = lookup(&self.name_field).unwrap_or_else(|| id.clone());
        (id, name)
    }
}
