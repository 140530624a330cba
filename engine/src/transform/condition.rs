//! Condition operators shared by COUNT_IF and creative selection rules.
//!
//! Comparisons are numeric when both sides parse as numbers, by date when
//! both sides parse as dates, and by string otherwise. Ordering operators
//! on values that are neither numbers nor dates never hold.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::aggregation::lenient_number;
use crate::error::ConfigError;
use crate::models::{CellValue, Row};
use crate::normalize::parse_date;

/// Closed set of comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    In,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::GreaterThanOrEqual => "greater_than_or_equal",
            ConditionOperator::LessThanOrEqual => "less_than_or_equal",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
            ConditionOperator::IsEmpty => "is_empty",
            ConditionOperator::IsNotEmpty => "is_not_empty",
            ConditionOperator::In => "in",
        }
    }

    /// Operators that order values.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ConditionOperator::GreaterThan
                | ConditionOperator::LessThan
                | ConditionOperator::GreaterThanOrEqual
                | ConditionOperator::LessThanOrEqual
        )
    }

    /// Operators that ignore the condition value.
    pub fn is_unary(&self) -> bool {
        matches!(self, ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty)
    }
}

impl FromStr for ConditionOperator {
    type Err = ConfigError;

    /// Accepts snake_case, camelCase and the usual symbols (`==`, `!=`, `>`, …).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        let op = match key.as_str() {
            "equals" | "eq" | "=" | "==" => ConditionOperator::Equals,
            "notequals" | "neq" | "ne" | "!=" | "<>" => ConditionOperator::NotEquals,
            "greaterthan" | "gt" | ">" => ConditionOperator::GreaterThan,
            "lessthan" | "lt" | "<" => ConditionOperator::LessThan,
            "greaterthanorequal" | "gte" | ">=" => ConditionOperator::GreaterThanOrEqual,
            "lessthanorequal" | "lte" | "<=" => ConditionOperator::LessThanOrEqual,
            "contains" => ConditionOperator::Contains,
            "notcontains" => ConditionOperator::NotContains,
            "startswith" => ConditionOperator::StartsWith,
            "endswith" => ConditionOperator::EndsWith,
            "isempty" => ConditionOperator::IsEmpty,
            "isnotempty" => ConditionOperator::IsNotEmpty,
            "in" => ConditionOperator::In,
            _ => return Err(ConfigError::UnsupportedOperator(s.to_string())),
        };
        Ok(op)
    }
}

impl TryFrom<String> for ConditionOperator {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{field, operator, value}` predicate over a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: CellValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<CellValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Whether the row satisfies this condition. Missing fields read as null.
    pub fn evaluate(&self, row: &Row) -> bool {
        let actual = row.get(&self.field).unwrap_or(&CellValue::Null);
        compare(self.operator, actual, &self.value)
    }

    /// Static sanity check of the operand, for config validation.
    pub fn check(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field is empty".to_string());
        }
        if self.operator.is_ordering()
            && lenient_number(&self.value).is_none()
            && as_date(&self.value).is_none()
        {
            return Err(format!(
                "operator '{}' needs a numeric or date value, got '{}'",
                self.operator, self.value
            ));
        }
        if self.operator == ConditionOperator::In && self.value.is_empty() {
            return Err("operator 'in' needs a list of values".to_string());
        }
        Ok(())
    }
}

fn as_date(value: &CellValue) -> Option<chrono::NaiveDateTime> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::String(s) => parse_date(s),
        _ => None,
    }
}

fn order(actual: &CellValue, expected: &CellValue) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (lenient_number(actual), lenient_number(expected)) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (as_date(actual), as_date(expected)) {
        return Some(a.cmp(&b));
    }
    None
}

/// Value equality: numeric, then boolean, then trimmed string.
pub fn values_equal(actual: &CellValue, expected: &CellValue) -> bool {
    if let (Some(a), Some(b)) = (lenient_number(actual), lenient_number(expected)) {
        return a == b;
    }
    if let (CellValue::Boolean(a), CellValue::Boolean(b)) = (actual, expected) {
        return a == b;
    }
    actual.to_string().trim() == expected.to_string().trim()
}

fn candidates(expected: &CellValue) -> Vec<CellValue> {
    match expected {
        CellValue::List(items) => items.clone(),
        CellValue::String(s) => s.split(',').map(|p| CellValue::from(p.trim())).collect(),
        other => vec![other.clone()],
    }
}

/// Apply an operator to a pair of values.
pub fn compare(operator: ConditionOperator, actual: &CellValue, expected: &CellValue) -> bool {
    let lower = |v: &CellValue| v.to_string().to_lowercase();

    match operator {
        ConditionOperator::IsEmpty => actual.is_empty(),
        ConditionOperator::IsNotEmpty => !actual.is_empty(),
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),
        ConditionOperator::GreaterThan => order(actual, expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => order(actual, expected) == Some(Ordering::Less),
        ConditionOperator::GreaterThanOrEqual => {
            matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        ConditionOperator::LessThanOrEqual => {
            matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
        ConditionOperator::Contains | ConditionOperator::NotContains => {
            let found = match actual {
                CellValue::Null => false,
                CellValue::List(items) => items.iter().any(|i| values_equal(i, expected)),
                _ => lower(actual).contains(&lower(expected)),
            };
            (operator == ConditionOperator::Contains) == found
        }
        ConditionOperator::StartsWith => !actual.is_null() && lower(actual).starts_with(&lower(expected)),
        ConditionOperator::EndsWith => !actual.is_null() && lower(actual).ends_with(&lower(expected)),
        ConditionOperator::In => candidates(expected).iter().any(|c| values_equal(actual, c)),
    }
}
