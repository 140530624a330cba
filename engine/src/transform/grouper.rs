//! Partition rows into groups by a (possibly composite) key.
//!
//! # Architecture
//!
//! ```text
//! Input rows (flat)                 →  Groups (first-seen order)
//! ┌─────────────────────────────┐     ┌──────────────────────────┐
//! │ country: US, spend: 10      │     │ [US]   rows 0, 1         │
//! │ country: US, spend: 5       │  →  ├──────────────────────────┤
//! │ country: -,  spend: 7       │     │ <null> rows 2            │
//! │ country: UK, spend: 3       │     ├──────────────────────────┤
//! └─────────────────────────────┘     │ [UK]   rows 3            │
//!                                     └──────────────────────────┘
//! ```
//!
//! Key parts compare by their display string, part by part. Rows with any
//! missing or empty key part share a single null-key group, which keeps
//! the position where it was first seen.

use std::collections::HashMap;

use crate::models::{CellValue, Row};

/// Identity of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Display strings of each key part.
    Values(Vec<String>),
    /// At least one key part was missing or empty.
    Missing,
}

impl GroupKey {
    pub fn is_missing(&self) -> bool {
        matches!(self, GroupKey::Missing)
    }
}

/// One partition of the input.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub key: GroupKey,
    /// Key cells taken from the first row of the group, `Null` for the
    /// null-key group.
    pub key_values: Vec<CellValue>,
    /// Member rows in input order.
    pub rows: Vec<&'a Row>,
    /// Input indices of the member rows.
    pub indices: Vec<usize>,
}

/// Result of [`group_rows`].
#[derive(Debug, Clone, Default)]
pub struct Grouping<'a> {
    pub groups: Vec<Group<'a>>,
    /// Input indices of rows that landed in the null-key group.
    pub missing_key_rows: Vec<usize>,
}

fn key_of(row: &Row, fields: &[String]) -> (GroupKey, Vec<CellValue>) {
    let mut parts = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        match row.get(field) {
            Some(v) if !v.is_empty() => {
                parts.push(v.to_string());
                values.push(v.clone());
            }
            _ => return (GroupKey::Missing, vec![CellValue::Null; fields.len()]),
        }
    }
    (GroupKey::Values(parts), values)
}

/// Group `rows` by `fields`, preserving first-seen group order and input
/// order within each group.
pub fn group_rows<'a>(rows: &'a [Row], fields: &[String]) -> Grouping<'a> {
    let mut grouping = Grouping::default();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        let (key, key_values) = key_of(row, fields);
        if key.is_missing() {
            grouping.missing_key_rows.push(i);
        }
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            grouping.groups.push(Group {
                key,
                key_values,
                rows: Vec::new(),
                indices: Vec::new(),
            });
            grouping.groups.len() - 1
        });
        let group = &mut grouping.groups[slot];
        group.rows.push(row);
        group.indices.push(i);
    }

    grouping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_seen_order() {
        let rows = vec![
            Row::from_pairs([("country", "US"), ("spend", "10")]),
            Row::from_pairs([("country", "UK"), ("spend", "3")]),
            Row::from_pairs([("country", "US"), ("spend", "5")]),
        ];

        let grouping = group_rows(&rows, &fields(&["country"]));

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].key, GroupKey::Values(vec!["US".into()]));
        assert_eq!(grouping.groups[0].rows.len(), 2);
        assert_eq!(grouping.groups[0].indices, vec![0, 2]);
        assert_eq!(grouping.groups[1].key_values, vec![CellValue::from("UK")]);
        assert!(grouping.missing_key_rows.is_empty());
    }

    #[test]
    fn test_missing_key_group_keeps_position() {
        let rows = vec![
            Row::from_pairs([("country", "US")]),
            Row::from_pairs([("country", "")]),
            Row::from_pairs([("other", "x")]),
            Row::from_pairs([("country", "UK")]),
        ];

        let grouping = group_rows(&rows, &fields(&["country"]));

        assert_eq!(grouping.groups.len(), 3);
        assert!(grouping.groups[1].key.is_missing());
        assert_eq!(grouping.groups[1].rows.len(), 2);
        assert_eq!(grouping.groups[1].key_values, vec![CellValue::Null]);
        assert_eq!(grouping.missing_key_rows, vec![1, 2]);
    }

    #[test]
    fn test_composite_keys_do_not_collide() {
        // Joining "a|b" + "c" and "a" + "b|c" with a delimiter would merge these.
        let rows = vec![
            Row::from_pairs([("x", "a|b"), ("y", "c")]),
            Row::from_pairs([("x", "a"), ("y", "b|c")]),
        ];

        let grouping = group_rows(&rows, &fields(&["x", "y"]));
        assert_eq!(grouping.groups.len(), 2);
    }

    #[test]
    fn test_keys_compare_by_display_string() {
        let rows = vec![
            Row::from_pairs([("n", CellValue::Number(1.0))]),
            Row::from_pairs([("n", CellValue::from("1"))]),
        ];

        let grouping = group_rows(&rows, &fields(&["n"]));
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].key_values, vec![CellValue::Number(1.0)]);
    }
}
