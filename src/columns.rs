use std::cmp::Ordering;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use tracing::trace;

use crate::parser::Row;

static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("integer pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDef {
    /// Ordering used when rows are sorted by this column.
    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        match self.kind {
            ColumnKind::Integer => numeric_value(left)
                .partial_cmp(&numeric_value(right))
                .unwrap_or(Ordering::Equal),
            ColumnKind::Text => left.cmp(right),
        }
    }
}

// Empty cells count as zero.
pub fn numeric_value(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}

pub fn cell(row: &Row, idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

pub fn is_integer(value: &str) -> bool {
    INTEGER_PATTERN.is_match(value)
}

/// A column is integer typed when it has at least one value and every
/// non-empty value is a plain integer.
pub fn column_is_integer(column_idx: usize, data: &[Row]) -> bool {
    let mut saw_value = false;
    for row in data {
        let value = cell(row, column_idx);
        if value.is_empty() {
            continue;
        }
        saw_value = true;
        if !is_integer(value) {
            return false;
        }
    }
    saw_value
}

pub fn column_name(header: &str, idx: usize) -> String {
    if header.is_empty() {
        format!("Column {}", idx + 1)
    } else {
        header.to_string()
    }
}

pub fn build_columns(header: &Row, data: &[Row]) -> Vec<ColumnDef> {
    header
        .par_iter()
        .enumerate()
        .map(|(idx, name)| {
            let kind = if column_is_integer(idx, data) {
                ColumnKind::Integer
            } else {
                ColumnKind::Text
            };
            trace!("Column {idx} \"{name}\" inferred as {kind:?}");
            ColumnDef {
                name: column_name(name, idx),
                kind,
            }
        })
        .collect()
}
