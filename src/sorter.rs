use std::cmp::Ordering;

use tracing::debug;

use crate::columns::{cell, column_is_integer, numeric_value};
use crate::parser::Row;

const MEASURE_COLUMNS: [&str; 2] = ["active_month", "mau"];

/// Index of the first header naming the active month measure.
pub fn find_measure_column(header: &Row) -> Option<usize> {
    header.iter().position(|name| {
        let normalized = name.trim().to_lowercase();
        MEASURE_COLUMNS.contains(&normalized.as_str())
    })
}

/// Orders rows by the active month measure, largest first. Rows keep their
/// file order when no measure column exists.
pub fn sort_by_measure(header: &Row, data: &mut [Row]) -> Option<usize> {
    let idx = find_measure_column(header)?;
    let numeric = column_is_integer(idx, data);
    debug!(
        "Sorting {} rows by \"{}\" ({})",
        data.len(),
        header[idx],
        if numeric { "numeric" } else { "text" }
    );

    // sort_by is stable, equal values stay in file order
    data.sort_by(|left, right| {
        let l = cell(left, idx);
        let r = cell(right, idx);
        if numeric {
            numeric_value(r)
                .partial_cmp(&numeric_value(l))
                .unwrap_or(Ordering::Equal)
        } else {
            r.cmp(l)
        }
    });
    Some(idx)
}
