use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::columns::{ColumnDef, build_columns, cell};
use crate::domain::ViewerError;
use crate::parser::{Row, parse_csv};
use crate::sorter::sort_by_measure;

/// A fully parsed csv resource. Rows are ordered by the active month measure
/// when the file has one.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
    // Widest cell (or header) per column, in characters
    pub max_widths: Vec<usize>,
    pub sorted_by: Option<usize>,
    raw: String,
}

impl Dataset {
    #[instrument(level = "debug", skip(raw), fields(bytes = raw.len()))]
    pub fn from_text(raw: String) -> Result<Self, ViewerError> {
        let start_time = Instant::now();
        let mut parsed = parse_csv(&raw).into_iter();
        let header = parsed.next().ok_or(ViewerError::NoData)?;
        let mut rows: Vec<Row> = parsed.collect();

        let sorted_by = sort_by_measure(&header, &mut rows);
        let columns = build_columns(&header, &rows);
        let max_widths = Self::measure_columns(&columns, &rows);

        info!(
            "Built dataset with {} columns and {} rows in {}ms",
            columns.len(),
            rows.len(),
            start_time.elapsed().as_millis()
        );
        Ok(Dataset {
            columns,
            rows,
            max_widths,
            sorted_by,
            raw,
        })
    }

    fn measure_columns(columns: &[ColumnDef], rows: &[Row]) -> Vec<usize> {
        columns
            .par_iter()
            .enumerate()
            .map(|(idx, column)| {
                rows.iter()
                    .map(|row| cell(row, idx).chars().count())
                    .max()
                    .unwrap_or(0)
                    .max(column.name.chars().count())
            })
            .collect()
    }

    pub fn value(&self, row: usize, column: usize) -> &str {
        self.rows.get(row).map(|r| cell(r, column)).unwrap_or("")
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncolumns(&self) -> usize {
        self.columns.len()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}
