use std::ops::Range;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{error, trace};

use crate::columns::{ColumnKind, cell};
use crate::dataset::Dataset;
use crate::domain::RowLimit;

pub const COLUMN_WIDTH_MARGIN: usize = 1;
const SORT_MARKER_WIDTH: usize = 2;

#[derive(Clone, Debug, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
    pub numeric: bool,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ColumnStatus {
    NORMAL,
    EXPANDED,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct SortState {
    pub column: usize,
    pub ascending: bool,
}

/// Width of the row number column for a dataset of `nrows` rows.
pub fn index_width(nrows: usize) -> usize {
    nrows.max(1).to_string().len()
}

/// One rendered instance of the table. It only holds view state (filter,
/// ordering, page and cursor) as indices into the dataset, so dropping it
/// leaves the dataset untouched.
pub struct GridView {
    limit: RowLimit,
    rows: Vec<usize>, // View position to dataset row index, after search and sort
    search: Option<String>,
    sort: Option<SortState>,
    column_status: Vec<ColumnStatus>,
    max_column_width: usize,
    page: usize,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize, // Scroll offset inside the current page
    offset_column: usize,
    visible_columns: Vec<usize>,
    last_column_partial: bool,
    data: Vec<ColumnView>,
    index: ColumnView,
    heigh: usize,
    width: usize,
}

impl GridView {
    pub fn new(
        dataset: &Dataset,
        limit: RowLimit,
        max_column_width: usize,
        width: usize,
        heigh: usize,
    ) -> Self {
        let mut grid = GridView {
            limit,
            rows: (0..dataset.nrows()).collect(),
            search: None,
            sort: None,
            column_status: vec![ColumnStatus::NORMAL; dataset.ncolumns()],
            max_column_width,
            page: 0,
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            visible_columns: Vec::new(),
            last_column_partial: false,
            data: Vec::new(),
            index: ColumnView::default(),
            heigh,
            width,
        };
        grid.refresh(dataset);
        grid
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.limit
            .page_size()
            .unwrap_or_else(|| self.rows.len().max(1))
    }

    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(self.page_size()).max(1)
    }

    /// View positions shown on the current page.
    pub fn page_range(&self) -> Range<usize> {
        let end = std::cmp::min((self.page + 1) * self.page_size(), self.rows.len());
        let start = std::cmp::min(self.page * self.page_size(), end);
        start..end
    }

    fn page_len(&self) -> usize {
        self.page_range().len()
    }

    /// Number of rows left after the search filter.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn sort_state(&self) -> Option<SortState> {
        self.sort
    }

    pub fn columns(&self) -> &[ColumnView] {
        &self.data
    }

    pub fn index(&self) -> &ColumnView {
        &self.index
    }

    pub fn curser(&self) -> (usize, usize) {
        (self.curser_row, self.curser_column)
    }

    /// Dataset row under the cursor.
    pub fn selected_row(&self) -> Option<usize> {
        let pos = self.page_range().start + self.offset_row + self.curser_row;
        if pos < self.page_range().end {
            self.rows.get(pos).copied()
        } else {
            None
        }
    }

    pub fn selected_column(&self) -> usize {
        self.offset_column + self.curser_column
    }

    // -------------------- Filtering and ordering ---------------------- //

    pub fn search(&mut self, dataset: &Dataset, term: &str) {
        let term = term.trim();
        self.search = if term.is_empty() {
            None
        } else {
            Some(term.to_string())
        };
        self.rebuild_rows(dataset);
    }

    pub fn sort(&mut self, dataset: &Dataset, column: usize, ascending: bool) {
        if column >= dataset.ncolumns() {
            error!("Trying to sort by unknown column {column}!");
            return;
        }
        self.sort = Some(SortState { column, ascending });
        self.rebuild_rows(dataset);
    }

    fn rebuild_rows(&mut self, dataset: &Dataset) {
        let start_time = Instant::now();
        let mut rows: Vec<usize> = match &self.search {
            None => (0..dataset.nrows()).collect(),
            Some(term) => {
                let needle = term.to_lowercase();
                (0..dataset.nrows())
                    .into_par_iter()
                    .filter(|&ridx| {
                        dataset.rows[ridx]
                            .iter()
                            .any(|c| c.to_lowercase().contains(&needle))
                    })
                    .collect()
            }
        };

        if let Some(SortState { column, ascending }) = self.sort {
            let def = &dataset.columns[column];
            rows.sort_by(|&a, &b| {
                let ord = def.compare(
                    cell(&dataset.rows[a], column),
                    cell(&dataset.rows[b], column),
                );
                if ascending { ord } else { ord.reverse() }
            });
        }

        trace!(
            "Rebuilt view rows ({} of {}) in {}ms",
            rows.len(),
            dataset.nrows(),
            start_time.elapsed().as_millis()
        );
        self.rows = rows;
        self.set_page(dataset, 0);
    }

    pub fn toggle_expand(&mut self, dataset: &Dataset) {
        let column = self.selected_column();
        if let Some(status) = self.column_status.get_mut(column) {
            *status = match status {
                ColumnStatus::NORMAL => ColumnStatus::EXPANDED,
                ColumnStatus::EXPANDED => ColumnStatus::NORMAL,
            };
        }
        self.refresh(dataset);
    }

    // -------------------- Pagination ---------------------- //

    pub fn set_page(&mut self, dataset: &Dataset, page: usize) {
        self.page = std::cmp::min(page, self.page_count() - 1);
        self.curser_row = 0;
        self.offset_row = 0;
        self.refresh(dataset);
    }

    pub fn next_page(&mut self, dataset: &Dataset) {
        self.set_page(dataset, self.page + 1);
    }

    pub fn prev_page(&mut self, dataset: &Dataset) {
        self.set_page(dataset, self.page.saturating_sub(1));
    }

    pub fn first_page(&mut self, dataset: &Dataset) {
        self.set_page(dataset, 0);
    }

    pub fn last_page(&mut self, dataset: &Dataset) {
        self.set_page(dataset, self.page_count() - 1);
    }

    // -------------------- Cursor movement ---------------------- //

    fn select_in_page(&mut self, target: usize) {
        let heigh = self.heigh.max(1);
        if target < self.offset_row {
            self.offset_row = target;
            self.curser_row = 0;
        } else if target >= self.offset_row + heigh {
            self.offset_row = target + 1 - heigh;
            self.curser_row = heigh - 1;
        } else {
            self.curser_row = target - self.offset_row;
        }
    }

    pub fn move_down(&mut self, dataset: &Dataset, size: usize) {
        let page_len = self.page_len();
        if page_len == 0 {
            return;
        }
        let target = std::cmp::min(self.offset_row + self.curser_row + size, page_len - 1);
        self.select_in_page(target);
        self.refresh(dataset);
    }

    pub fn move_up(&mut self, dataset: &Dataset, size: usize) {
        let target = (self.offset_row + self.curser_row).saturating_sub(size);
        self.select_in_page(target);
        self.refresh(dataset);
    }

    pub fn move_beginning(&mut self, dataset: &Dataset) {
        self.curser_row = 0;
        self.offset_row = 0;
        self.refresh(dataset);
    }

    pub fn move_end(&mut self, dataset: &Dataset) {
        let page_len = self.page_len();
        if page_len > 0 {
            self.select_in_page(page_len - 1);
        }
        self.refresh(dataset);
    }

    pub fn move_left(&mut self, dataset: &Dataset) {
        if self.curser_column > 0 {
            self.curser_column -= 1;
        } else if self.offset_column > 0 {
            self.offset_column -= 1;
        }
        self.refresh(dataset);
    }

    pub fn move_right(&mut self, dataset: &Dataset) {
        if self.selected_column() + 1 >= dataset.ncolumns() {
            return;
        }
        let fully_visible = self.visible_columns.len() - usize::from(self.last_column_partial);
        if self.curser_column + 1 < fully_visible {
            self.curser_column += 1;
        } else {
            // At the right edge of the screen, shift the column window
            self.offset_column += 1;
        }
        self.refresh(dataset);
    }

    pub fn resize(&mut self, dataset: &Dataset, width: usize, heigh: usize) {
        let current = self.offset_row + self.curser_row;
        self.width = width;
        self.heigh = heigh;
        self.offset_row = 0;
        self.curser_row = 0;
        if current < self.page_len() {
            self.select_in_page(current);
        }
        self.refresh(dataset);
    }

    // -------------------- View building ---------------------- //

    fn calculate_column_width(&self, dataset: &Dataset, column: usize) -> usize {
        let mut width = dataset.max_widths[column] + COLUMN_WIDTH_MARGIN;
        if self.sort.is_some_and(|s| s.column == column) {
            width += SORT_MARKER_WIDTH;
        }
        match self.column_status[column] {
            ColumnStatus::NORMAL => std::cmp::min(width, self.max_column_width),
            ColumnStatus::EXPANDED => width,
        }
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    fn header_name(&self, dataset: &Dataset, column: usize) -> String {
        let name = &dataset.columns[column].name;
        match self.sort {
            Some(SortState { column: c, ascending }) if c == column => {
                format!("{name} {}", if ascending { "▲" } else { "▼" })
            }
            _ => name.clone(),
        }
    }

    /// Recomputes the visible window (columns that fit the width and rows of
    /// the page that fit the height).
    pub fn refresh(&mut self, dataset: &Dataset) {
        let ncolumns = dataset.ncolumns();
        self.offset_column = std::cmp::min(self.offset_column, ncolumns.saturating_sub(1));

        let mut widths = Vec::new();
        let mut visible_width = 0;
        self.visible_columns.clear();
        self.last_column_partial = false;
        for cidx in self.offset_column..ncolumns {
            let width = self.calculate_column_width(dataset, cidx);
            if visible_width + width + 1 <= self.width {
                self.visible_columns.push(cidx);
                widths.push(width);
                visible_width += width + 1;
            } else {
                // Add the last partial visible column
                if visible_width < self.width {
                    self.visible_columns.push(cidx);
                    widths.push(self.width - visible_width);
                    self.last_column_partial = true;
                }
                break;
            }
        }
        self.curser_column = std::cmp::min(
            self.curser_column,
            self.visible_columns.len().saturating_sub(1),
        );

        let page = self.page_range();
        let rbegin = std::cmp::min(page.start + self.offset_row, page.end);
        let rend = std::cmp::min(rbegin + self.heigh, page.end);
        let window = &self.rows[rbegin..rend];

        self.data = self
            .visible_columns
            .iter()
            .zip(widths)
            .map(|(&cidx, width)| ColumnView {
                name: Self::get_visible_name(&self.header_name(dataset, cidx), width),
                width,
                data: window
                    .iter()
                    .map(|&ridx| dataset.value(ridx, cidx).to_string())
                    .collect(),
                numeric: dataset.columns[cidx].kind == ColumnKind::Integer,
            })
            .collect();

        let data: Vec<String> = (rbegin..rend).map(|pos| (pos + 1).to_string()).collect();
        let width = index_width(dataset.nrows());
        self.index = ColumnView {
            name: String::new(),
            width,
            data,
            numeric: true,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(nrows: usize) -> Dataset {
        let mut text = String::from("host,mau,software\n");
        for i in 0..nrows {
            let software = if i % 2 == 0 { "mastodon" } else { "Misskey" };
            text.push_str(&format!("host{i}.social,{},{software}\n", i * 10));
        }
        Dataset::from_text(text).unwrap()
    }

    fn hosts(grid: &GridView) -> Vec<String> {
        grid.columns()[0].data.clone()
    }

    #[test]
    fn paginates_by_limit() {
        let ds = dataset(250);
        let mut grid = GridView::new(&ds, RowLimit::Rows(100), 40, 200, 500);
        assert_eq!(grid.page_count(), 3);
        assert_eq!(grid.page_range(), 0..100);
        assert_eq!(grid.columns()[0].data.len(), 100);

        grid.last_page(&ds);
        assert_eq!(grid.page(), 2);
        assert_eq!(grid.page_range(), 200..250);
        assert_eq!(grid.columns()[0].data.len(), 50);

        grid.next_page(&ds);
        assert_eq!(grid.page(), 2);
        grid.prev_page(&ds);
        assert_eq!(grid.page_range(), 100..200);
        grid.first_page(&ds);
        assert_eq!(grid.page(), 0);
    }

    #[test]
    fn all_rows_is_one_page() {
        let ds = dataset(250);
        let grid = GridView::new(&ds, RowLimit::All, 40, 200, 500);
        assert_eq!(grid.page_count(), 1);
        assert_eq!(grid.page_range(), 0..250);
        assert_eq!(grid.columns()[0].data.len(), 250);
    }

    #[test]
    fn rows_start_in_dataset_order() {
        let ds = dataset(3);
        let grid = GridView::new(&ds, RowLimit::All, 40, 200, 10);
        // The dataset is already ordered by mau, largest first
        assert_eq!(
            hosts(&grid),
            vec!["host2.social", "host1.social", "host0.social"]
        );
        assert_eq!(grid.index().data, vec!["1", "2", "3"]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let ds = dataset(6);
        let mut grid = GridView::new(&ds, RowLimit::Rows(2), 40, 200, 10);
        grid.next_page(&ds);
        grid.search(&ds, "MISSKEY");
        assert_eq!(grid.nrows(), 3);
        assert_eq!(grid.page(), 0);
        assert_eq!(grid.search_term(), Some("MISSKEY"));
        assert_eq!(hosts(&grid), vec!["host5.social", "host3.social"]);

        grid.search(&ds, "  ");
        assert_eq!(grid.nrows(), 6);
        assert_eq!(grid.search_term(), None);
    }

    #[test]
    fn sort_by_column() {
        let ds = dataset(4);
        let mut grid = GridView::new(&ds, RowLimit::All, 40, 200, 10);
        grid.sort(&ds, 1, true);
        assert_eq!(grid.columns()[1].data, vec!["0", "10", "20", "30"]);
        assert_eq!(grid.columns()[1].name, "mau ▲");

        grid.sort(&ds, 2, true);
        // Upper case sorts first, equal values keep the dataset order
        assert_eq!(
            hosts(&grid),
            vec!["host3.social", "host1.social", "host2.social", "host0.social"]
        );
        // Dataset rows are untouched
        assert_eq!(ds.value(0, 0), "host3.social");
    }

    #[test]
    fn numeric_sort_is_not_lexical() {
        let ds = Dataset::from_text("host,users\na,9\nb,10\nc,100\n".to_string()).unwrap();
        let mut grid = GridView::new(&ds, RowLimit::All, 40, 200, 10);
        grid.sort(&ds, 1, false);
        assert_eq!(grid.columns()[1].data, vec!["100", "10", "9"]);
    }

    #[test]
    fn cursor_scrolls_within_page() {
        let ds = dataset(30);
        let mut grid = GridView::new(&ds, RowLimit::Rows(20), 40, 200, 5);
        grid.move_down(&ds, 7);
        assert_eq!(grid.curser(), (4, 0));
        assert_eq!(grid.index().data[0], "4");
        assert_eq!(grid.selected_row(), Some(7));

        grid.move_end(&ds);
        assert_eq!(grid.index().data.last().map(String::as_str), Some("20"));
        grid.move_down(&ds, 10);
        assert_eq!(grid.selected_row(), Some(19));

        grid.move_up(&ds, 100);
        assert_eq!(grid.curser(), (0, 0));
        assert_eq!(grid.index().data[0], "1");

        grid.next_page(&ds);
        assert_eq!(grid.selected_row(), Some(20));
        assert_eq!(grid.index().data, vec!["21", "22", "23", "24", "25"]);
    }

    #[test]
    fn columns_fit_width() {
        let ds = dataset(3);
        // host column is 12 wide + margin, mau 3 + margin, software 8 + margin
        let mut grid = GridView::new(&ds, RowLimit::All, 40, 20, 10);
        let names: Vec<&str> = grid.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["host", "mau", ""]);
        assert_eq!(grid.columns()[2].width, 1);

        grid.move_right(&ds);
        assert_eq!(grid.selected_column(), 1);
        grid.move_right(&ds);
        assert_eq!(grid.selected_column(), 2);
        grid.move_right(&ds);
        assert_eq!(grid.selected_column(), 2);
        grid.move_left(&ds);
        grid.move_left(&ds);
        grid.move_left(&ds);
        assert_eq!(grid.selected_column(), 0);
    }

    #[test]
    fn expand_column() {
        let ds = Dataset::from_text(format!("note\n{}\n", "x".repeat(80))).unwrap();
        let mut grid = GridView::new(&ds, RowLimit::All, 40, 200, 10);
        assert_eq!(grid.columns()[0].width, 40);
        grid.toggle_expand(&ds);
        assert_eq!(grid.columns()[0].width, 81);
        grid.toggle_expand(&ds);
        assert_eq!(grid.columns()[0].width, 40);
    }

    #[test]
    fn empty_search_result() {
        let ds = dataset(5);
        let mut grid = GridView::new(&ds, RowLimit::Rows(2), 40, 200, 10);
        grid.search(&ds, "nothing-matches");
        assert_eq!(grid.nrows(), 0);
        assert_eq!(grid.page_count(), 1);
        assert_eq!(grid.selected_row(), None);
        grid.move_down(&ds, 1);
        grid.move_end(&ds);
        assert!(grid.columns()[0].data.is_empty());
    }
}
