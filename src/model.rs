use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};

use crate::dataset::Dataset;
use crate::domain::{CMDMode, HELP_TEXT, Message, RowLimit, ViewerConfig, ViewerError};
use crate::grid::{ColumnView, GridView, SortState, index_width};
use crate::inputter::{InputResult, Inputter};
use crate::loader::{LoadResult, Loader, Source};
use crate::parser::to_csv;
use crate::ui::{
    CMDLINE_HEIGH, FOOTER_HEIGHT, HEADER_HEIGHT, SCROLLBAR_WIDTH, TABLE_HEADER_HEIGHT,
};

pub const NO_LOCATION_MESSAGE: &str =
    "Provide a csv location (statview view data/file.csv) or press : to open one.";

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

pub struct UIData {
    pub title: String,
    pub download: Option<String>,
    pub table: Vec<ColumnView>,
    pub index: ColumnView,
    pub has_table: bool,
    pub nrows: usize,       // Rows after the search filter
    pub total_rows: usize,  // Rows in the dataset
    pub first_row: usize,   // 1-based position of the first row of the page
    pub last_row: usize,
    pub page: usize,
    pub page_count: usize,
    pub row_limit: RowLimit,
    pub search: Option<String>,
    pub order: Option<String>, // Column the rows are ordered by, with direction marker
    pub selected_row: usize,
    pub selected_column: usize,
    pub show_popup: bool,
    pub popup_message: String,
    pub layout: UILayout,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub status_is_error: bool,
    pub last_status_message_update: Instant,
    pub last_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            title: String::new(),
            download: None,
            table: Vec::new(),
            index: ColumnView::default(),
            has_table: false,
            nrows: 0,
            total_rows: 0,
            first_row: 0,
            last_row: 0,
            page: 0,
            page_count: 0,
            row_limit: RowLimit::default(),
            search: None,
            order: None,
            selected_row: 0,
            selected_column: 0,
            show_popup: false,
            popup_message: String::new(),
            layout: UILayout::default(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
            status_is_error: false,
            last_status_message_update: Instant::now(),
            last_update: Instant::now(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub index_width: usize,
}

impl UILayout {
    pub fn from_values(index_width: usize, ui_width: usize, ui_height: usize) -> Self {
        let table_width = ui_width
            .saturating_sub(SCROLLBAR_WIDTH)
            .saturating_sub(index_width + 1);
        let table_height = ui_height
            .saturating_sub(HEADER_HEIGHT)
            .saturating_sub(TABLE_HEADER_HEIGHT)
            .saturating_sub(FOOTER_HEIGHT)
            .saturating_sub(CMDLINE_HEIGH);

        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            index_width,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

/// Application state of the viewer. All mutation happens on the ui thread
/// through [`Model::update`], fetches report back through the loader.
pub struct Model {
    config: ViewerConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    loader: Loader,
    generation: u64,
    source: Option<Source>,
    dataset: Option<Dataset>,
    grid: Option<GridView>,
    row_limit: RowLimit,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
    status_is_error: bool,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &ViewerConfig, ui_width: usize, ui_height: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            loader: Loader::new(),
            generation: 0,
            source: None,
            dataset: None,
            grid: None,
            row_limit: config.row_limit,
            uilayout: UILayout::from_values(0, ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: String::new(),
            status_is_error: false,
            last_status_message_update: Instant::now(),
        };
        model.set_status(NO_LOCATION_MESSAGE, true);
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status_message = message.into();
        self.status_is_error = is_error;
        self.last_status_message_update = Instant::now();
        if is_error {
            warn!("Status: {}", self.status_message);
        } else {
            debug!("Status: {}", self.status_message);
        }
    }

    // -------------------- Loading ---------------------- //

    /// Resolves and fetches a csv location.
    pub fn open(&mut self, location: &str) {
        match Source::resolve(location, self.config.base_url.as_ref()) {
            Ok(source) => self.start_load(source),
            Err(e) => {
                error!("Cannot open \"{location}\": {e}");
                self.set_status(e.to_string(), true);
            }
        }
        self.update_uidata();
    }

    fn start_load(&mut self, source: Source) {
        self.generation += 1;
        info!("Loading {source} (fetch #{})", self.generation);
        self.set_status(format!("Loading {source}..."), false);

        // A new fetch discards whatever is shown
        self.grid = None;
        self.dataset = None;
        self.source = Some(source.clone());
        self.status = Status::LOADING;
        self.loader.spawn(self.generation, source);
    }

    fn reload(&mut self) {
        match self.source.clone() {
            Some(source) => self.start_load(source),
            None => self.set_status(NO_LOCATION_MESSAGE, true),
        }
    }

    fn poll_loader(&mut self) -> bool {
        let mut changed = false;
        while let Some(result) = self.loader.try_recv() {
            self.apply_load(result);
            changed = true;
        }
        changed
    }

    fn apply_load(&mut self, result: LoadResult) {
        if result.generation != self.generation {
            debug!(
                "Discarding result of fetch #{} for {}, current fetch is #{}",
                result.generation, result.source, self.generation
            );
            return;
        }

        match result.outcome {
            Ok(dataset) => {
                let nrows = dataset.nrows();
                self.dataset = Some(dataset);
                self.status = Status::READY;
                self.render_grid();
                self.set_status(format!("Loaded {nrows} rows."), false);
            }
            Err(e) => {
                error!("Loading {} failed: {:?}", result.source, e);
                self.status = Status::EMPTY;
                self.set_status(e.to_string(), true);
            }
        }
        self.update_uidata();
    }

    /// Builds a fresh grid for the current dataset. The previous grid is
    /// dropped first, nothing of its view state is carried over.
    fn render_grid(&mut self) {
        self.grid = None;
        let Some(dataset) = &self.dataset else {
            return;
        };
        if dataset.nrows() == 0 {
            return;
        }

        self.uilayout = UILayout::from_values(
            index_width(dataset.nrows()),
            self.uilayout.width,
            self.uilayout.height,
        );
        self.grid = Some(GridView::new(
            dataset,
            self.row_limit,
            self.config.max_column_width,
            self.uilayout.table_width,
            self.uilayout.table_height,
        ));
        trace!("Rendered grid with row limit {}", self.row_limit);
    }

    pub fn set_row_limit(&mut self, limit: RowLimit) {
        self.row_limit = limit;
        if self.dataset.as_ref().is_some_and(|d| d.nrows() > 0) {
            self.render_grid();
            self.set_status(format!("Showing {limit} rows per page."), false);
        }
        self.update_uidata();
    }

    fn download(&mut self) {
        let (Some(dataset), Some(source)) = (&self.dataset, &self.source) else {
            self.set_status("Nothing loaded to download.", true);
            return;
        };
        let dir = self.config.download_dir.clone();
        let path: PathBuf = dir.join(source.file_name());
        let written = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, dataset.raw()));
        match written {
            Ok(_) => {
                info!("Saved {} to {}", source, path.display());
                self.set_status(format!("Saved {}", path.display()), false);
            }
            Err(e) => {
                error!("Saving {} failed: {e}", path.display());
                self.set_status(ViewerError::from(e).to_string(), true);
            }
        }
    }

    // -------------------- Update ---------------------- //

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        let index_width = self.dataset.as_ref().map(|d| index_width(d.nrows())).unwrap_or(0);
        self.uilayout = UILayout::from_values(index_width, width, height);
        if let (Some(grid), Some(dataset)) = (&mut self.grid, &self.dataset) {
            grid.resize(dataset, self.uilayout.table_width, self.uilayout.table_height);
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), ViewerError> {
        let loaded = self.poll_loader();

        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.with_grid(|g, d| g.move_down(d, 1)),
                    Message::MoveUp => self.with_grid(|g, d| g.move_up(d, 1)),
                    Message::MoveLeft => self.with_grid(|g, d| g.move_left(d)),
                    Message::MoveRight => self.with_grid(|g, d| g.move_right(d)),
                    Message::MovePageDown => {
                        let size = self.uilayout.table_height.max(1);
                        self.with_grid(|g, d| g.move_down(d, size))
                    }
                    Message::MovePageUp => {
                        let size = self.uilayout.table_height.max(1);
                        self.with_grid(|g, d| g.move_up(d, size))
                    }
                    Message::MoveBeginning => self.with_grid(|g, d| g.move_beginning(d)),
                    Message::MoveEnd => self.with_grid(|g, d| g.move_end(d)),
                    Message::NextPage => self.with_grid(|g, d| g.next_page(d)),
                    Message::PrevPage => self.with_grid(|g, d| g.prev_page(d)),
                    Message::FirstPage => self.with_grid(|g, d| g.first_page(d)),
                    Message::LastPage => self.with_grid(|g, d| g.last_page(d)),
                    Message::CycleRowLimit => self.set_row_limit(self.row_limit.next_choice()),
                    Message::SortAscending => self.sort_current_column(true),
                    Message::SortDescending => self.sort_current_column(false),
                    Message::ToggleExpandColumn => self.with_grid(|g, d| g.toggle_expand(d)),
                    Message::CopyCell => self.copy_cell(),
                    Message::CopyRow => self.copy_row(),
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::Open => self.enter_cmd_mode(CMDMode::Open),
                    Message::Reload => self.reload(),
                    Message::Download => self.download(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::RawKey(_) => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
            self.update_uidata();
        } else if loaded {
            self.update_uidata();
        }
        Ok(())
    }

    fn with_grid(&mut self, f: impl FnOnce(&mut GridView, &Dataset)) {
        if let (Some(grid), Some(dataset)) = (&mut self.grid, &self.dataset) {
            f(grid, dataset);
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                // Esc in the table clears an active search
                let searching = self.grid.as_ref().is_some_and(|g| g.search_term().is_some());
                if searching {
                    self.search("");
                }
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {:?} ...", mode);
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        self.input.clear();
        match mode {
            CMDMode::Search => {
                if let Some(term) = self.grid.as_ref().and_then(|g| g.search_term()) {
                    self.input.set(term);
                }
            }
            CMDMode::Open => {
                if let Some(source) = &self.source {
                    self.input.set(&source.to_string());
                }
            }
        }
        self.last_input = self.input.get();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.last_input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let mode = self.cmd_mode.take();
        if self.last_input.canceled {
            return;
        }
        let cmd_input = self.last_input.input.clone();
        match mode {
            Some(CMDMode::Search) => self.search(&cmd_input),
            Some(CMDMode::Open) => {
                if cmd_input.trim().is_empty() {
                    self.set_status(NO_LOCATION_MESSAGE, true);
                } else {
                    self.open(&cmd_input);
                }
            }
            None => info!("Cmd mode is none!"),
        }
    }

    fn search(&mut self, term: &str) {
        let (Some(grid), Some(dataset)) = (&mut self.grid, &self.dataset) else {
            self.set_status("No rows to search.", true);
            return;
        };
        let start_time = Instant::now();
        grid.search(dataset, term);
        let matches = grid.nrows();
        trace!(
            "Search for \"{term}\" found {matches} rows in {}ms",
            start_time.elapsed().as_millis()
        );

        if grid.search_term().is_none() {
            let message = format!("Loaded {} rows.", dataset.nrows());
            self.set_status(message, false);
        } else if matches == 0 {
            self.set_status("Found no matches!", true);
        } else {
            self.set_status(format!("Found {matches} matching rows."), false);
        }
    }

    fn sort_current_column(&mut self, ascending: bool) {
        if let (Some(grid), Some(dataset)) = (&mut self.grid, &self.dataset) {
            let column = grid.selected_column();
            grid.sort(dataset, column, ascending);
            debug!(
                "Sorted by \"{}\" {}",
                dataset.columns[column].name,
                if ascending { "ascending" } else { "descending" }
            );
        }
    }

    fn clipboard(&mut self) -> Option<&mut Clipboard> {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(c) => self.clipboard = Some(c),
                Err(e) => {
                    error!("Clipboard is not available: {:?}", e);
                    self.set_status("Clipboard is not available.", true);
                }
            }
        }
        self.clipboard.as_mut()
    }

    fn selected_cells(&self) -> Option<Vec<String>> {
        let grid = self.grid.as_ref()?;
        let dataset = self.dataset.as_ref()?;
        let row = grid.selected_row()?;
        Some(dataset.rows[row].clone())
    }

    fn copy_to_clipboard(&mut self, content: String) {
        trace!("Copy content: {}", content);
        if let Some(clipboard) = self.clipboard() {
            match clipboard.set_text(content) {
                Ok(_) => trace!("Copied content to clipboard."),
                Err(e) => error!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    fn copy_cell(&mut self) {
        let column = self.grid.as_ref().map(|g| g.selected_column()).unwrap_or(0);
        if let Some(cells) = self.selected_cells() {
            let cell = cells.get(column).cloned().unwrap_or_default();
            self.copy_to_clipboard(cell);
        }
    }

    fn copy_row(&mut self) {
        if let Some(cells) = self.selected_cells() {
            self.copy_to_clipboard(to_csv(&[cells]));
        }
    }

    // -------------------- UI data ---------------------- //

    fn update_uidata(&mut self) {
        let mut uidata = UIData::empty();
        uidata.title = self
            .source
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "statview".to_string());
        uidata.download = self.source.as_ref().map(|s| {
            format!(
                "{s}  [w] saves to {}",
                self.config.download_dir.join(s.file_name()).display()
            )
        });
        uidata.row_limit = self.row_limit;
        uidata.layout = self.uilayout.clone();
        uidata.total_rows = self.dataset.as_ref().map(|d| d.nrows()).unwrap_or(0);

        if let (Some(grid), Some(dataset)) = (&self.grid, &self.dataset) {
            uidata.order = match grid.sort_state() {
                Some(SortState { column, ascending }) => Some(format!(
                    "{} {}",
                    dataset.columns[column].name,
                    if ascending { "▲" } else { "▼" }
                )),
                None => dataset
                    .sorted_by
                    .map(|column| format!("{} ▼", dataset.columns[column].name)),
            };
            let range = grid.page_range();
            let (curser_row, curser_column) = grid.curser();
            uidata.has_table = true;
            uidata.table = grid.columns().to_vec();
            uidata.index = grid.index().clone();
            uidata.nrows = grid.nrows();
            uidata.first_row = if range.is_empty() { 0 } else { range.start + 1 };
            uidata.last_row = range.end;
            uidata.page = grid.page() + 1;
            uidata.page_count = grid.page_count();
            uidata.search = grid.search_term().map(str::to_string);
            uidata.selected_row = curser_row;
            uidata.selected_column = curser_column;
        }

        uidata.show_popup = matches!(self.modus, Modus::POPUP);
        if uidata.show_popup {
            uidata.popup_message = HELP_TEXT.to_string();
        }
        uidata.cmdinput = self.last_input.clone();
        uidata.cmd_mode = self.cmd_mode;
        uidata.active_cmdinput = self.active_cmdinput;
        uidata.status_message = self.status_message.clone();
        uidata.status_is_error = self.status_is_error;
        uidata.last_status_message_update = self.last_status_message_update;
        uidata.last_update = Instant::now();
        self.uidata = uidata;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::time::Duration;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("statview-model-{}", std::process::id()))
            .join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_csv(name: &str, content: &str) -> String {
        let path = temp_dir("csv").join(name);
        fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    fn mau_csv(nrows: usize) -> String {
        let mut text = String::from("domain,active_month\n");
        for i in 0..nrows {
            text.push_str(&format!("host{i}.social,{i}\n"));
        }
        text
    }

    fn model() -> Model {
        Model::init(&ViewerConfig::default(), 120, 40)
    }

    fn wait_for_load(model: &mut Model) {
        let result = model
            .loader
            .recv_timeout(Duration::from_secs(5))
            .expect("fetch did not finish");
        model.apply_load(result);
    }

    fn type_command(model: &mut Model, text: &str) {
        for c in text.chars() {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            model.update(Some(Message::RawKey(key))).unwrap();
        }
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        model.update(Some(Message::RawKey(enter))).unwrap();
    }

    #[test]
    fn starts_without_location() {
        let model = model();
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, NO_LOCATION_MESSAGE);
        assert!(ui.status_is_error);
        assert!(!ui.has_table);
        assert_eq!(model.status, Status::EMPTY);
        assert_eq!(model.generation, 0);
    }

    #[test]
    fn loads_and_sorts_dataset() {
        let path = write_csv("loads.csv", "name,active_month\nb,1\na,10\nc,2\n");
        let mut model = model();
        model.open(&path);
        assert_eq!(model.status, Status::LOADING);
        assert_eq!(model.get_uidata().status_message, format!("Loading {path}..."));
        assert_eq!(model.get_uidata().title, path);

        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "Loaded 3 rows.");
        assert!(!ui.status_is_error);
        assert!(ui.has_table);
        assert_eq!(ui.table[0].data, vec!["a", "c", "b"]);
        assert_eq!(ui.page_count, 1);
        assert_eq!((ui.first_row, ui.last_row), (1, 3));
        assert_eq!(ui.order.as_deref(), Some("active_month ▼"));
    }

    #[test]
    fn empty_body_reports_no_rows() {
        let path = write_csv("empty.csv", "\u{FEFF}\n \r\n");
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "No rows found in CSV.");
        assert!(ui.status_is_error);
        assert!(!ui.has_table);
    }

    #[test]
    fn header_only_renders_no_table() {
        let path = write_csv("header.csv", "domain,mau\n");
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "Loaded 0 rows.");
        assert!(!ui.has_table);
    }

    #[test]
    fn loads_over_http() {
        let base = crate::loader::test_server::serve(vec![
            (404, "missing"),
            (200, "name,active_month\nb,1\na,10\nc,2\n"),
        ]);
        let mut model = model();

        model.open(base.join("at.csv").unwrap().as_str());
        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "Failed to load CSV (404).");
        assert!(ui.status_is_error);
        assert!(!ui.has_table);

        model.open(base.join("fedi.csv").unwrap().as_str());
        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "Loaded 3 rows.");
        assert!(!ui.status_is_error);
        assert_eq!(ui.table[0].data, vec!["a", "c", "b"]);
        assert!(ui.title.ends_with("/fedi.csv"));
    }

    #[test]
    fn missing_file_is_reported() {
        let mut model = model();
        model.open("/no/such/dir/at-mau.csv");
        wait_for_load(&mut model);
        let ui = model.get_uidata();
        assert!(ui.status_is_error);
        assert!(ui.status_message.contains("File not found"));
        assert_eq!(model.status, Status::EMPTY);
        // The viewer stays usable
        model.update(Some(Message::CycleRowLimit)).unwrap();
        assert_eq!(model.get_uidata().row_limit, RowLimit::Rows(250));
    }

    #[test]
    fn stale_results_are_discarded() {
        let first = write_csv("first.csv", "host,mau\nold.social,1\n");
        let second = write_csv("second.csv", "host,mau\nnew.social,1\nnewer.social,2\n");
        let mut model = model();
        model.open(&first);
        model.open(&second);
        assert_eq!(model.generation, 2);

        let mut results = vec![
            model.loader.recv_timeout(Duration::from_secs(5)).unwrap(),
            model.loader.recv_timeout(Duration::from_secs(5)).unwrap(),
        ];
        // Apply the newer result first so the older one arrives late
        results.sort_by_key(|r| std::cmp::Reverse(r.generation));
        for result in results {
            model.apply_load(result);
        }

        let ui = model.get_uidata();
        assert_eq!(ui.status_message, "Loaded 2 rows.");
        assert_eq!(ui.table[0].data, vec!["newer.social", "new.social"]);
        assert_eq!(ui.title, second);
    }

    #[test]
    fn row_limit_change_keeps_dataset() {
        let path = write_csv("limit.csv", &mau_csv(230));
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);

        let rows_before = model.dataset.as_ref().unwrap().rows.clone();
        let columns_before = model.dataset.as_ref().unwrap().columns.clone();
        assert_eq!(model.get_uidata().page_count, 3);

        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.get_uidata().page, 2);

        model.set_row_limit(RowLimit::All);
        let ui = model.get_uidata();
        assert_eq!(ui.page_count, 1);
        assert_eq!(ui.page, 1);
        assert_eq!((ui.first_row, ui.last_row), (1, 230));
        assert_eq!(model.dataset.as_ref().unwrap().rows, rows_before);
        assert_eq!(model.dataset.as_ref().unwrap().columns, columns_before);

        model.set_row_limit(RowLimit::from_selector("oops"));
        assert_eq!(model.get_uidata().page_count, 3);
    }

    #[test]
    fn new_grid_drops_view_state() {
        let path = write_csv("teardown.csv", &mau_csv(40));
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);

        model.update(Some(Message::Search)).unwrap();
        type_command(&mut model, "host3");
        assert_eq!(model.get_uidata().search.as_deref(), Some("host3"));
        model.update(Some(Message::SortAscending)).unwrap();

        model.update(Some(Message::CycleRowLimit)).unwrap();
        let ui = model.get_uidata();
        assert_eq!(ui.search, None);
        assert_eq!(ui.nrows, 40);
        assert_eq!(ui.table[0].name, "domain");
    }

    #[test]
    fn search_through_command_line() {
        let path = write_csv("search.csv", &mau_csv(25));
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);

        model.update(Some(Message::Search)).unwrap();
        assert!(model.raw_keyevents());
        type_command(&mut model, "HOST2");
        assert!(!model.raw_keyevents());
        let ui = model.get_uidata();
        // host2, host20 .. host24
        assert_eq!(ui.nrows, 6);
        assert_eq!(ui.status_message, "Found 6 matching rows.");

        model.update(Some(Message::Exit)).unwrap();
        assert_eq!(model.get_uidata().nrows, 25);
        assert_eq!(model.get_uidata().status_message, "Loaded 25 rows.");
    }

    #[test]
    fn canceled_command_changes_nothing() {
        let mut model = model();
        model.update(Some(Message::Open)).unwrap();
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        model.update(Some(Message::RawKey(esc))).unwrap();
        assert!(!model.raw_keyevents());
        assert_eq!(model.generation, 0);
    }

    #[test]
    fn open_through_command_line() {
        let path = write_csv("open.csv", &mau_csv(3));
        let mut model = model();
        model.update(Some(Message::Open)).unwrap();
        type_command(&mut model, &path);
        assert_eq!(model.generation, 1);
        wait_for_load(&mut model);
        assert_eq!(model.get_uidata().status_message, "Loaded 3 rows.");

        model.update(Some(Message::Reload)).unwrap();
        assert_eq!(model.generation, 2);
        assert!(!model.get_uidata().has_table);
        wait_for_load(&mut model);
        assert!(model.get_uidata().has_table);
    }

    #[test]
    fn sort_and_move() {
        let path = write_csv("sort.csv", "host,mau,software\na,5,x\nb,7,z\nc,6,y\n");
        let mut model = model();
        model.open(&path);
        wait_for_load(&mut model);
        assert_eq!(model.get_uidata().table[0].data, vec!["b", "c", "a"]);

        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::MoveRight)).unwrap();
        model.update(Some(Message::SortAscending)).unwrap();
        assert_eq!(model.get_uidata().table[0].data, vec!["a", "c", "b"]);
        assert_eq!(model.get_uidata().order.as_deref(), Some("software ▲"));
        model.update(Some(Message::SortDescending)).unwrap();
        assert_eq!(model.get_uidata().table[0].data, vec!["b", "c", "a"]);

        model.update(Some(Message::MoveDown)).unwrap();
        assert_eq!(model.get_uidata().selected_row, 1);
    }

    #[test]
    fn download_writes_raw_text() {
        let raw = "\u{FEFF}host,mau\r\nx.org,1\r\n";
        let path = write_csv("raw.csv", raw);
        let dir = temp_dir("downloads");
        let config = ViewerConfig::default().with_download_dir(dir.clone());
        let mut model = Model::init(&config, 120, 40);
        model.open(&path);
        wait_for_load(&mut model);

        model.update(Some(Message::Download)).unwrap();
        let saved = fs::read_to_string(dir.join("raw.csv")).unwrap();
        assert_eq!(saved, raw);
        assert!(model.get_uidata().status_message.starts_with("Saved "));
    }

    #[test]
    fn download_without_data() {
        let mut model = model();
        model.update(Some(Message::Download)).unwrap();
        assert!(model.get_uidata().status_is_error);
    }

    #[test]
    fn help_popup() {
        let mut model = model();
        model.update(Some(Message::Help)).unwrap();
        assert!(model.get_uidata().show_popup);
        assert_eq!(model.get_uidata().popup_message, HELP_TEXT);
        model.update(Some(Message::Exit)).unwrap();
        assert!(!model.get_uidata().show_popup);
        model.update(Some(Message::Quit)).unwrap();
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn layout_reserves_chrome() {
        let layout = UILayout::from_values(3, 100, 30);
        assert_eq!(layout.table_width, 100 - SCROLLBAR_WIDTH - 4);
        assert_eq!(
            layout.table_height,
            30 - HEADER_HEIGHT - TABLE_HEADER_HEIGHT - FOOTER_HEIGHT - CMDLINE_HEIGH
        );
        let tiny = UILayout::from_values(3, 2, 2);
        assert_eq!((tiny.table_width, tiny.table_height), (0, 0));
    }
}
