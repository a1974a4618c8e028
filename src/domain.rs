use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

pub const DEFAULT_ROW_LIMIT: usize = 100;

// Values offered by the row limit selector, `None` stands for "all".
pub const ROW_LIMIT_CHOICES: [Option<usize>; 7] = [
    Some(25),
    Some(50),
    Some(100),
    Some(250),
    Some(500),
    Some(1000),
    None,
];

pub const HELP_TEXT: &str = "\
q          Quit
?          Show this help
Esc        Clear search / close popup
Arrows/hjk Move selection (l is taken by the row limit)
PgUp/PgDn  Scroll within the page
Home/End   First/last row of the page
n / p      Next / previous page
g / G      First / last page
l          Cycle the row limit
/          Search all cells
s / S      Sort column ascending / descending
e          Expand / shrink the current column
c / C      Copy cell / row to the clipboard
r          Reload the current csv
:          Open another csv location
w          Download the raw csv";

#[derive(Debug)]
pub enum ViewerError {
    IoError(Error),
    HttpError(reqwest::Error),
    HttpStatus(u16),
    SnapshotFormat(serde_json::Error),
    InvalidLocation(String),
    UnknownEcosystem(String),
    LoadingFailed(String),
    NoData,
    FileNotFound(PathBuf),
    PermissionDenied(PathBuf),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::IoError(e) => write!(f, "{e}"),
            ViewerError::HttpError(e) => write!(f, "{e}"),
            ViewerError::HttpStatus(code) => write!(f, "Failed to load CSV ({code})."),
            ViewerError::SnapshotFormat(e) => write!(f, "Invalid snapshot: {e}"),
            ViewerError::InvalidLocation(loc) => write!(f, "Invalid location \"{loc}\""),
            ViewerError::UnknownEcosystem(key) => write!(f, "Unknown ecosystem \"{key}\""),
            ViewerError::LoadingFailed(msg) => write!(f, "{msg}"),
            ViewerError::NoData => write!(f, "No rows found in CSV."),
            ViewerError::FileNotFound(p) => write!(f, "File not found: {}", p.display()),
            ViewerError::PermissionDenied(p) => write!(f, "Permission denied: {}", p.display()),
        }
    }
}

impl std::error::Error for ViewerError {}

impl From<Error> for ViewerError {
    fn from(err: Error) -> Self {
        ViewerError::IoError(err)
    }
}

impl From<reqwest::Error> for ViewerError {
    fn from(err: reqwest::Error) -> Self {
        ViewerError::HttpError(err)
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::SnapshotFormat(err)
    }
}

impl From<url::ParseError> for ViewerError {
    fn from(err: url::ParseError) -> Self {
        ViewerError::InvalidLocation(err.to_string())
    }
}

/// Number of rows per page. `All` disables pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimit {
    All,
    Rows(usize),
}

impl RowLimit {
    /// Reads the value of the row limit selector. Anything that is not "all"
    /// or a positive number falls back to the default page size.
    pub fn from_selector(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return RowLimit::All;
        }
        match value.parse::<usize>() {
            Ok(n) if n > 0 => RowLimit::Rows(n),
            _ => RowLimit::Rows(DEFAULT_ROW_LIMIT),
        }
    }

    pub fn page_size(&self) -> Option<usize> {
        match self {
            RowLimit::All => None,
            RowLimit::Rows(n) => Some(*n),
        }
    }

    /// Next entry of the selector, wrapping around after "all".
    pub fn next_choice(&self) -> Self {
        let current = self.page_size();
        let pos = ROW_LIMIT_CHOICES.iter().position(|c| *c == current);
        let next = match pos {
            Some(p) => ROW_LIMIT_CHOICES[(p + 1) % ROW_LIMIT_CHOICES.len()],
            None => Some(DEFAULT_ROW_LIMIT),
        };
        next.map_or(RowLimit::All, RowLimit::Rows)
    }
}

impl Default for RowLimit {
    fn default() -> Self {
        RowLimit::Rows(DEFAULT_ROW_LIMIT)
    }
}

impl fmt::Display for RowLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowLimit::All => write!(f, "all"),
            RowLimit::Rows(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct ViewerConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub row_limit: RowLimit,
    #[setters(strip_option)]
    pub base_url: Option<url::Url>,
    pub download_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            event_poll_time: 100,
            max_column_width: 40,
            row_limit: RowLimit::default(),
            base_url: None,
            download_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    Open,
}

#[derive(Debug)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    NextPage,
    PrevPage,
    FirstPage,
    LastPage,
    CycleRowLimit,
    Search,
    Open,
    Reload,
    Download,
    SortAscending,
    SortDescending,
    ToggleExpandColumn,
    CopyCell,
    CopyRow,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}
