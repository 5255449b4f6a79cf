use std::path::PathBuf;
use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

pub const HELP_TEXT: &str = "\
Navigation
  up/down, j/k        move row
  left/right, h/l     move column
  PgUp/PgDown         move page
  g / G               first / last row

Search & sort
  /                   search all columns
  s / S               sort column ascending / descending
  c                   clear sort

Editing
  space               toggle boolean cell
  y                   copy cell

Files
  o                   open file
  w                   save copy as
  W                   save visible rows as
  r                   recent files

  ?                   help
  q                   quit";

#[derive(Debug, Error)]
pub enum TVError {
    #[error("malformed data: row {row} has {found} values, expected {expected}")]
    MalformedData {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("failed to load {}: {cause}", path.display())]
    Load { path: PathBuf, cause: String },
    #[error("failed to save {}: {cause}", path.display())]
    Save { path: PathBuf, cause: String },
    #[error("cell {row}:{column} does not hold a boolean")]
    NotABoolean { row: usize, column: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TVError {
    pub fn load(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        TVError::Load {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn save(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        TVError::Save {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct TVConfig {
    pub event_poll_time: u64,
    pub debounce: Duration,
    pub max_column_width: usize,
    pub recents_path: PathBuf,
}

impl Default for TVConfig {
    fn default() -> Self {
        TVConfig {
            event_poll_time: 100,
            debounce: Duration::from_millis(200),
            max_column_width: 32,
            recents_path: PathBuf::from("saved_sets.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    Open,
    SaveAs,
    SaveVisibleAs,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Search => "/",
            CMDMode::Open => "open: ",
            CMDMode::SaveAs => "save as: ",
            CMDMode::SaveVisibleAs => "save visible as: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
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
    SortAscending,
    SortDescending,
    ClearSort,
    Search,
    Open,
    SaveAs,
    SaveVisibleAs,
    ShowRecent,
    ToggleCell,
    CopyCell,
    Help,
    Enter,
    Exit,
    Tick,
    Resize(usize, usize),
    RawKey(KeyEvent),
}
