use arboard::Clipboard;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::debounce::Debouncer;
use crate::domain::{CMDMode, HELP_TEXT, Message, TVConfig, TVError};
use crate::inputter::{InputResult, Inputter};
use crate::loader;
use crate::recent::RecentFiles;
use crate::table::Table;
use crate::ui::{CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, TABLE_HEADER_HEIGHT, TITLE_HEIGHT};
use crate::view::{SortDirection, TableView};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
    RECENT,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(index_width: usize, ui_width: usize, ui_height: usize) -> Self {
        let table_width = ui_width.saturating_sub(index_width + COLUMN_WIDTH_MARGIN);
        let table_height =
            ui_height.saturating_sub(TITLE_HEIGHT + CMDLINE_HEIGH + TABLE_HEADER_HEIGHT);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

/// Everything the renderer needs for one frame. The ui never touches the
/// table, the filter or the sort order directly.
#[derive(Debug, Clone, Default)]
pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub index: ColumnView,
    pub nrows: usize, // Number of visible rows after filtering
    pub total_rows: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub query: String,
    pub search_pending: bool,
    pub sort: Option<String>,
    pub show_popup: bool,
    pub popup_title: String,
    pub popup_message: String,
    pub show_recent: bool,
    pub recent: Vec<String>,
    pub recent_selected: usize,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub unsaved_edits: bool,
}

pub struct Model {
    config: TVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    file_path: Option<PathBuf>,
    view: TableView,
    column_widths: Vec<usize>,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize,
    offset_column: usize,
    visible_columns: Vec<usize>,
    debouncer: Debouncer,
    recent: RecentFiles,
    recent_items: Vec<PathBuf>,
    recent_cursor: usize,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
    unsaved_edits: bool,
    redraw: bool,
}

impl Model {
    pub fn init(config: &TVConfig, ui_width: usize, ui_height: usize) -> Result<Self, TVError> {
        let clipboard = Clipboard::new()
            .inspect_err(|e| info!("Clipboard not available: {e}"))
            .ok();
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            file_path: None,
            view: TableView::default(),
            column_widths: Vec::new(),
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            visible_columns: Vec::new(),
            debouncer: Debouncer::new(config.debounce),
            recent: RecentFiles::new(&config.recents_path),
            recent_items: Vec::new(),
            recent_cursor: 0,
            uilayout: UILayout::from_values(0, ui_width, ui_height),
            uidata: UIData::default(),
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Press o to open a set, r for recent sets, ? for help".to_string(),
            unsaved_edits: false,
            redraw: true,
        };
        debug!(
            "Model ready, debounce {:?}, recent files in {}",
            model.debouncer.interval(),
            model.recent.store().display()
        );
        model.update_table_data();
        Ok(model)
    }

    /// Loads `path` and shows it. A failed load keeps the current table and
    /// filter untouched.
    pub fn open(&mut self, path: &Path) -> Result<(), TVError> {
        info!("Opening {}", path.display());
        let table = match loader::load_table(path) {
            Ok(table) => table,
            Err(e) => {
                self.report_error("Load Error", &e);
                return Err(e);
            }
        };
        let (rows, columns) = (table.row_count(), table.column_count());
        self.install_table(table, Some(path.to_path_buf()));

        if let Err(e) = self.recent.push(path) {
            error!("Could not update recent files: {e}");
        }
        let name = self.uidata.name.clone();
        self.set_status_message(format!("Loaded {name}: {rows} rows x {columns} cols"));
        Ok(())
    }

    pub fn install_table(&mut self, table: Table, path: Option<PathBuf>) {
        self.column_widths = Self::calculate_column_widths(&table, self.config.max_column_width);
        let old = self.view.replace_table(table);
        debug!("Replaced table {} ({} rows)", old.id(), old.row_count());

        self.file_path = path;
        self.curser_row = 0;
        self.curser_column = 0;
        self.offset_row = 0;
        self.offset_column = 0;
        self.unsaved_edits = false;
        self.status = Status::READY;
        self.modus = Modus::TABLE;
        self.update_table_data();
    }

    /// Writes the full table, or only the visible rows in their current order.
    pub fn save_as(&mut self, path: &Path, visible_only: bool) -> Result<(), TVError> {
        if self.status != Status::READY {
            self.set_status_message("Open a set before saving.");
            return Ok(());
        }
        let rows = visible_only.then(|| self.view.visible_rows().to_vec());
        match loader::write_file(self.view.table(), rows.as_deref(), path) {
            Ok(()) => {
                if !visible_only {
                    self.unsaved_edits = false;
                }
                self.set_status_message(format!("Saved copy to {}", path.display()));
                self.update_table_data();
                Ok(())
            }
            Err(e) => {
                self.report_error("Save Error", &e);
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn view(&self) -> &TableView {
        &self.view
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    /// Returns whether anything changed since the last call.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// How long the event loop may block before the next tick is due.
    pub fn next_poll_timeout(&self, now: Instant) -> Duration {
        let poll = Duration::from_millis(self.config.event_poll_time);
        match self.debouncer.time_until_due(now) {
            Some(due) => poll.min(due),
            None => poll,
        }
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), TVError> {
        self.tick(Instant::now());

        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection_down(1),
                    Message::MoveUp => self.move_table_selection_up(1),
                    Message::MoveLeft => self.move_table_selection_left(),
                    Message::MoveRight => self.move_table_selection_right(),
                    Message::MovePageUp => self.move_table_selection_up(self.uilayout.table_height),
                    Message::MovePageDown => {
                        self.move_table_selection_down(self.uilayout.table_height)
                    }
                    Message::MoveBeginning => self.move_table_selection_beginning(),
                    Message::MoveEnd => self.move_table_selection_end(),
                    Message::SortAscending => self.sort_current_column(SortDirection::Ascending),
                    Message::SortDescending => self.sort_current_column(SortDirection::Descending),
                    Message::ClearSort => self.clear_sort(),
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::Open => self.enter_cmd_mode(CMDMode::Open),
                    Message::SaveAs => self.enter_cmd_mode(CMDMode::SaveAs),
                    Message::SaveVisibleAs => self.enter_cmd_mode(CMDMode::SaveVisibleAs),
                    Message::ShowRecent => self.show_recent(),
                    Message::ToggleCell => self.toggle_cell(),
                    Message::CopyCell => self.copy_table_cell(),
                    Message::Help => self.show_help(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::RECENT => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_recent_selection(1),
                    Message::MoveUp => self.move_recent_selection(-1),
                    Message::Enter => self.open_selected_recent(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Enter => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key, Instant::now()),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    /// Commits a staged query once the debounce interval has passed.
    pub fn tick(&mut self, now: Instant) {
        if let Some(text) = self.debouncer.poll(now) {
            self.commit_query(&text);
            self.uidata.search_pending = false;
            self.redraw = true;
        }
    }

    fn commit_query(&mut self, text: &str) {
        if !self.view.set_query(text) {
            return;
        }
        self.curser_row = 0;
        self.offset_row = 0;
        self.update_table_data();
        let nrows = self.uidata.nrows;
        if self.view.query().is_empty() {
            self.set_status_message(format!("{nrows} rows"));
        } else {
            self.set_status_message(format!("{nrows} rows match \"{}\"", self.view.query()));
        }
    }

    fn report_error(&mut self, title: &str, err: &TVError) {
        error!("{title}: {err}");
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.active_cmdinput = false;
        self.uidata.active_cmdinput = false;
        self.uidata.popup_title = title.to_string();
        self.uidata.popup_message = err.to_string();
        self.uidata.show_popup = true;
        self.redraw = true;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.redraw = true;
    }

    fn calculate_column_widths(table: &Table, max_column_width: usize) -> Vec<usize> {
        table
            .columns()
            .iter()
            .enumerate()
            .map(|(cidx, name)| {
                let header = name.chars().count();
                let widest = (0..table.row_count())
                    .filter_map(|ridx| table.display(ridx, cidx).ok())
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0);
                // Room for the sort marker
                std::cmp::min(std::cmp::max(header + 2, widest), max_column_width).max(1)
            })
            .collect()
    }

    fn update_table_data(&mut self) {
        let name = self
            .file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let nrows = self.view.visible_row_count();
        let ncols = self.view.table().column_count();
        self.curser_column = std::cmp::min(self.curser_column, ncols.saturating_sub(1));
        self.offset_column = std::cmp::min(self.offset_column, ncols.saturating_sub(1));
        self.offset_row = std::cmp::min(self.offset_row, nrows.saturating_sub(1));
        self.curser_row = std::cmp::min(
            self.curser_row,
            nrows.saturating_sub(self.offset_row + 1),
        );

        let rbegin = self.offset_row;
        let rend = std::cmp::min(rbegin + self.uilayout.table_height, nrows);

        // Index shows the underlying row number of each visible row
        let index_data: Vec<String> = (rbegin..rend)
            .filter_map(|vr| self.view.visible_row_to_underlying(vr).ok())
            .map(|ridx| (ridx + 1).to_string())
            .collect();
        let index_width = std::cmp::max(nrows.max(1).to_string().len(), 3);
        self.uilayout = UILayout::from_values(index_width, self.uilayout.width, self.uilayout.height);

        if self.curser_column < self.offset_column {
            self.offset_column = self.curser_column;
        }
        self.visible_columns = self.fit_columns(self.offset_column, ncols);
        while ncols > 0
            && !self.visible_columns.contains(&self.curser_column)
            && self.offset_column < self.curser_column
        {
            self.offset_column += 1;
            self.visible_columns = self.fit_columns(self.offset_column, ncols);
        }

        let mut table = Vec::with_capacity(self.visible_columns.len());
        for &cidx in self.visible_columns.iter() {
            let data = (rbegin..rend)
                .map(|vr| {
                    self.view
                        .cell_text(vr, cidx)
                        .map(|s| s.replace("\r\n", " ↵ ").replace('\n', " ↵ "))
                        .unwrap_or_default()
                })
                .collect();
            table.push(ColumnView {
                name: self.view.header_text(cidx).unwrap_or_default(),
                width: self.column_widths.get(cidx).copied().unwrap_or(1),
                data,
            });
        }

        let selected_column = self
            .visible_columns
            .iter()
            .position(|&c| c == self.curser_column)
            .unwrap_or(0);

        self.uidata = UIData {
            name,
            table,
            index: ColumnView {
                name: String::new(),
                width: index_width,
                data: index_data,
            },
            nrows,
            total_rows: self.view.table().row_count(),
            selected_row: self.curser_row,
            selected_column,
            abs_selected_row: self.offset_row + self.curser_row,
            query: self.view.query().to_string(),
            search_pending: self.debouncer.is_pending(),
            sort: self.view.sort().and_then(|s| {
                self.view
                    .table()
                    .column_name(s.column)
                    .ok()
                    .map(|n| format!("{n} {}", s.direction.symbol()))
            }),
            show_popup: self.modus == Modus::POPUP,
            popup_title: self.uidata.popup_title.clone(),
            popup_message: self.uidata.popup_message.clone(),
            show_recent: self.modus == Modus::RECENT,
            recent: self
                .recent_items
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            recent_selected: self.recent_cursor,
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
            unsaved_edits: self.unsaved_edits,
        };
        self.redraw = true;
    }

    /// Columns that fit into the table width starting at `offset`. The first
    /// one is always included.
    fn fit_columns(&self, offset: usize, ncols: usize) -> Vec<usize> {
        let mut columns = Vec::new();
        let mut visible_width = 0;
        for cidx in offset..ncols {
            let width = self.column_widths.get(cidx).copied().unwrap_or(1);
            if visible_width + width + COLUMN_WIDTH_MARGIN > self.uilayout.table_width
                && !columns.is_empty()
            {
                break;
            }
            columns.push(cidx);
            visible_width += width + COLUMN_WIDTH_MARGIN;
        }
        columns
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(0, width, height);
        self.update_table_data();
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = match self.previous_modus {
                    Modus::POPUP | Modus::CMDINPUT => Modus::TABLE,
                    m => m,
                };
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
            }
            Modus::RECENT => {
                self.previous_modus = Modus::RECENT;
                self.modus = Modus::TABLE;
            }
            Modus::TABLE | Modus::CMDINPUT => {}
        }
        self.update_table_data();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_title = "Help".to_string();
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.update_table_data();
    }

    fn show_recent(&mut self) {
        self.recent_items = self.recent.load();
        self.recent_cursor = 0;
        if self.recent_items.is_empty() {
            self.set_status_message("No saved sets yet.");
            return;
        }
        self.previous_modus = self.modus;
        self.modus = Modus::RECENT;
        self.update_table_data();
    }

    fn move_recent_selection(&mut self, step: isize) {
        let last = self.recent_items.len().saturating_sub(1);
        self.recent_cursor = self.recent_cursor.saturating_add_signed(step).min(last);
        self.update_table_data();
    }

    fn open_selected_recent(&mut self) {
        let Some(path) = self.recent_items.get(self.recent_cursor).cloned() else {
            return;
        };
        self.modus = Modus::TABLE;
        if self.open(&path).is_err() {
            self.previous_modus = Modus::TABLE;
        }
        self.update_table_data();
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        self.input.clear();
        match mode {
            CMDMode::Search => self.input.set(self.view.query()),
            CMDMode::SaveAs | CMDMode::SaveVisibleAs => {
                if let Some(path) = &self.file_path {
                    self.input.set(&path.display().to_string());
                }
            }
            CMDMode::Open => {}
        }
        self.last_input = self.input.get();
        self.update_table_data();
    }

    fn raw_input(&mut self, key: ratatui::crossterm::event::KeyEvent, now: Instant) {
        if !self.active_cmdinput {
            return;
        }
        let previous = std::mem::take(&mut self.last_input.input);
        self.last_input = self.input.read(key);

        if self.cmd_mode == Some(CMDMode::Search) && self.last_input.changed_from(&previous) {
            self.debouncer.on_query_changed(&self.last_input.input, now);
        }
        if self.last_input.finished {
            self.handle_cmd_input();
        }
        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.cmd_mode = self.cmd_mode;
        self.uidata.search_pending = self.debouncer.is_pending();
        self.redraw = true;
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let cmd_input = self.last_input.input.clone();
        let canceled = self.last_input.canceled;
        match self.cmd_mode.take() {
            // Typed text is already staged in the debouncer
            Some(CMDMode::Search) => {}
            Some(_) if canceled || cmd_input.trim().is_empty() => {}
            Some(CMDMode::Open) => {
                let path = expand_path(&cmd_input);
                // Failures are already shown in a popup
                let _ = self.open(&path);
            }
            Some(CMDMode::SaveAs) => {
                let _ = self.save_as(&expand_path(&cmd_input), false);
            }
            Some(CMDMode::SaveVisibleAs) => {
                let _ = self.save_as(&expand_path(&cmd_input), true);
            }
            None => info!("Cmd mode is none!"),
        }
        self.update_table_data();
    }

    /// Sorting the same column twice in the same direction flips it.
    fn sort_current_column(&mut self, direction: SortDirection) {
        let column = self.curser_column;
        let direction = match self.view.sort() {
            Some(current) if current.column == column && current.direction == direction => {
                direction.toggled()
            }
            _ => direction,
        };
        match self.view.set_sort(column, direction) {
            Ok(()) => {
                let name = self.view.table().column_name(column).unwrap_or("").to_string();
                self.set_status_message(format!("Sorted by \"{name}\" {direction:?}"));
            }
            Err(e) => debug!("Cannot sort: {e}"),
        }
        self.update_table_data();
    }

    fn clear_sort(&mut self) {
        self.view.clear_sort();
        self.set_status_message("Sort cleared");
        self.update_table_data();
    }

    fn toggle_cell(&mut self) {
        let visible_row = self.offset_row + self.curser_row;
        match self.view.toggle_bool(visible_row, self.curser_column) {
            Ok(change) => {
                self.view.apply_change(change);
                self.unsaved_edits = true;
                let value = self
                    .view
                    .table()
                    .display(change.row, change.column)
                    .unwrap_or_default();
                self.set_status_message(format!("Row {} set to {value}", change.row + 1));
            }
            Err(TVError::NotABoolean { .. }) => {
                self.set_status_message("Only boolean cells can be toggled")
            }
            Err(e) => debug!("Cannot toggle: {e}"),
        }
        self.update_table_data();
    }

    fn copy_table_cell(&mut self) {
        let visible_row = self.offset_row + self.curser_row;
        let Ok(cell) = self.view.cell_text(visible_row, self.curser_column) else {
            return;
        };
        trace!("Cell content: {}", cell);
        match self.clipboard.as_mut().map(|c| c.set_text(cell)) {
            Some(Ok(_)) => self.set_status_message("Copied cell to clipboard"),
            Some(Err(e)) => error!("Error copying to clipboard: {:?}", e),
            None => self.set_status_message("Clipboard not available"),
        }
    }

    fn move_table_selection_beginning(&mut self) {
        self.curser_row = 0;
        self.offset_row = 0;
        self.update_table_data();
    }

    fn move_table_selection_end(&mut self) {
        let nrows = self.view.visible_row_count();
        let height = self.uilayout.table_height.max(1);
        if nrows < height {
            self.offset_row = 0;
            self.curser_row = nrows.saturating_sub(1);
        } else {
            self.offset_row = nrows - height;
            self.curser_row = height - 1;
        }
        self.update_table_data();
    }

    fn move_table_selection_up(&mut self, size: usize) {
        let size = size.max(1);
        if self.curser_row > 0 {
            self.curser_row = self.curser_row.saturating_sub(size);
        } else {
            self.offset_row = self.offset_row.saturating_sub(size);
        }
        self.update_table_data();
    }

    fn move_table_selection_down(&mut self, size: usize) {
        let size = size.max(1);
        let nrows = self.view.visible_row_count();
        let height = self.uilayout.table_height.max(1);
        let last = nrows.saturating_sub(1);
        let target = std::cmp::min(self.offset_row + self.curser_row + size, last);
        if target < self.offset_row + height {
            self.curser_row = target - self.offset_row;
        } else {
            self.offset_row = target + 1 - height;
            self.curser_row = height - 1;
        }
        self.update_table_data();
    }

    fn move_table_selection_left(&mut self) {
        if self.curser_column > 0 {
            self.curser_column -= 1;
        }
        self.update_table_data();
    }

    fn move_table_selection_right(&mut self) {
        let ncols = self.view.table().column_count();
        if self.curser_column + 1 < ncols {
            self.curser_column += 1;
        }
        self.update_table_data();
    }
}

fn expand_path(input: &str) -> PathBuf {
    match shellexpand::full(input.trim()) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            debug!("Could not expand {input}: {e}");
            PathBuf::from(input.trim())
        }
    }
}
