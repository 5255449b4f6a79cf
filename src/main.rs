use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

mod controller;
mod debounce;
mod domain;
mod filter;
mod inputter;
mod loader;
mod logging;
mod model;
mod recent;
mod table;
mod ui;
mod view;

use controller::Controller;
use domain::{TVConfig, TVError};
use model::{Model, Status};
use ui::TableUI;

/// Browse, search, sort and tick off tabular checklists in the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// CSV, Parquet, Arrow IPC or Excel file to open
    file: Option<PathBuf>,

    /// Quiet time after the last keystroke before a search is applied
    #[arg(long, default_value_t = 200)]
    debounce_ms: u64,

    /// Upper bound for how long the event loop blocks
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    #[arg(long, default_value_t = 32)]
    max_column_width: usize,

    /// JSON file holding the recently opened sets
    #[arg(long)]
    recents: Option<PathBuf>,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> TVConfig {
        TVConfig::default()
            .with_event_poll_time(self.poll_ms)
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_max_column_width(self.max_column_width.max(1))
            .with_recents_path(
                self.recents
                    .clone()
                    .unwrap_or_else(|| logging::data_directory().join("saved_sets.json")),
            )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Err(e) => {
            ratatui::restore();
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(cli: Cli) -> Result<(), TVError> {
    let log_file = cli.log_file.clone().unwrap_or_else(logging::default_log_file);
    logging::init(&log_file)?;
    let config = cli.config();
    info!("Starting with {config:?}");

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&config, size.width as usize, size.height as usize)?;
    if let Some(file) = &cli.file {
        // A failed load is shown in the ui, the app keeps running
        let _ = model.open(file);
    }

    let ui = TableUI::new();
    let controller = Controller::new();

    while model.status != Status::QUITTING {
        if model.take_redraw() {
            terminal.draw(|f| ui.draw(model.get_uidata(), f))?;
        }
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    ratatui::restore();
    info!("Bye");
    Ok(())
}
