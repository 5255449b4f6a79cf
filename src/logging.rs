use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::TVError;

const DEFAULT_FILTER: &str = "info";

/// Per user data directory for the log file and the recent files store.
pub fn data_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("checklist")
}

pub fn default_log_file() -> PathBuf {
    data_directory().join("checklist.log")
}

/// Routes all tracing output into `log_file`. The terminal belongs to the ui,
/// so nothing is written to stdout or stderr. `RUST_LOG` overrides the
/// default filter.
pub fn init(log_file: &Path) -> Result<(), TVError> {
    if let Some(parent) = log_file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(log_file)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(Arc::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(std::io::Error::other)?;

    tracing::info!(log_file = %log_file.display(), "Logging initialized");
    Ok(())
}
