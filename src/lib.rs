pub mod commands;
pub mod core;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::commands::SharedState;
use crate::core::error::LauncherResult;
use crate::core::state::{default_data_dir, AppState};

pub use crate::core::error::{LaunchFailureKind, LauncherError};
pub use crate::core::orchestrator::{LaunchRequest, Orchestrator};

/// Start logging and load the launcher state from `data_dir` (the platform
/// default when `None`).
pub fn init(data_dir: Option<PathBuf>) -> LauncherResult<SharedState> {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    logging::init_logging(Some(&data_dir.join("logs")))?;

    let state = AppState::with_data_dir(data_dir)?;
    tracing::info!("ALauncher core ready");
    Ok(Arc::new(Mutex::new(state)))
}
