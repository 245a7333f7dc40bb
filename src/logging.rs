use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::error::{LauncherError, LauncherResult};

const DEFAULT_FILTER: &str = "info,alauncher_lib=debug";
const LATEST_LOG: &str = "latest.log";

/// Install the global subscriber: stderr always, plus a timestamped file in
/// `log_dir` when one is given. Returns the path of that file.
pub fn init_logging(log_dir: Option<&Path>) -> LauncherResult<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let log_file = match log_dir {
        Some(dir) => match create_log_file(dir) {
            Ok(created) => Some(created),
            Err(err) => {
                eprintln!("[ALauncher] Failed to create log file in {:?}: {}", dir, err);
                None
            }
        },
        None => None,
    };
    let log_path = log_file.as_ref().map(|(_, path)| path.clone());
    let file_layer = log_file.map(|(file, _)| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| LauncherError::Other(format!("Logging already initialized: {}", e)))?;

    install_panic_hook();
    info!(
        "ALauncher {} starting on {} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if let Some(path) = &log_path {
        info!("Logging to {:?}", path);
    }
    Ok(log_path)
}

/// `<log_dir>/alauncher_<timestamp>.log`, recorded in `latest.log`.
fn create_log_file(log_dir: &Path) -> LauncherResult<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir).map_err(|source| LauncherError::Io {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = log_dir.join(format!("alauncher_{}.log", timestamp));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LauncherError::Io {
            path: path.clone(),
            source,
        })?;

    let latest = log_dir.join(LATEST_LOG);
    std::fs::write(&latest, path.to_string_lossy().as_bytes())
        .map_err(|source| LauncherError::Io { path: latest, source })?;

    Ok((file, path))
}

/// Log file of the most recent launcher run, if any.
pub fn latest_log_path(log_dir: &Path) -> Option<PathBuf> {
    let raw = std::fs::read_to_string(log_dir.join(LATEST_LOG)).ok()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        match panic_info.location() {
            Some(location) => error!(
                "PANIC: {} at {}:{}:{}",
                message,
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC: {}", message),
        }
        default_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_log_points_at_the_new_file() {
        let dir = std::env::temp_dir().join(format!("logging-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(latest_log_path(&dir), None);
        let (_file, path) = create_log_file(&dir).unwrap();
        assert!(path.is_file());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("alauncher_") && name.ends_with(".log"));
        assert_eq!(latest_log_path(&dir), Some(path));
        let _ = std::fs::remove_dir_all(dir);
    }
}
