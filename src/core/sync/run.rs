use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Default)]
struct DirectoryRuns {
    lock: Arc<tokio::sync::Mutex<()>>,
    generation: AtomicU64,
}

/// Serializes synchronization runs per client directory.
///
/// Starting a run bumps the directory's generation, so an older run still in
/// flight sees its ticket go stale and stops at its next stage boundary.
#[derive(Default)]
pub struct RunRegistry {
    directories: Mutex<HashMap<String, Arc<DirectoryRuns>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the newest generation for `directory`. Call
    /// [`RunTicket::lock`] before touching the directory.
    pub fn begin(&self, directory: &str) -> RunTicket {
        let runs = {
            let mut directories = self
                .directories
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            directories
                .entry(directory.to_string())
                .or_default()
                .clone()
        };
        let generation = runs.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Run {} started for {}", generation, directory);
        RunTicket {
            directory: directory.to_string(),
            generation,
            runs,
        }
    }
}

#[derive(Clone)]
pub struct RunTicket {
    directory: String,
    generation: u64,
    runs: Arc<DirectoryRuns>,
}

impl RunTicket {
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.runs.generation.load(Ordering::SeqCst) == self.generation
    }

    pub fn ensure_current(&self) -> LauncherResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(LauncherError::Superseded(self.directory.clone()))
        }
    }

    /// Wait for any older run on the same directory to finish.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        self.runs.lock.clone().lock_owned().await
    }
}
