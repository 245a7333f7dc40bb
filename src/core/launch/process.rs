// ─── Game Process ───
// Spawns the game, turns its output into events and keeps a registry of
// running processes keyed by launcher-assigned ids.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::error::{LaunchFailureKind, LauncherError, LauncherResult};

use super::classpath::{join_classpath, resolve_classpath};

/// Lines kept for crash reports.
pub const LOG_TAIL_LINES: usize = 50;

const CRASH_MARKERS: &[(&str, &str)] = &[
    ("---- Minecraft Crash Report ----", "game crash report"),
    ("#@!@# Game crashed!", "game crashed"),
    (
        "A fatal error has been detected by the Java Runtime Environment",
        "JVM fatal error",
    ),
    ("java.lang.OutOfMemoryError", "out of memory"),
];

/// Everything needed to start the game. `class_path` holds unresolved
/// entries relative to `working_dir`.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub jvm_args: Vec<String>,
    pub main_class: String,
    pub class_path: Vec<String>,
    pub game_args: Vec<String>,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResult {
    pub success: bool,
    pub process_id: Option<String>,
    pub pid: Option<u32>,
    pub error: Option<String>,
    pub failure_kind: Option<LaunchFailureKind>,
}

impl LaunchResult {
    pub fn started(process_id: &str, pid: Option<u32>) -> Self {
        Self {
            success: true,
            process_id: Some(process_id.to_string()),
            pid,
            error: None,
            failure_kind: None,
        }
    }

    pub fn failed(err: &LauncherError) -> Self {
        Self {
            success: false,
            process_id: None,
            pid: None,
            error: Some(err.user_message()),
            failure_kind: Some(err.launch_failure_kind()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashDetails {
    pub reason: String,
    pub log_tail: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProcessEvent {
    Log { stream: LogStream, line: String },
    /// Reading one of the output streams failed; the stream is abandoned.
    Error { stream: LogStream, message: String },
    Crash(CrashDetails),
    /// Always the last event of a process.
    Exit { code: Option<i32> },
}

/// Handle to a freshly spawned game.
#[derive(Debug)]
pub struct RunningGame {
    pub process_id: String,
    pub pid: Option<u32>,
    pub events: UnboundedReceiver<ProcessEvent>,
}

/// Crash reason when `line` looks like a crash banner.
pub fn detect_crash(line: &str) -> Option<&'static str> {
    CRASH_MARKERS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|(_, reason)| *reason)
}

/// Start the game and return immediately; output and exit arrive on
/// [`RunningGame::events`].
#[instrument(skip(command, registry), fields(main_class = %command.main_class))]
pub async fn launch(command: &LaunchCommand, registry: &ProcessRegistry) -> LauncherResult<RunningGame> {
    if !command.executable.is_file() {
        return Err(LauncherError::RuntimeMissing(format!(
            "{} does not exist",
            command.executable.display()
        )));
    }

    let class_path = resolve_classpath(&command.class_path, &command.working_dir)?;
    debug!("Classpath has {} entries", class_path.len());

    let mut cmd = Command::new(&command.executable);
    cmd.args(&command.jvm_args)
        .arg("-cp")
        .arg(join_classpath(&class_path))
        .arg(&command.main_class)
        .args(&command.game_args)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    configure_platform_spawn(&mut cmd);

    info!("Launching {} with {:?}", command.main_class, command.executable);
    debug!("Command: {:?}", cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| LauncherError::Spawn(e.to_string()))?;
    let pid = child.id();

    let (kill_tx, kill_rx) = oneshot::channel();
    let process_id = registry.register(pid, kill_tx).await;
    info!("Game started as {} (pid {:?})", process_id, pid);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let log_tail = Arc::new(Mutex::new(VecDeque::with_capacity(LOG_TAIL_LINES)));
    let crash_seen = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(read_stream(
            stdout,
            LogStream::Stdout,
            events_tx.clone(),
            log_tail.clone(),
            crash_seen.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(read_stream(
            stderr,
            LogStream::Stderr,
            events_tx.clone(),
            log_tail,
            crash_seen,
        )));
    }

    tokio::spawn(supervise(
        child,
        kill_rx,
        readers,
        registry.clone(),
        process_id.clone(),
        events_tx,
    ));

    Ok(RunningGame {
        process_id,
        pid,
        events: events_rx,
    })
}

#[cfg(target_os = "windows")]
fn configure_platform_spawn(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
fn configure_platform_spawn(_cmd: &mut Command) {}

async fn read_stream<R>(
    reader: R,
    stream: LogStream,
    events: UnboundedSender<ProcessEvent>,
    log_tail: Arc<Mutex<VecDeque<String>>>,
    crash_seen: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let tail_snapshot = {
                    let mut tail = log_tail.lock().await;
                    if tail.len() == LOG_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                    detect_crash(&line)
                        .map(|reason| (reason, tail.iter().cloned().collect::<Vec<String>>()))
                };

                let _ = events.send(ProcessEvent::Log { stream, line });

                if let Some((reason, log_tail)) = tail_snapshot {
                    if !crash_seen.swap(true, Ordering::SeqCst) {
                        warn!("Crash detected in game output: {}", reason);
                        let _ = events.send(ProcessEvent::Crash(CrashDetails {
                            reason: reason.to_string(),
                            log_tail,
                        }));
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("Reading game {:?} failed: {}", stream, err);
                let _ = events.send(ProcessEvent::Error {
                    stream,
                    message: err.to_string(),
                });
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    registry: ProcessRegistry,
    process_id: String,
    events: UnboundedSender<ProcessEvent>,
) {
    // A dropped kill sender disables the second branch, it never kills.
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            info!("Killing {}", process_id);
            if let Err(err) = child.kill().await {
                warn!("Failed to kill {}: {}", process_id, err);
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!("Waiting for {} failed: {}", process_id, err);
            None
        }
    };

    for reader in readers {
        let _ = reader.await;
    }

    info!("{} exited with code {:?}", process_id, code);
    registry.mark_exited(&process_id, code).await;
    let _ = events.send(ProcessEvent::Exit { code });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub process_id: String,
    pub running: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
}

struct ProcessEntry {
    status: ProcessStatus,
    kill: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: HashMap<String, ProcessEntry>,
}

/// Shared table of launched games.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exited games stay queryable until the next one registers.
    async fn register(&self, pid: Option<u32>, kill: oneshot::Sender<()>) -> String {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.status.running);
        let dropped = before - inner.entries.len();
        if dropped > 0 {
            debug!("Forgot {} finished game process(es)", dropped);
        }
        inner.next_id += 1;
        let process_id = format!("game_process_{}", inner.next_id);
        inner.entries.insert(
            process_id.clone(),
            ProcessEntry {
                status: ProcessStatus {
                    process_id: process_id.clone(),
                    running: true,
                    pid,
                    exit_code: None,
                    started_at: Utc::now(),
                },
                kill: Some(kill),
            },
        );
        process_id
    }

    async fn mark_exited(&self, process_id: &str, code: Option<i32>) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(process_id) {
            entry.status.running = false;
            entry.status.exit_code = code;
            entry.kill = None;
        }
    }

    pub async fn status(&self, process_id: &str) -> LauncherResult<ProcessStatus> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(process_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| LauncherError::ProcessNotFound(process_id.to_string()))
    }

    /// Ask the supervisor to kill the process. Killing a process that has
    /// already exited is a no-op.
    pub async fn kill(&self, process_id: &str) -> LauncherResult<()> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .entries
            .get_mut(process_id)
            .ok_or_else(|| LauncherError::ProcessNotFound(process_id.to_string()))?;
        if let Some(kill) = entry.kill.take() {
            if kill.send(()).is_err() {
                debug!("{} already finished", process_id);
            }
        }
        Ok(())
    }

    pub async fn running(&self) -> Vec<ProcessStatus> {
        let inner = self.inner.lock().await;
        let mut running: Vec<ProcessStatus> = inner
            .entries
            .values()
            .filter(|entry| entry.status.running)
            .map(|entry| entry.status.clone())
            .collect();
        running.sort_by_key(|status| status.started_at);
        running
    }
}
