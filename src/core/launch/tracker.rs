// ─── Session Tracker ───
// Correlates a running game with a statistics session and forwards crashes
// to the crash collaborator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::core::telemetry::{
    best_effort, ConnectionIssue, CrashReport, CrashReporter, LaunchStats, SessionEnd,
    StatisticsReporter,
};

use super::process::{CrashDetails, LogStream, ProcessEvent, RunningGame};

const CONNECTION_MARKERS: &[&str] = &[
    "Couldn't connect to server",
    "Connection refused",
    "Failed to connect to the server",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSession {
    pub session_id: String,
    pub profile_id: String,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub crashed: Option<bool>,
}

impl LaunchSession {
    pub fn new(session_id: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            profile_id: profile_id.into(),
            started_at: Utc::now(),
            exit_code: None,
            crashed: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.crashed.is_some()
    }

    /// Record the exit. Returns the record to report the first time only.
    pub fn close(&mut self, exit_code: Option<i32>) -> Option<SessionEnd> {
        if self.is_closed() {
            return None;
        }
        let crashed = matches!(exit_code, Some(code) if code != 0);
        self.exit_code = exit_code;
        self.crashed = Some(crashed);
        Some(SessionEnd {
            session_id: self.session_id.clone(),
            exit_code,
            crashed,
        })
    }
}

/// What the tracker knows about the game it watches.
#[derive(Debug, Clone, Default)]
pub struct TrackContext {
    pub profile_id: String,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedExit {
    pub exit_code: Option<i32>,
    pub crashed: bool,
    pub session: Option<LaunchSession>,
}

#[derive(Clone)]
pub struct SessionTracker {
    statistics: Arc<dyn StatisticsReporter>,
    crashes: Arc<dyn CrashReporter>,
}

impl SessionTracker {
    pub fn new(statistics: Arc<dyn StatisticsReporter>, crashes: Arc<dyn CrashReporter>) -> Self {
        Self {
            statistics,
            crashes,
        }
    }

    /// A rejected or failed statistics call leaves the game without a session.
    pub async fn open_session(&self, stats: &LaunchStats) -> Option<LaunchSession> {
        best_effort("Statistics launch report", self.statistics.launch_started(stats))
            .await
            .map(|session_id| {
                info!("Opened session {} for profile {}", session_id, stats.profile_id);
                LaunchSession::new(session_id, &stats.profile_id)
            })
    }

    /// Consume the game's events until the channel closes. Every event is
    /// passed on to `forward` when given.
    pub async fn track(
        &self,
        mut game: RunningGame,
        mut session: Option<LaunchSession>,
        context: TrackContext,
        forward: Option<UnboundedSender<ProcessEvent>>,
    ) -> TrackedExit {
        let mut exit: Option<Option<i32>> = None;
        let mut crash_reported = false;
        let mut connection_reported = false;

        while let Some(event) = game.events.recv().await {
            if let Some(forward) = &forward {
                let _ = forward.send(event.clone());
            }

            match event {
                ProcessEvent::Log { stream, line } => {
                    match stream {
                        LogStream::Stdout => debug!("[{}][stdout] {}", game.process_id, line),
                        LogStream::Stderr => debug!("[{}][stderr] {}", game.process_id, line),
                    }
                    if !connection_reported && is_connection_failure(&line) {
                        if let Some(address) = &context.server_address {
                            connection_reported = true;
                            self.spawn_connection_issue(ConnectionIssue {
                                profile_id: context.profile_id.clone(),
                                server_address: address.clone(),
                                server_port: context.server_port,
                                message: line.trim().to_string(),
                            });
                        }
                    }
                }
                ProcessEvent::Error { stream, message } => {
                    warn!("[{}] {:?} stream failed: {}", game.process_id, stream, message);
                }
                ProcessEvent::Crash(details) => {
                    if !crash_reported {
                        crash_reported = true;
                        self.spawn_crash_report(crash_report(&context, session.as_ref(), None, details));
                    }
                }
                ProcessEvent::Exit { code } => {
                    if exit.is_some() {
                        debug!("Ignoring repeated exit event for {}", game.process_id);
                        continue;
                    }
                    exit = Some(code);
                    info!("{} (pid {:?}) exited with {:?}", game.process_id, game.pid, code);

                    let failed = matches!(code, Some(c) if c != 0);
                    if failed && !crash_reported {
                        crash_reported = true;
                        let details = CrashDetails {
                            reason: format!("exited with code {}", code.unwrap_or_default()),
                            log_tail: Vec::new(),
                        };
                        self.spawn_crash_report(crash_report(&context, session.as_ref(), code, details));
                    }

                    match session.as_mut().and_then(|s| s.close(code)) {
                        Some(end) => {
                            best_effort("Statistics exit report", self.statistics.launch_ended(&end))
                                .await;
                        }
                        None => debug!("No statistics session to close for {}", game.process_id),
                    }
                }
            }
        }

        let exit_code = exit.flatten();
        TrackedExit {
            exit_code,
            crashed: matches!(exit_code, Some(code) if code != 0),
            session,
        }
    }

    fn spawn_crash_report(&self, report: CrashReport) {
        let crashes = self.crashes.clone();
        tokio::spawn(async move {
            best_effort("Crash report", crashes.report_crash(&report)).await;
        });
    }

    fn spawn_connection_issue(&self, issue: ConnectionIssue) {
        let crashes = self.crashes.clone();
        tokio::spawn(async move {
            best_effort("Connection issue report", crashes.report_connection_issue(&issue)).await;
        });
    }
}

fn is_connection_failure(line: &str) -> bool {
    CONNECTION_MARKERS.iter().any(|marker| line.contains(marker))
}

fn crash_report(
    context: &TrackContext,
    session: Option<&LaunchSession>,
    exit_code: Option<i32>,
    details: CrashDetails,
) -> CrashReport {
    CrashReport {
        session_id: session.map(|s| s.session_id.clone()),
        profile_id: context.profile_id.clone(),
        exit_code,
        reason: details.reason,
        log_tail: details.log_tail,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::core::launch::Resolution;
    use crate::core::telemetry::reporter::testing::RecordingReporter;

    fn fake_game(events: Vec<ProcessEvent>) -> RunningGame {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            tx.send(event).unwrap();
        }
        RunningGame {
            process_id: "game_process_1".into(),
            pid: Some(4242),
            events: rx,
        }
    }

    fn context() -> TrackContext {
        TrackContext {
            profile_id: "7".into(),
            server_address: Some("play.example.net".into()),
            server_port: Some(25565),
        }
    }

    fn stats() -> LaunchStats {
        LaunchStats {
            profile_id: "7".into(),
            profile_version: "1.12.2".into(),
            server_address: None,
            server_port: None,
            java_version: Some("8".into()),
            ram: 2048,
            resolution: Resolution::default(),
            full_screen: false,
            auto_enter: false,
            os: "test".into(),
        }
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn nonzero_exit_closes_session_as_crashed_once() {
        let reporter = Arc::new(RecordingReporter::default());
        let tracker = SessionTracker::new(reporter.clone(), reporter.clone());
        let session = tracker.open_session(&stats()).await;
        assert!(session.is_some());

        let game = fake_game(vec![
            ProcessEvent::Log {
                stream: LogStream::Stdout,
                line: "Loading".into(),
            },
            ProcessEvent::Exit { code: Some(1) },
            ProcessEvent::Exit { code: Some(0) },
        ]);
        let tracked = tracker.track(game, session, context(), None).await;

        assert_eq!(tracked.exit_code, Some(1));
        assert!(tracked.crashed);
        let session = tracked.session.unwrap();
        assert_eq!(session.exit_code, Some(1));
        assert_eq!(session.crashed, Some(true));
        assert_eq!(
            reporter.ended(),
            vec![SessionEnd {
                session_id: "session-1".into(),
                exit_code: Some(1),
                crashed: true,
            }]
        );

        wait_for(|| !reporter.crashes().is_empty()).await;
        let crashes = reporter.crashes();
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes[0].session_id.as_deref(), Some("session-1"));
        assert_eq!(crashes[0].exit_code, Some(1));
    }

    #[tokio::test]
    async fn exit_without_session_still_completes() {
        let reporter = Arc::new(RecordingReporter {
            fail_start: true,
            ..Default::default()
        });
        let tracker = SessionTracker::new(reporter.clone(), reporter.clone());
        let session = tracker.open_session(&stats()).await;
        assert!(session.is_none());

        let (tx, mut forwarded) = mpsc::unbounded_channel();
        let game = fake_game(vec![ProcessEvent::Exit { code: Some(0) }]);
        let tracked = tracker.track(game, session, context(), Some(tx)).await;

        assert_eq!(tracked.exit_code, Some(0));
        assert!(!tracked.crashed);
        assert!(tracked.session.is_none());
        assert!(reporter.ended().is_empty());
        assert_eq!(forwarded.recv().await, Some(ProcessEvent::Exit { code: Some(0) }));
    }

    #[tokio::test]
    async fn crash_banner_is_reported_with_log_tail() {
        let reporter = Arc::new(RecordingReporter::default());
        let tracker = SessionTracker::new(reporter.clone(), reporter.clone());

        let game = fake_game(vec![
            ProcessEvent::Log {
                stream: LogStream::Stderr,
                line: "Couldn't connect to server play.example.net".into(),
            },
            ProcessEvent::Crash(CrashDetails {
                reason: "game crashed".into(),
                log_tail: vec!["#@!@# Game crashed!".into()],
            }),
            ProcessEvent::Exit { code: Some(-1) },
        ]);
        tracker.track(game, None, context(), None).await;

        wait_for(|| !reporter.crashes().is_empty()).await;
        let crashes = reporter.crashes();
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes[0].reason, "game crashed");
        assert_eq!(crashes[0].log_tail, vec!["#@!@# Game crashed!".to_string()]);

        wait_for(|| !reporter.issues.lock().unwrap().is_empty()).await;
        let issues = reporter.issues.lock().unwrap().clone();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].server_address, "play.example.net");
    }

    #[test]
    fn session_closes_exactly_once() {
        let mut session = LaunchSession::new("s", "p");
        assert!(session.close(None).is_some_and(|end| !end.crashed));
        assert!(session.close(Some(1)).is_none());
        assert_eq!(session.exit_code, None);
    }
}
