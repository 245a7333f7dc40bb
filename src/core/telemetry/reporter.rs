use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::LauncherResult;
use crate::core::launch::Resolution;

/// Sent when a game process has started.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchStats {
    pub profile_id: String,
    pub profile_version: String,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
    pub java_version: Option<String>,
    pub ram: u32,
    pub resolution: Resolution,
    pub full_screen: bool,
    pub auto_enter: bool,
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnd {
    pub session_id: String,
    pub exit_code: Option<i32>,
    pub crashed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub session_id: Option<String>,
    pub profile_id: String,
    pub exit_code: Option<i32>,
    pub reason: String,
    pub log_tail: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIssue {
    pub profile_id: String,
    pub server_address: String,
    pub server_port: Option<u16>,
    pub message: String,
}

#[async_trait]
pub trait StatisticsReporter: Send + Sync {
    /// Returns the session id assigned by the collaborator.
    async fn launch_started(&self, stats: &LaunchStats) -> LauncherResult<String>;
    async fn launch_ended(&self, end: &SessionEnd) -> LauncherResult<()>;
}

#[async_trait]
pub trait CrashReporter: Send + Sync {
    async fn report_crash(&self, report: &CrashReport) -> LauncherResult<()>;
    async fn report_connection_issue(&self, issue: &ConnectionIssue) -> LauncherResult<()>;
}

/// Default collaborator: writes everything to the log and hands out local
/// session ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

#[async_trait]
impl StatisticsReporter for LoggingReporter {
    async fn launch_started(&self, stats: &LaunchStats) -> LauncherResult<String> {
        let session_id = Uuid::new_v4().to_string();
        info!(
            "Session {} started: profile={} version={} java={:?} ram={}M os={}",
            session_id,
            stats.profile_id,
            stats.profile_version,
            stats.java_version,
            stats.ram,
            stats.os
        );
        Ok(session_id)
    }

    async fn launch_ended(&self, end: &SessionEnd) -> LauncherResult<()> {
        info!(
            "Session {} ended: exit_code={:?} crashed={}",
            end.session_id, end.exit_code, end.crashed
        );
        Ok(())
    }
}

#[async_trait]
impl CrashReporter for LoggingReporter {
    async fn report_crash(&self, report: &CrashReport) -> LauncherResult<()> {
        warn!(
            "Crash in profile {} (session {:?}): {} [{} log lines]",
            report.profile_id,
            report.session_id,
            report.reason,
            report.log_tail.len()
        );
        Ok(())
    }

    async fn report_connection_issue(&self, issue: &ConnectionIssue) -> LauncherResult<()> {
        warn!(
            "Connection issue for profile {} at {}:{:?}: {}",
            issue.profile_id, issue.server_address, issue.server_port, issue.message
        );
        Ok(())
    }
}

/// Await a collaborator call, logging instead of propagating its error.
pub async fn best_effort<T, F>(what: &str, call: F) -> Option<T>
where
    F: Future<Output = LauncherResult<T>>,
{
    match call.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("{} failed: {}", what, err);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::core::error::LauncherError;

    /// Records every call; `fail_start` makes `launch_started` fail.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub fail_start: bool,
        pub started: Mutex<Vec<LaunchStats>>,
        pub ended: Mutex<Vec<SessionEnd>>,
        pub crashes: Mutex<Vec<CrashReport>>,
        pub issues: Mutex<Vec<ConnectionIssue>>,
        pub calls: AtomicUsize,
    }

    impl RecordingReporter {
        pub fn ended(&self) -> Vec<SessionEnd> {
            self.ended.lock().unwrap().clone()
        }

        pub fn crashes(&self) -> Vec<CrashReport> {
            self.crashes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatisticsReporter for RecordingReporter {
        async fn launch_started(&self, stats: &LaunchStats) -> LauncherResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(LauncherError::Statistics("backend unavailable".into()));
            }
            self.started.lock().unwrap().push(stats.clone());
            Ok("session-1".into())
        }

        async fn launch_ended(&self, end: &SessionEnd) -> LauncherResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ended.lock().unwrap().push(end.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl CrashReporter for RecordingReporter {
        async fn report_crash(&self, report: &CrashReport) -> LauncherResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.crashes.lock().unwrap().push(report.clone());
            Ok(())
        }

        async fn report_connection_issue(&self, issue: &ConnectionIssue) -> LauncherResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.issues.lock().unwrap().push(issue.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::LauncherError;

    #[tokio::test]
    async fn best_effort_swallows_errors() {
        let failed: Option<()> = best_effort("statistics", async {
            Err(LauncherError::Statistics("offline".into()))
        })
        .await;
        assert!(failed.is_none());

        let ok = best_effort("statistics", async { Ok::<_, LauncherError>(7) }).await;
        assert_eq!(ok, Some(7));
    }

    #[tokio::test]
    async fn logging_reporter_hands_out_distinct_sessions() {
        let stats = LaunchStats {
            profile_id: "42".into(),
            profile_version: "1.12.2".into(),
            server_address: None,
            server_port: None,
            java_version: Some("8".into()),
            ram: 2048,
            resolution: Resolution::default(),
            full_screen: false,
            auto_enter: false,
            os: "test".into(),
        };
        let a = LoggingReporter.launch_started(&stats).await.unwrap();
        let b = LoggingReporter.launch_started(&stats).await.unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
