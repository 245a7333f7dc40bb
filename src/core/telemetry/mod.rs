// ─── Telemetry ───
// Statistics and crash collaborators. Every call is best effort: failures
// are logged and never reach the launch flow.

pub mod reporter;
pub mod system;

pub use reporter::{
    best_effort, ConnectionIssue, CrashReport, CrashReporter, LaunchStats, LoggingReporter,
    SessionEnd, StatisticsReporter,
};
pub use system::os_description;
