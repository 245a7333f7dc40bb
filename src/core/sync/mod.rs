pub mod progress;
pub mod run;
pub mod synchronizer;

pub use progress::{Progress, ProgressReporter, Stage};
pub use run::{RunRegistry, RunTicket};
pub use synchronizer::{SyncOptions, SyncReport, Synchronizer};
