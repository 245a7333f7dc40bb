pub mod args;
pub mod classpath;
pub mod natives;
pub mod process;
pub mod profile;
pub mod tracker;

pub use args::{build_args, LaunchArgs};
pub use classpath::{join_classpath, resolve_classpath};
pub use natives::prepare_natives;
pub use process::{
    detect_crash, launch, CrashDetails, LaunchCommand, LaunchResult, LogStream, ProcessEvent,
    ProcessRegistry, ProcessStatus, RunningGame,
};
pub use profile::{LaunchProfile, Resolution, RuntimeConfig};
pub use tracker::{LaunchSession, SessionTracker, TrackContext, TrackedExit};
