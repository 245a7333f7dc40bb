pub mod service;

pub use service::{LaunchRequest, Orchestrator, ReadyInstall};
