// ─── ALauncher Core ───
// Client synchronization and launch orchestration for the desktop launcher.
//
// Architecture:
//   core/
//     manifest/     — Server-declared file list per client version
//     install/      — On-disk layout of a client directory + shared assets
//     integrity/    — Missing / mismatched file detection, asset sampling
//     downloader/   — Bounded concurrent transfers with on-the-fly hashing
//     sync/         — Run tickets, progress stream, synchronization pipeline
//     assets/       — Asset index + content-addressed object fetcher
//     auth/         — Player identity handed over by the auth layer
//     java/         — Multi-platform Java detection and selection
//     launch/       — Arguments, classpath, natives, process + session tracking
//     telemetry/    — Statistics and crash collaborators
//     orchestrator/ — ensure_ready_and_launch
//     state/        — Settings + shared application state

pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod integrity;
pub mod java;
pub mod launch;
pub mod manifest;
pub mod orchestrator;
pub mod state;
pub mod sync;
pub mod telemetry;
