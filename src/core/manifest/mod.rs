pub mod client;
pub mod model;

pub use client::{HttpManifestSource, ManifestLookup, ManifestSource};
pub use model::{FileEntry, FileKind, VersionManifest};
