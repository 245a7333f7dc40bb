pub mod scheduler;
pub mod source;

pub use scheduler::{
    DownloadScheduler, DownloadTask, FileFailure, NoopObserver, TransferObserver, TransferOutcome,
    TransferSummary,
};
pub use source::{FileSource, HttpFileSource, RemoteFile};
