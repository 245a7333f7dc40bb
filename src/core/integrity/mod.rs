pub mod checker;
pub mod hash;

pub use checker::{
    AssetCheck, AssetSampling, FileProblem, IntegrityChecker, ProblemFile, Readiness, VerifyMode,
    VerifyReport,
};
pub use hash::HashAlgorithm;
