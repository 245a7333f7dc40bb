pub mod model;

pub use model::{
    asset_object_relative, is_asset_hash, is_single_segment, LocalInstall, DEFAULT_PRIMARY_ARCHIVE,
};
