pub mod asset_index;
pub mod fetcher;

pub use asset_index::{AssetIndex, AssetObject};
pub use fetcher::{AssetFetcher, AssetReport, IndexSource};
