//! Dataset acquisition: cached download and decoding.

pub mod fetcher;
pub mod loader;

pub use fetcher::{ensure_fresh, CacheOptions, CachedDataset};
pub use loader::load_records;
