//! Data fetching and caching
//!
//! Handles:
//! - The `OptionsDataSource` seam and its Yahoo Finance implementation
//! - Chain fetching and normalization
//! - Caching of completed scans

pub mod cache;
pub mod fetcher;
pub mod source;
pub mod stub;
pub mod yahoo;

pub use cache::*;
pub use fetcher::*;
pub use source::*;
pub use stub::*;
pub use yahoo::*;
