//! Layered in-process caching for the logo pipeline

pub mod entry;
pub mod hierarchy;

pub use entry::CacheEntry;
pub use hierarchy::{CacheNamespace, LogoCacheHierarchy};
