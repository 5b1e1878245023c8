//! Logo acquisition, validation, and caching pipeline
//!
//! Feed `resolve_logo` a URL, hostname, or company name and get back
//! image bytes from the first logo provider that has them, with
//! placeholder filtering, brightness/inversion analysis, request
//! coalescing, and memory-budgeted caching layered on top. The
//! [`service::LogoService`] is the composition root; everything else
//! is usable standalone.

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod image_ops;
pub mod logging;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod service;
pub mod storage;

pub use config::BrandmarkConfig;
pub use errors::{AppError, AppResult, CoalesceError, ImageAnalysisError};
pub use models::{
    BrightnessAnalysis, CacheStats, FetchResult, LogoResolution, MemoryHealthReport,
    MemoryHealthState, MemoryTrend, SourceKind, ThemeAdjustments, ValidationVerdict,
};
pub use fetch::FetchPhase;
pub use service::LogoService;
