//! Centralized error handling for the brandmark pipeline
//!
//! Only two error families cross the crate boundary as hard failures:
//! input validation and image decode/analysis. Everything else (source
//! fallback, cache admission, persistence) degrades to a best-effort
//! result and is reported through `FetchResult`/`LogoResolution` fields.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
