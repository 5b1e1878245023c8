//! Error type definitions for the brandmark pipeline
//!
//! Uses `thiserror` to provide automatic error trait implementations and
//! proper error chaining. `ImageAnalysisError` is deliberately granular:
//! callers branch on "unsupported format" vs "bad dimensions" vs "codec
//! failure" (e.g. a validation endpoint reports them differently).

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Input validation errors (bad/empty domain, malformed request)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Image decode/analysis errors
    #[error("Image analysis error: {0}")]
    ImageAnalysis(#[from] ImageAnalysisError),

    /// Request coalescer admission errors
    #[error("Coalescer error: {0}")]
    Coalesce(#[from] CoalesceError),

    /// External service errors (logo providers, favicon hosts)
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors from the persistent store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Image decode and analysis errors
///
/// The unsupported-format message names the offending format and lists
/// the supported set, since that text is surfaced verbatim to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageAnalysisError {
    /// The container format is not in the supported set
    #[error("unsupported image format \"{format}\" (supported formats: {supported})")]
    UnsupportedFormat { format: String, supported: String },

    /// One or both dimensions are non-positive or below the usable minimum
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    /// The codec failed to decode or re-encode the image
    #[error("image codec failure: {message}")]
    Codec { message: String },
}

/// Request coalescer admission errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoalesceError {
    /// The in-flight table is at its hard cap; the caller should fall
    /// back to an uncoalesced, uncached fetch
    #[error("in-flight table full ({capacity} concurrent operations)")]
    TableFull { capacity: usize },

    /// The leading caller vanished without publishing a result
    #[error("in-flight operation for '{key}' was abandoned")]
    Abandoned { key: String },
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ImageAnalysisError {
    /// Create a codec failure from any displayable error
    pub fn codec<E: std::fmt::Display>(err: E) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}
