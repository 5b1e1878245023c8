//! Core data model for the brandmark pipeline
//!
//! These types flow between the fetch orchestrator, the image analyzers,
//! the cache hierarchy, and the composed service. Cached values are
//! stored by value; buffers are `bytes::Bytes` so clones are cheap and
//! never alias a streaming response body.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which external source produced a fetch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Clearbit logo API ("HD" endpoint)
    Clearbit,
    /// Google s2 favicon service
    GoogleFavicons,
    /// DuckDuckGo icon service
    DuckDuckGo,
    /// Conventional favicon paths on the domain itself
    DirectFavicon,
    /// No source produced a usable image
    None,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Clearbit => "clearbit",
            SourceKind::GoogleFavicons => "google-favicons",
            SourceKind::DuckDuckGo => "duckduckgo",
            SourceKind::DirectFavicon => "direct-favicon",
            SourceKind::None => "none",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one multi-source fetch, immutable once constructed
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Normalized cache key the fetch was issued for
    pub key: String,
    pub source: SourceKind,
    /// Raw image bytes; `None` when every source failed
    pub buffer: Option<Bytes>,
    pub content_type: Option<String>,
    /// Aggregate failure description when `buffer` is absent
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn success(
        key: impl Into<String>,
        source: SourceKind,
        buffer: Bytes,
        content_type: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            source,
            buffer: Some(buffer),
            content_type,
            error: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn failure(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: SourceKind::None,
            buffer: None,
            content_type: None,
            error: Some(error.into()),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.buffer.is_some()
    }

    /// Bytes held by this result, for cache accounting
    pub fn buffer_len(&self) -> usize {
        self.buffer.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

/// Placeholder-detection verdict, keyed by content hash of the raw
/// bytes so identical images across domains share one verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// SHA-256 of the raw image bytes
    pub image_hash: String,
    pub is_placeholder_icon: bool,
    pub verdict_at: DateTime<Utc>,
}

/// Luminance and transparency statistics for theme-aware rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessAnalysis {
    /// Average luminance over opaque pixels, 0-255
    pub average_brightness: u8,
    pub is_light_colored: bool,
    pub needs_inversion_in_light_theme: bool,
    pub needs_inversion_in_dark_theme: bool,
    pub has_transparency: bool,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

/// Boundary adapter over [`BrightnessAnalysis`] for UI consumers that
/// only care about the two inversion decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeAdjustments {
    pub invert_in_light_theme: bool,
    pub invert_in_dark_theme: bool,
}

impl From<&BrightnessAnalysis> for ThemeAdjustments {
    fn from(analysis: &BrightnessAnalysis) -> Self {
        Self {
            invert_in_light_theme: analysis.needs_inversion_in_light_theme,
            invert_in_dark_theme: analysis.needs_inversion_in_dark_theme,
        }
    }
}

/// Process memory health, derived from the latest sample against the
/// configured warning/critical thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryHealthState {
    Healthy,
    Warning,
    Critical,
}

impl MemoryHealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryHealthState::Healthy => "healthy",
            MemoryHealthState::Warning => "warning",
            MemoryHealthState::Critical => "critical",
        }
    }
}

/// Direction of recent memory usage, a simple slope over the sample history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    Increasing,
    Stable,
    Decreasing,
}

/// Aggregated cache observability counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Memory health snapshot for observability endpoints
#[derive(Debug, Clone, Serialize)]
pub struct MemoryHealthReport {
    pub state: MemoryHealthState,
    pub trend: MemoryTrend,
    pub rss_bytes: u64,
    pub budget_bytes: u64,
}

/// Result of the composed `resolve_logo` entry point; never an error
/// for expected failure modes
#[derive(Debug, Clone)]
pub struct LogoResolution {
    pub key: String,
    pub buffer: Option<Bytes>,
    pub source: SourceKind,
    pub error: Option<String>,
}

impl From<FetchResult> for LogoResolution {
    fn from(result: FetchResult) -> Self {
        Self {
            key: result.key,
            buffer: result.buffer,
            source: result.source,
            error: result.error,
        }
    }
}
