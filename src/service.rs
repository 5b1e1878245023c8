//! Composed logo service
//!
//! Owns the cache hierarchy, pressure governor, coalescer, fetch
//! orchestrator, and optional persistent store, and wires them into the
//! public entry points: `resolve_logo`, `is_placeholder_icon`,
//! `analyze_brightness`, `invert_logo`, and the observability getters.
//! Constructed once at application startup and shared by handle; there
//! is no process-wide singleton.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LogoCacheHierarchy;
use crate::coalesce::RequestCoalescer;
use crate::config::BrandmarkConfig;
use crate::errors::{AppError, AppResult, CoalesceError};
use crate::fetch::{ByteFetcher, FetchPhase, LogoFetcher, ReqwestByteFetcher};
use crate::image_ops::{brightness, phash};
use crate::memory::{spawn_sampling_loop, MemoryPressureGovernor, SysinfoSampler};
use crate::models::{
    BrightnessAnalysis, CacheStats, FetchResult, LogoResolution, MemoryHealthReport,
    ThemeAdjustments, ValidationVerdict,
};
use crate::normalize::normalize;
use crate::storage::LogoStorage;

/// Bundled reference image for placeholder detection: the generic
/// globe icon several providers serve when they have no real logo.
pub const PLACEHOLDER_REFERENCE: &[u8] = include_bytes!("../assets/placeholder-globe.png");

pub struct LogoService {
    config: BrandmarkConfig,
    cache: Arc<LogoCacheHierarchy>,
    governor: Arc<MemoryPressureGovernor>,
    coalescer: RequestCoalescer<FetchResult>,
    fetcher: LogoFetcher,
    placeholder_hash: Option<String>,
    sampler: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl LogoService {
    /// Build the service with the production HTTP client.
    pub fn new(config: BrandmarkConfig) -> AppResult<Self> {
        let byte_fetcher = Arc::new(ReqwestByteFetcher::new(config.fetch.connect_timeout)?);
        Self::with_byte_fetcher(config, byte_fetcher)
    }

    /// Build the service over an arbitrary [`ByteFetcher`], so tests
    /// can drive the full pipeline without a network.
    pub fn with_byte_fetcher(
        config: BrandmarkConfig,
        byte_fetcher: Arc<dyn ByteFetcher>,
    ) -> AppResult<Self> {
        config.validate()?;

        let governor = Arc::new(MemoryPressureGovernor::new(&config.memory));
        let cache = Arc::new(LogoCacheHierarchy::new(&config.cache, governor.clone()));
        let coalescer = RequestCoalescer::new(config.cache.coalescer_capacity);

        let storage = config
            .storage
            .as_ref()
            .map(|s| Arc::new(LogoStorage::new(&s.root)));
        let fetcher = LogoFetcher::new(config.fetch.clone(), byte_fetcher, storage);

        let placeholder_bytes = match config
            .storage
            .as_ref()
            .and_then(|s| s.placeholder_reference.as_ref())
        {
            Some(path) => std::fs::read(path).map_err(|e| {
                AppError::configuration(format!(
                    "cannot read placeholder reference {}: {e}",
                    path.display()
                ))
            })?,
            None => PLACEHOLDER_REFERENCE.to_vec(),
        };
        let placeholder_hash = match phash::hash(&placeholder_bytes) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Placeholder reference unusable, detection disabled: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            cache,
            governor,
            coalescer,
            fetcher,
            placeholder_hash,
            sampler: Mutex::new(None),
        })
    }

    /// Start the background memory sampling loop. Idempotent.
    pub fn start(&self) {
        let mut sampler = self.sampler.lock().unwrap_or_else(|p| p.into_inner());
        if sampler.is_some() {
            return;
        }
        info!(
            "Starting memory sampling loop (budget {}MB, every {:?})",
            self.config.memory.budget_mb, self.config.memory.sample_interval
        );
        let shutdown = CancellationToken::new();
        let handle = spawn_sampling_loop(
            self.governor.clone(),
            Box::new(SysinfoSampler::new()),
            self.cache.clone(),
            self.config.memory.sample_interval,
            shutdown.clone(),
        );
        *sampler = Some((shutdown, handle));
    }

    /// Resolve a logo for free-form input.
    ///
    /// Never fails for expected conditions: provider failures and
    /// placeholder matches come back as a resolution with no buffer and
    /// a populated error. The only `Err` cases are input validation
    /// (an input that normalizes to an empty key).
    pub async fn resolve_logo(&self, input: &str, phase: FetchPhase) -> AppResult<LogoResolution> {
        let key = normalize(input);
        if key.is_empty() {
            return Err(AppError::validation(format!(
                "logo input {input:?} normalizes to an empty key"
            )));
        }

        if let Some(hit) = self.cache.get_fetch_result(&key).await {
            return Ok(hit.into());
        }

        let coalesced = self
            .coalescer
            .run_exclusive(&key, || async {
                let result = self.fetcher.fetch(&key, phase).await;
                let result = self.filter_placeholder(result).await;
                if result.is_success() {
                    self.cache.set_fetch_result(&key, result.clone()).await;
                }
                result
            })
            .await;

        let result = match coalesced {
            Ok(result) => result,
            Err(CoalesceError::TableFull { capacity }) => {
                // Degraded path: fetch anyway, skip the shared cache so
                // the uncoalesced result cannot stampede it.
                debug!(
                    "Coalescer at capacity ({}), fetching '{}' uncoalesced",
                    capacity, key
                );
                let result = self.fetcher.fetch(&key, phase).await;
                self.filter_placeholder(result).await
            }
            Err(CoalesceError::Abandoned { .. }) => {
                debug!("In-flight fetch for '{}' abandoned, retrying directly", key);
                let result = self.fetcher.fetch(&key, phase).await;
                self.filter_placeholder(result).await
            }
        };

        Ok(result.into())
    }

    /// Downgrade a fetched generic placeholder icon to a no-logo
    /// result, so callers render their own fallback instead.
    async fn filter_placeholder(&self, result: FetchResult) -> FetchResult {
        let Some(buffer) = &result.buffer else {
            return result;
        };
        if self.is_placeholder_icon(buffer).await {
            debug!(
                "Source {} returned a placeholder icon for '{}'",
                result.source, result.key
            );
            return FetchResult::failure(
                result.key.clone(),
                format!("source {} returned a generic placeholder icon", result.source),
            );
        }
        result
    }

    /// Whether the buffer is perceptually identical to the bundled
    /// placeholder reference. Verdicts are cached by content hash, so
    /// the same bytes seen under different keys are hashed once.
    pub async fn is_placeholder_icon(&self, buffer: &[u8]) -> bool {
        let Some(placeholder_hash) = &self.placeholder_hash else {
            return false;
        };

        let content = phash::content_hash(buffer);
        if let Some(verdict) = self.cache.get_verdict(&content).await {
            return verdict.is_placeholder_icon;
        }

        let is_placeholder = match phash::hash(buffer) {
            Ok(hash) => &hash == placeholder_hash,
            Err(_) => false,
        };

        self.cache
            .set_verdict(
                &content,
                ValidationVerdict {
                    image_hash: content.clone(),
                    is_placeholder_icon: is_placeholder,
                    verdict_at: chrono::Utc::now(),
                },
            )
            .await;
        is_placeholder
    }

    /// Brightness analysis with content-hash caching.
    pub async fn analyze_brightness(&self, buffer: &[u8]) -> AppResult<BrightnessAnalysis> {
        let content = phash::content_hash(buffer);
        if let Some(analysis) = self.cache.get_brightness(&content).await {
            return Ok(analysis);
        }

        let analysis = brightness::analyze(buffer)?;
        self.cache.set_brightness(&content, analysis.clone()).await;
        Ok(analysis)
    }

    /// Boundary adapter over [`analyze_brightness`] for consumers that
    /// only need the two inversion decisions.
    ///
    /// [`analyze_brightness`]: Self::analyze_brightness
    pub async fn theme_adjustments(&self, buffer: &[u8]) -> AppResult<ThemeAdjustments> {
        let analysis = self.analyze_brightness(buffer).await?;
        Ok(ThemeAdjustments::from(&analysis))
    }

    /// Invert a logo's colors, re-encoded as PNG. Results are cached by
    /// content hash unless the governor has suspended image-op caching.
    pub async fn invert_logo(
        &self,
        buffer: &[u8],
        preserve_transparency: bool,
    ) -> AppResult<Bytes> {
        let cache_key = format!("{}:{}", phash::content_hash(buffer), preserve_transparency);
        if let Some(inverted) = self.cache.get_inverted(&cache_key).await {
            return Ok(inverted);
        }

        let inverted = Bytes::from(brightness::invert(buffer, preserve_transparency)?);
        if self.governor.should_allow_image_ops() {
            self.cache.set_inverted(&cache_key, inverted.clone()).await;
        }
        Ok(inverted)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn memory_health(&self) -> MemoryHealthReport {
        self.governor.health_report()
    }

    /// Drop every cached artifact and stop the sampling loop. Called on
    /// shutdown; `start` may be called again afterwards.
    pub async fn flush(&self) {
        let stopped = {
            let mut guard = self.sampler.lock().unwrap_or_else(|p| p.into_inner());
            guard.take()
        };
        if let Some((shutdown, handle)) = stopped {
            shutdown.cancel();
            let _ = handle.await;
        }
        let dropped = self.cache.clear(None).await;
        info!("Flushed logo caches ({} entries)", dropped);
    }
}

impl Drop for LogoService {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sampler.lock() {
            if let Some((shutdown, _)) = guard.take() {
                shutdown.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppResult;
    use crate::fetch::FetchedBytes;
    use crate::image_ops::test_images::solid_png;
    use crate::models::SourceKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    struct ScriptedFetcher {
        responses: Mutex<VecDeque<AppResult<FetchedBytes>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<AppResult<FetchedBytes>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                delay: None,
            })
        }

        fn delayed(responses: Vec<AppResult<FetchedBytes>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            })
        }

        fn ok(body: Vec<u8>) -> AppResult<FetchedBytes> {
            Ok(FetchedBytes {
                body: Bytes::from(body),
                content_type: Some("image/png".to_string()),
            })
        }

        fn err() -> AppResult<FetchedBytes> {
            Err(AppError::external_service("logo-source", "connection refused"))
        }
    }

    #[async_trait]
    impl ByteFetcher for ScriptedFetcher {
        async fn fetch_bytes(&self, _url: &str) -> AppResult<FetchedBytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(Self::err)
        }
    }

    fn service_with(fetcher: Arc<ScriptedFetcher>) -> LogoService {
        LogoService::with_byte_fetcher(BrandmarkConfig::default(), fetcher).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let fetcher = ScriptedFetcher::new(vec![ScriptedFetcher::ok(solid_png(
            64,
            64,
            [30, 60, 90],
        ))]);
        let service = service_with(fetcher.clone());

        let resolution = service
            .resolve_logo("https://www.example.com/about", FetchPhase::Runtime)
            .await
            .unwrap();

        assert_eq!(resolution.key, "example.com");
        assert_eq!(resolution.source, SourceKind::Clearbit);
        assert!(resolution.buffer.is_some());
        assert!(resolution.error.is_none());
    }

    #[tokio::test]
    async fn test_second_resolution_is_served_from_cache() {
        let fetcher = ScriptedFetcher::new(vec![ScriptedFetcher::ok(solid_png(
            64,
            64,
            [30, 60, 90],
        ))]);
        let service = service_with(fetcher.clone());

        service
            .resolve_logo("example.com", FetchPhase::Runtime)
            .await
            .unwrap();
        let first_calls = fetcher.calls.load(Ordering::SeqCst);

        let again = service
            .resolve_logo("https://example.com", FetchPhase::Runtime)
            .await
            .unwrap();
        assert!(again.buffer.is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), first_calls);
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_error_resolution() {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let service = service_with(fetcher);

        let resolution = service
            .resolve_logo("no-such-domain-xyz.test", FetchPhase::Runtime)
            .await
            .unwrap();

        assert!(resolution.buffer.is_none());
        assert_eq!(resolution.source, SourceKind::None);
        let error = resolution.error.unwrap();
        assert!(error.contains("no-such-domain-xyz.test"));
        assert!(!error.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_is_a_validation_error() {
        let service = service_with(ScriptedFetcher::new(Vec::new()));
        let err = service.resolve_logo("   ", FetchPhase::Runtime).await;
        assert!(matches!(err, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_placeholder_fetch_is_downgraded() {
        let fetcher =
            ScriptedFetcher::new(vec![ScriptedFetcher::ok(PLACEHOLDER_REFERENCE.to_vec())]);
        let service = service_with(fetcher);

        let resolution = service
            .resolve_logo("example.com", FetchPhase::Runtime)
            .await
            .unwrap();

        assert!(resolution.buffer.is_none());
        assert_eq!(resolution.source, SourceKind::None);
        assert!(resolution.error.unwrap().contains("placeholder"));
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_coalesce_to_one_fetch() {
        let fetcher = ScriptedFetcher::delayed(
            vec![ScriptedFetcher::ok(solid_png(64, 64, [10, 10, 200]))],
            Duration::from_millis(50),
        );
        let service = Arc::new(service_with(fetcher.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service.resolve_logo("example.com", FetchPhase::Runtime).await
                })
            })
            .collect();

        for outcome in futures::future::join_all(handles).await {
            let resolution = outcome.unwrap().unwrap();
            assert!(resolution.buffer.is_some());
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_is_placeholder_icon() {
        let service = service_with(ScriptedFetcher::new(Vec::new()));

        assert!(service.is_placeholder_icon(PLACEHOLDER_REFERENCE).await);
        assert!(!service
            .is_placeholder_icon(&solid_png(64, 64, [200, 10, 10]))
            .await);
        assert!(!service.is_placeholder_icon(b"not an image").await);
    }

    #[tokio::test]
    async fn test_brightness_analysis_is_cached_by_content() {
        let service = service_with(ScriptedFetcher::new(Vec::new()));
        let white = solid_png(64, 64, [255, 255, 255]);

        let first = service.analyze_brightness(&white).await.unwrap();
        assert_eq!(first.average_brightness, 255);

        let before = service.cache_stats().await;
        let second = service.analyze_brightness(&white).await.unwrap();
        let after = service.cache_stats().await;

        assert_eq!(first, second);
        assert_eq!(after.hit_count, before.hit_count + 1);
    }

    #[tokio::test]
    async fn test_invert_logo_round_trips() {
        let service = service_with(ScriptedFetcher::new(Vec::new()));
        let original = solid_png(32, 32, [20, 40, 60]);

        let once = assert_ok!(service.invert_logo(&original, false).await);
        let twice = assert_ok!(service.invert_logo(&once, false).await);

        let a = image::load_from_memory(&original).unwrap().to_rgb8();
        let b = image::load_from_memory(&twice).unwrap().to_rgb8();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[tokio::test]
    async fn test_theme_adjustments_adapter() {
        let service = service_with(ScriptedFetcher::new(Vec::new()));
        let hints = service
            .theme_adjustments(&solid_png(32, 32, [250, 250, 250]))
            .await
            .unwrap();
        assert!(hints.invert_in_light_theme);
        assert!(!hints.invert_in_dark_theme);
    }

    #[tokio::test]
    async fn test_flush_empties_caches() {
        let fetcher = ScriptedFetcher::new(vec![ScriptedFetcher::ok(solid_png(
            64,
            64,
            [1, 2, 3],
        ))]);
        let service = service_with(fetcher);

        service
            .resolve_logo("example.com", FetchPhase::Runtime)
            .await
            .unwrap();
        assert!(service.cache_stats().await.entry_count > 0);

        service.flush().await;
        assert_eq!(service.cache_stats().await.entry_count, 0);
    }
}
