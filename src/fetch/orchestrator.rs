//! Priority-ordered fetch with per-attempt timeouts
//!
//! Sources are tried strictly in order, one at a time; the first
//! non-empty success short-circuits the rest. The orchestrator never
//! returns an error: exhausting every source produces a failure
//! `FetchResult` carrying the aggregate reason for all attempts.
//!
//! A configured persistent store is consulted before any network
//! attempt, and successful fetches are persisted fire-and-forget
//! behind a bounded semaphore so a slow disk never backs up callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::errors::{AppError, AppResult};
use crate::models::FetchResult;
use crate::storage::LogoStorage;

use super::sources::attempt_plan;

/// Which timeout regime an attempt runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Normal request-time fetching
    Runtime,
    /// Pre-warm or build-time fetching, with tighter timeouts
    Prewarm,
}

/// Body and content type of one successful HTTP attempt
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Minimal byte-buffer HTTP client seam.
///
/// Production uses [`ReqwestByteFetcher`]; tests substitute scripted
/// implementations so the orchestrator is exercised without a network.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> AppResult<FetchedBytes>;
}

/// `reqwest`-backed [`ByteFetcher`]
pub struct ReqwestByteFetcher {
    client: reqwest::Client,
}

impl ReqwestByteFetcher {
    pub fn new(connect_timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ByteFetcher for ReqwestByteFetcher {
    async fn fetch_bytes(&self, url: &str) -> AppResult<FetchedBytes> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(
                "logo-source",
                format!("HTTP {status} from {url}"),
            ));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.bytes().await?;
        Ok(FetchedBytes { body, content_type })
    }
}

/// Walks the per-key attempt plan against a [`ByteFetcher`]
pub struct LogoFetcher {
    fetcher: Arc<dyn ByteFetcher>,
    config: FetchConfig,
    storage: Option<Arc<LogoStorage>>,
    persist_permits: Arc<Semaphore>,
}

impl LogoFetcher {
    pub fn new(
        config: FetchConfig,
        fetcher: Arc<dyn ByteFetcher>,
        storage: Option<Arc<LogoStorage>>,
    ) -> Self {
        let persist_permits = Arc::new(Semaphore::new(config.max_concurrent_persists));
        Self {
            fetcher,
            config,
            storage,
            persist_permits,
        }
    }

    /// Fetch a logo for a normalized key.
    ///
    /// Never errors; every failure mode ends in a `FetchResult` with
    /// `source = none` and an aggregate error string.
    pub async fn fetch(&self, key: &str, phase: FetchPhase) -> FetchResult {
        if let Some(storage) = &self.storage {
            if let Some(stored) = storage.load(key).await {
                debug!("Serving logo for '{}' from persistent store", key);
                return stored;
            }
        }

        let attempt_timeout = match phase {
            FetchPhase::Runtime => self.config.attempt_timeout,
            FetchPhase::Prewarm => self.config.prewarm_attempt_timeout,
        };

        let plan = attempt_plan(key);
        let mut failures: Vec<String> = Vec::with_capacity(plan.len());

        for attempt in &plan {
            match tokio::time::timeout(attempt_timeout, self.fetcher.fetch_bytes(&attempt.url))
                .await
            {
                Ok(Ok(fetched)) if !fetched.body.is_empty() => {
                    debug!(
                        "Fetched logo for '{}' from {} ({} bytes)",
                        key,
                        attempt.kind,
                        fetched.body.len()
                    );
                    let result = FetchResult::success(
                        key,
                        attempt.kind,
                        fetched.body,
                        fetched.content_type,
                    );
                    self.persist_in_background(&result);
                    return result;
                }
                Ok(Ok(_)) => {
                    failures.push(format!("{}: empty body", attempt.kind));
                }
                Ok(Err(e)) => {
                    debug!("Logo source {} failed for '{}': {}", attempt.kind, key, e);
                    failures.push(format!("{}: {e}", attempt.kind));
                }
                Err(_) => {
                    debug!(
                        "Logo source {} timed out for '{}' after {:?}",
                        attempt.kind, key, attempt_timeout
                    );
                    failures.push(format!(
                        "{}: timed out after {}ms",
                        attempt.kind,
                        attempt_timeout.as_millis()
                    ));
                }
            }
        }

        let aggregate = format!(
            "all {} logo sources failed for '{}': {}",
            plan.len(),
            key,
            failures.join("; ")
        );
        warn!("{}", aggregate);
        FetchResult::failure(key, aggregate)
    }

    /// Persist a successful fetch without blocking or failing the
    /// caller. Skipped entirely when the persist queue is saturated.
    fn persist_in_background(&self, result: &FetchResult) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let permit = match self.persist_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    "Skipping persistence for '{}': persist queue saturated",
                    result.key
                );
                return;
            }
        };
        let result = result.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = storage.persist(&result).await {
                warn!("Failed to persist logo for '{}': {}", result.key, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Pops one scripted response per call and records the URL hit
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<AppResult<FetchedBytes>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<AppResult<FetchedBytes>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn ok(body: &'static [u8]) -> AppResult<FetchedBytes> {
            Ok(FetchedBytes {
                body: Bytes::from_static(body),
                content_type: Some("image/png".to_string()),
            })
        }

        fn err(message: &str) -> AppResult<FetchedBytes> {
            Err(AppError::external_service("logo-source", message))
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ByteFetcher for ScriptedFetcher {
        async fn fetch_bytes(&self, url: &str) -> AppResult<FetchedBytes> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Self::err("script exhausted"))
        }
    }

    fn fetcher_with(scripted: Arc<ScriptedFetcher>) -> LogoFetcher {
        LogoFetcher::new(FetchConfig::default(), scripted, None)
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let scripted = ScriptedFetcher::new(vec![ScriptedFetcher::ok(b"logo-bytes")]);
        let fetcher = fetcher_with(scripted.clone());

        let result = fetcher.fetch("example.com", FetchPhase::Runtime).await;
        assert!(result.is_success());
        assert_eq!(result.source, crate::models::SourceKind::Clearbit);
        assert_eq!(scripted.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_past_failures() {
        let scripted = ScriptedFetcher::new(vec![
            ScriptedFetcher::err("connection refused"),
            ScriptedFetcher::err("HTTP 404"),
            ScriptedFetcher::ok(b"ddg-icon"),
        ]);
        let fetcher = fetcher_with(scripted.clone());

        let result = fetcher.fetch("example.com", FetchPhase::Runtime).await;
        assert!(result.is_success());
        assert_eq!(result.source, crate::models::SourceKind::DuckDuckGo);
        assert_eq!(scripted.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_body_counts_as_failure() {
        let scripted = ScriptedFetcher::new(vec![
            ScriptedFetcher::ok(b""),
            ScriptedFetcher::ok(b"real-bytes"),
        ]);
        let fetcher = fetcher_with(scripted.clone());

        let result = fetcher.fetch("example.com", FetchPhase::Runtime).await;
        assert!(result.is_success());
        assert_eq!(result.source, crate::models::SourceKind::GoogleFavicons);
    }

    #[tokio::test]
    async fn test_exhaustion_aggregates_all_attempts() {
        let scripted = ScriptedFetcher::new(
            (0..6).map(|i| ScriptedFetcher::err(&format!("boom-{i}"))).collect(),
        );
        let fetcher = fetcher_with(scripted.clone());

        let result = fetcher.fetch("example.com", FetchPhase::Runtime).await;
        assert!(!result.is_success());
        assert_eq!(result.source, crate::models::SourceKind::None);
        assert_eq!(scripted.call_count(), 6);

        let error = result.error.unwrap();
        assert!(error.starts_with("all 6 logo sources failed for 'example.com'"));
        for i in 0..6 {
            assert!(error.contains(&format!("boom-{i}")), "missing boom-{i}: {error}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_to_next_source() {
        struct SlowThenOk {
            calls: Mutex<usize>,
        }

        #[async_trait]
        impl ByteFetcher for SlowThenOk {
            async fn fetch_bytes(&self, _url: &str) -> AppResult<FetchedBytes> {
                let call = {
                    let mut calls = self.calls.lock().unwrap();
                    *calls += 1;
                    *calls
                };
                if call == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(FetchedBytes {
                    body: Bytes::from_static(b"slow-winner"),
                    content_type: None,
                })
            }
        }

        let slow = Arc::new(SlowThenOk {
            calls: Mutex::new(0),
        });
        let fetcher = LogoFetcher::new(FetchConfig::default(), slow, None);

        let result = fetcher.fetch("example.com", FetchPhase::Runtime).await;
        assert!(result.is_success());
        assert_eq!(result.source, crate::models::SourceKind::GoogleFavicons);
    }
}
