//! Memory pressure governance
//!
//! A background loop samples process memory at a fixed interval, feeds
//! the [`governor::MemoryPressureGovernor`], and triggers emergency
//! cache shedding on the transition into critical. Request paths only
//! ever read the governor's atomic state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::LogoCacheHierarchy;
use crate::models::MemoryHealthState;

pub mod governor;
pub mod sampler;

pub use governor::MemoryPressureGovernor;
pub use sampler::{MemorySampler, SysinfoSampler};

/// Run the sampling loop until the shutdown token fires.
///
/// Failed samples are skipped and cleanup failures are logged; nothing
/// in the loop can panic or stop it early.
pub fn spawn_sampling_loop(
    governor: Arc<MemoryPressureGovernor>,
    mut sampler: Box<dyn MemorySampler>,
    cache: Arc<LogoCacheHierarchy>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Memory sampling loop shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let Some(rss) = sampler.sample_rss_bytes() else {
                continue;
            };

            let previous = governor.state();
            let next = governor.record_sample(rss);

            if next == MemoryHealthState::Critical && previous != MemoryHealthState::Critical {
                let shed = cache.shed_largest_namespace().await;
                warn!(
                    "Emergency cache shed on critical memory pressure: {} entries dropped",
                    shed
                );
            } else if next != MemoryHealthState::Healthy {
                let evicted = cache.evict_expired().await;
                if evicted > 0 {
                    debug!("Evicted {} expired cache entries under pressure", evicted);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, MemoryConfig};
    use crate::models::{FetchResult, SourceKind};
    use bytes::Bytes;
    use std::collections::VecDeque;

    /// Replays a fixed sample sequence, then repeats the last value
    struct ScriptedSampler {
        samples: VecDeque<u64>,
        last: u64,
    }

    impl MemorySampler for ScriptedSampler {
        fn sample_rss_bytes(&mut self) -> Option<u64> {
            if let Some(sample) = self.samples.pop_front() {
                self.last = sample;
            }
            Some(self.last)
        }
    }

    #[tokio::test]
    async fn test_loop_sheds_cache_on_entering_critical() {
        const MB: u64 = 1024 * 1024;
        let memory = MemoryConfig {
            budget_mb: 100,
            ..MemoryConfig::default()
        };
        let governor = Arc::new(MemoryPressureGovernor::new(&memory));
        let cache = Arc::new(LogoCacheHierarchy::new(
            &CacheConfig::default(),
            governor.clone(),
        ));

        cache
            .set_fetch_result(
                "example.com",
                FetchResult::success(
                    "example.com",
                    SourceKind::Clearbit,
                    Bytes::from_static(b"logo"),
                    None,
                ),
            )
            .await;

        let sampler = ScriptedSampler {
            samples: [10 * MB, 50 * MB, 95 * MB].into(),
            last: 0,
        };
        let shutdown = CancellationToken::new();
        let handle = spawn_sampling_loop(
            governor.clone(),
            Box::new(sampler),
            cache.clone(),
            Duration::from_millis(10),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(governor.state(), MemoryHealthState::Critical);
        assert!(cache.get_fetch_result("example.com").await.is_none());
    }
}
