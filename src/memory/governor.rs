//! Memory pressure state machine
//!
//! State is recomputed on every sample purely from the latest reading
//! against the warning/critical thresholds derived from the configured
//! budget. The current state lives in an atomic so request paths read
//! it without ever blocking on the sampler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::models::{MemoryHealthReport, MemoryHealthState, MemoryTrend};

const STATE_HEALTHY: u8 = 0;
const STATE_WARNING: u8 = 1;
const STATE_CRITICAL: u8 = 2;

pub struct MemoryPressureGovernor {
    budget_bytes: u64,
    warning_bytes: u64,
    critical_bytes: u64,
    history_len: usize,
    state: AtomicU8,
    last_rss: AtomicU64,
    history: Mutex<VecDeque<u64>>,
}

impl MemoryPressureGovernor {
    pub fn new(config: &MemoryConfig) -> Self {
        let budget_bytes = config.budget_mb * 1024 * 1024;
        Self {
            budget_bytes,
            warning_bytes: (budget_bytes as f64 * config.warning_ratio) as u64,
            critical_bytes: (budget_bytes as f64 * config.critical_ratio) as u64,
            history_len: config.history_len.max(2),
            state: AtomicU8::new(STATE_HEALTHY),
            last_rss: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Feed one resident-memory reading and return the resulting state.
    ///
    /// Transitions in either direction are logged; staying in the same
    /// state is not.
    pub fn record_sample(&self, rss_bytes: u64) -> MemoryHealthState {
        self.last_rss.store(rss_bytes, Ordering::Relaxed);

        {
            let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            history.push_back(rss_bytes);
            while history.len() > self.history_len {
                history.pop_front();
            }
        }

        let next = if rss_bytes >= self.critical_bytes {
            MemoryHealthState::Critical
        } else if rss_bytes >= self.warning_bytes {
            MemoryHealthState::Warning
        } else {
            MemoryHealthState::Healthy
        };

        let previous = decode(self.state.swap(encode(next), Ordering::Relaxed));
        if previous != next {
            let mb = rss_bytes / (1024 * 1024);
            match next {
                MemoryHealthState::Critical => {
                    warn!(
                        "Memory pressure critical: {}MB of {}MB budget",
                        mb,
                        self.budget_bytes / (1024 * 1024)
                    );
                }
                MemoryHealthState::Warning => {
                    info!(
                        "Memory pressure warning: {}MB of {}MB budget",
                        mb,
                        self.budget_bytes / (1024 * 1024)
                    );
                }
                MemoryHealthState::Healthy => {
                    debug!("Memory pressure back to healthy at {}MB", mb);
                }
            }
        }
        next
    }

    pub fn state(&self) -> MemoryHealthState {
        decode(self.state.load(Ordering::Relaxed))
    }

    /// Cache write admission: rejected only under critical pressure
    pub fn should_accept_cache_writes(&self) -> bool {
        self.state() != MemoryHealthState::Critical
    }

    /// Expensive decode/resize admission, same policy as cache writes
    pub fn should_allow_image_ops(&self) -> bool {
        self.state() != MemoryHealthState::Critical
    }

    /// Direction of recent usage: a least-squares slope over the sample
    /// history, with a small dead band so jitter reads as stable.
    pub fn trend(&self) -> MemoryTrend {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        if history.len() < 2 {
            return MemoryTrend::Stable;
        }

        let n = history.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = history.iter().map(|&v| v as f64).sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, &value) in history.iter().enumerate() {
            let dx = i as f64 - mean_x;
            numerator += dx * (value as f64 - mean_y);
            denominator += dx * dx;
        }
        if denominator == 0.0 {
            return MemoryTrend::Stable;
        }

        // Slope is bytes per sample; under 0.5% of budget per sample
        // counts as noise.
        let slope = numerator / denominator;
        let dead_band = self.budget_bytes as f64 * 0.005;
        if slope > dead_band {
            MemoryTrend::Increasing
        } else if slope < -dead_band {
            MemoryTrend::Decreasing
        } else {
            MemoryTrend::Stable
        }
    }

    pub fn health_report(&self) -> MemoryHealthReport {
        MemoryHealthReport {
            state: self.state(),
            trend: self.trend(),
            rss_bytes: self.last_rss.load(Ordering::Relaxed),
            budget_bytes: self.budget_bytes,
        }
    }
}

fn encode(state: MemoryHealthState) -> u8 {
    match state {
        MemoryHealthState::Healthy => STATE_HEALTHY,
        MemoryHealthState::Warning => STATE_WARNING,
        MemoryHealthState::Critical => STATE_CRITICAL,
    }
}

fn decode(raw: u8) -> MemoryHealthState {
    match raw {
        STATE_CRITICAL => MemoryHealthState::Critical,
        STATE_WARNING => MemoryHealthState::Warning,
        _ => MemoryHealthState::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn governor() -> MemoryPressureGovernor {
        // 100MB budget, warning at 75MB, critical at 90MB
        MemoryPressureGovernor::new(&MemoryConfig {
            budget_mb: 100,
            warning_ratio: 0.75,
            critical_ratio: 0.90,
            ..MemoryConfig::default()
        })
    }

    #[test]
    fn test_state_thresholds() {
        let governor = governor();
        assert_eq!(governor.record_sample(10 * MB), MemoryHealthState::Healthy);
        assert_eq!(governor.record_sample(80 * MB), MemoryHealthState::Warning);
        assert_eq!(governor.record_sample(95 * MB), MemoryHealthState::Critical);
        assert_eq!(governor.state(), MemoryHealthState::Critical);
        // Recovery on the next sample, no hysteresis.
        assert_eq!(governor.record_sample(10 * MB), MemoryHealthState::Healthy);
    }

    #[test]
    fn test_admission_flags_follow_state() {
        let governor = governor();
        governor.record_sample(10 * MB);
        assert!(governor.should_accept_cache_writes());
        assert!(governor.should_allow_image_ops());

        governor.record_sample(80 * MB);
        assert!(governor.should_accept_cache_writes());

        governor.record_sample(99 * MB);
        assert!(!governor.should_accept_cache_writes());
        assert!(!governor.should_allow_image_ops());
    }

    #[test]
    fn test_trend_detection() {
        let governor = governor();
        for i in 0..8u64 {
            governor.record_sample(10 * MB + i * 5 * MB);
        }
        assert_eq!(governor.trend(), MemoryTrend::Increasing);

        let governor = self::governor();
        for i in 0..8u64 {
            governor.record_sample(80 * MB - i * 5 * MB);
        }
        assert_eq!(governor.trend(), MemoryTrend::Decreasing);

        let governor = self::governor();
        for _ in 0..8 {
            governor.record_sample(50 * MB);
        }
        assert_eq!(governor.trend(), MemoryTrend::Stable);
    }

    #[test]
    fn test_history_is_bounded() {
        let governor = governor();
        for _ in 0..100 {
            governor.record_sample(10 * MB);
        }
        let len = governor
            .history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len();
        assert!(len <= MemoryConfig::default().history_len);
    }

    #[test]
    fn test_report_carries_latest_sample() {
        let governor = governor();
        governor.record_sample(42 * MB);
        let report = governor.health_report();
        assert_eq!(report.rss_bytes, 42 * MB);
        assert_eq!(report.budget_bytes, 100 * MB);
        assert_eq!(report.state, MemoryHealthState::Healthy);
    }
}
