//! Default values for configuration fields

use std::time::Duration;

pub fn default_attempt_timeout() -> Duration {
    Duration::from_secs(4)
}

pub fn default_prewarm_attempt_timeout() -> Duration {
    Duration::from_millis(1500)
}

pub fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

pub fn default_max_concurrent_persists() -> usize {
    8
}

pub fn default_fetch_result_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

pub fn default_verdict_ttl() -> Duration {
    // Verdicts are keyed by content hash and are immutable facts about
    // specific bytes, so they can outlive fetch results by a wide margin.
    Duration::from_secs(24 * 60 * 60)
}

pub fn default_brightness_ttl() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

pub fn default_inverted_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

pub fn default_max_entries_per_namespace() -> usize {
    512
}

pub fn default_inverted_capacity() -> usize {
    128
}

pub fn default_coalescer_capacity() -> usize {
    64
}

pub fn default_memory_budget_mb() -> u64 {
    512
}

pub fn default_warning_ratio() -> f64 {
    0.75
}

pub fn default_critical_ratio() -> f64 {
    0.90
}

pub fn default_sample_interval() -> Duration {
    Duration::from_secs(10)
}

pub fn default_history_len() -> usize {
    12
}
