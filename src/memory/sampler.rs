//! Process memory sampling
//!
//! The governor only needs a resident-set reading in bytes; the trait
//! keeps the `sysinfo` dependency at the edge so tests can drive the
//! governor with synthetic samples.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

/// Source of resident-memory readings for the pressure governor
pub trait MemorySampler: Send {
    /// Current resident set size in bytes, or `None` if the process
    /// could not be sampled.
    fn sample_rss_bytes(&mut self) -> Option<u64>;
}

/// `sysinfo`-backed sampler for the current process
pub struct SysinfoSampler {
    system: System,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn sample_rss_bytes(&mut self) -> Option<u64> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        match self.system.process(self.pid) {
            Some(process) => Some(process.memory()),
            None => {
                warn!("Could not sample memory for pid {}", self.pid);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_reads_own_process() {
        let mut sampler = SysinfoSampler::new();
        let rss = sampler.sample_rss_bytes();
        assert!(rss.is_some());
        assert!(rss.unwrap() > 0);
    }
}
