//! Process memory sampling for the analytics loop
//!
//! **Platform support:**
//! - Linux: reads `VmRSS` from /proc/self/status
//! - Elsewhere: no sample, the guard never trips

use tracing::{debug, warn};

/// Trips when resident memory is above the ceiling at a sampling point
#[derive(Debug)]
pub struct MemoryGuard {
    ceiling_bytes: u64,
    interval: usize,
    ticks: usize,
    reclaims: usize,
}

impl MemoryGuard {
    pub fn new(ceiling_mb: u64, interval: usize) -> Self {
        Self {
            ceiling_bytes: ceiling_mb.saturating_mul(1024 * 1024),
            interval: interval.max(1),
            ticks: 0,
            reclaims: 0,
        }
    }

    /// Count one unit of work; every `interval` units sample memory
    ///
    /// Returns true when the caller should drop its scratch state.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        if self.ticks % self.interval != 0 {
            return false;
        }
        match resident_set_bytes() {
            Some(rss) if rss > self.ceiling_bytes => {
                warn!(
                    rss_mb = rss / (1024 * 1024),
                    ceiling_mb = self.ceiling_bytes / (1024 * 1024),
                    "Memory above ceiling, reclaiming scratch caches"
                );
                self.reclaims += 1;
                true
            }
            Some(rss) => {
                debug!(rss_mb = rss / (1024 * 1024), "Memory sample");
                false
            }
            None => false,
        }
    }

    pub fn reclaims(&self) -> usize {
        self.reclaims
    }
}

/// Resident set size of this process in bytes
pub fn resident_set_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// `VmRSS:    123456 kB` → bytes
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tmpmon-sync\nVmPeak:\t  200000 kB\nVmRSS:\t   51200 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(51200 * 1024));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
    }

    #[test]
    fn test_guard_only_samples_on_interval() {
        // Zero ceiling: any successful sample trips
        let mut guard = MemoryGuard::new(0, 3);
        assert!(!guard.tick());
        assert!(!guard.tick());
        let tripped = guard.tick();
        assert_eq!(tripped, resident_set_bytes().is_some());
        assert_eq!(guard.reclaims(), usize::from(tripped));
    }

    #[test]
    fn test_generous_ceiling_never_trips() {
        let mut guard = MemoryGuard::new(u64::MAX / (1024 * 1024), 1);
        for _ in 0..5 {
            assert!(!guard.tick());
        }
        assert_eq!(guard.reclaims(), 0);
    }
}
