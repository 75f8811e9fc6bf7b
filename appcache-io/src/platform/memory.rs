use log::{debug, warn};
use sysinfo::System;

/// Point-in-time view of system memory, in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    /// Used memory as a percentage of total.
    pub percent: f64,
}

impl MemoryInfo {
    /// Samples the current memory configuration of the host.
    pub fn sample() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let info = Self::from_parts(
            sys.total_memory(),
            sys.available_memory(),
            sys.used_memory(),
            sys.free_memory(),
        );

        debug!(
            "Memory Discovery: {:.2} GB RAM total ({:.2} GB available, {:.1}% used).",
            info.total as f64 / 1e9,
            info.available as f64 / 1e9,
            info.percent
        );

        if info.total == 0 {
            warn!("Failed to detect total system memory. Every directory will be skipped.");
        }

        info
    }

    pub fn from_parts(total: u64, available: u64, used: u64, free: u64) -> Self {
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self { total, available, used, free, percent }
    }

    /// Memory growth between two samples. Negative when the page cache shrank.
    pub fn used_delta(&self, later: &MemoryInfo) -> i128 {
        later.used as i128 - self.used as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_reports_total_memory() {
        let info = MemoryInfo::sample();
        assert!(info.total > 0);
        assert!(info.used <= info.total);
        assert!((0.0..=100.0).contains(&info.percent));
    }

    #[test]
    fn test_percent_and_delta() {
        let before = MemoryInfo::from_parts(1000, 600, 400, 500);
        assert!((before.percent - 40.0).abs() < f64::EPSILON);

        let after = MemoryInfo::from_parts(1000, 300, 700, 200);
        assert_eq!(before.used_delta(&after), 300);
        assert_eq!(after.used_delta(&before), -300);

        assert_eq!(MemoryInfo::from_parts(0, 0, 0, 0).percent, 0.0);
    }
}
