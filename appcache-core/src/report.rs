//! Lock outcomes and the end-of-run report.

use std::time::Duration;

use serde::Serialize;

use crate::candidate::{Candidate, CandidateSet};

/// Why a candidate never reached the lock tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ProbeFailed,
    BudgetExceeded,
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Locked,
    Failed,
    TimedOut,
    Skipped(SkipReason),
}

impl LockStatus {
    pub fn label(self) -> &'static str {
        match self {
            LockStatus::Locked => "LOCKED",
            LockStatus::Failed => "FAILED",
            LockStatus::TimedOut => "TIMEOUT",
            LockStatus::Skipped(_) => "SKIPPED",
        }
    }
}

/// Result of one attempted candidate. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockOutcome {
    pub candidate: Candidate,
    pub status: LockStatus,
    pub duration_ms: u64,
    pub error_detail: Option<String>,
}

impl LockOutcome {
    pub fn locked(candidate: Candidate, elapsed: Duration) -> Self {
        Self::new(candidate, LockStatus::Locked, elapsed, None)
    }

    pub fn failed(candidate: Candidate, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self::new(candidate, LockStatus::Failed, elapsed, Some(detail.into()))
    }

    pub fn timed_out(candidate: Candidate, elapsed: Duration, detail: impl Into<String>) -> Self {
        Self::new(candidate, LockStatus::TimedOut, elapsed, Some(detail.into()))
    }

    pub fn skipped(candidate: Candidate, reason: SkipReason, detail: impl Into<String>) -> Self {
        Self::new(candidate, LockStatus::Skipped(reason), Duration::ZERO, Some(detail.into()))
    }

    fn new(candidate: Candidate, status: LockStatus, elapsed: Duration, error_detail: Option<String>) -> Self {
        Self {
            candidate,
            status,
            duration_ms: elapsed.as_millis() as u64,
            error_detail,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub locked: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

/// All outcomes of one preload run, re-sorted into candidate order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<LockOutcome>,
    pub limit_bytes: u64,
    pub selected_bytes: u64,
    pub selected_count: usize,
    pub interrupted: bool,
}

impl RunReport {
    pub fn new(
        order: &CandidateSet,
        mut outcomes: Vec<LockOutcome>,
        limit_bytes: u64,
        selected_bytes: u64,
        selected_count: usize,
        interrupted: bool,
    ) -> Self {
        outcomes.sort_by_key(|o| order.position(o.candidate.path()).unwrap_or(usize::MAX));
        Self { outcomes, limit_bytes, selected_bytes, selected_count, interrupted }
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                LockStatus::Locked => counts.locked += 1,
                LockStatus::Failed => counts.failed += 1,
                LockStatus::TimedOut => counts.timed_out += 1,
                LockStatus::Skipped(_) => counts.skipped += 1,
            }
        }
        counts
    }

    /// Bytes handed to the lock tool that it reported as locked.
    pub fn locked_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.status == LockStatus::Locked)
            .filter_map(|o| o.candidate.size_bytes())
            .sum()
    }

    /// True when there was something to lock and every selected candidate got locked.
    pub fn is_success(&self) -> bool {
        self.selected_count > 0 && self.counts().locked == self.selected_count
    }
}

/// Human-readable size with binary units, e.g. `1.5 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}
