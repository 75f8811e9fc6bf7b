//! BudgetSelector: first-fit greedy fill of the memory budget in candidate order.

use log::debug;
use serde::Serialize;

use crate::candidate::Candidate;
use crate::error::{BudgetError, ProbeError};
use crate::probe::Probed;
use crate::report::{format_size, LockOutcome, SkipReason};

/// Share of system memory the run may lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Budget {
    total_system_memory_bytes: u64,
    limit_percent: u8,
}

impl Budget {
    pub fn new(total_system_memory_bytes: u64, limit_percent: u8) -> Result<Self, BudgetError> {
        if !(1..=100).contains(&limit_percent) {
            return Err(BudgetError::InvalidPercent(limit_percent));
        }
        Ok(Self { total_system_memory_bytes, limit_percent })
    }

    pub fn total_system_memory_bytes(&self) -> u64 {
        self.total_system_memory_bytes
    }

    pub fn limit_percent(&self) -> u8 {
        self.limit_percent
    }

    /// `total * percent / 100`, computed without overflow.
    pub fn limit_bytes(&self) -> u64 {
        (self.total_system_memory_bytes as u128 * self.limit_percent as u128 / 100) as u64
    }
}

/// The candidates chosen for locking, plus every candidate that was passed over.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub included: Vec<Candidate>,
    pub skipped: Vec<LockOutcome>,
    pub limit_bytes: u64,
    pub total_bytes: u64,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.included.len()
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.total_bytes)
    }
}

/// Walks `probed` in order and includes each candidate whose size still fits.
///
/// A candidate that does not fit is skipped and evaluation continues, so a later,
/// smaller directory can still use the remaining space. Unsized candidates are always
/// skipped; a probe cancelled by shutdown is reported as a shutdown skip. A zero limit
/// selects nothing.
pub fn select(probed: &[Probed], limit_bytes: u64) -> Selection {
    let mut included = Vec::new();
    let mut skipped = Vec::new();
    let mut running = 0u64;

    for entry in probed {
        let candidate = entry.candidate.clone();

        let size = match candidate.size_bytes() {
            Some(size) => size,
            None => {
                let detail = entry
                    .failure
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "size unknown".to_string());
                let reason = match entry.failure {
                    Some(ProbeError::Cancelled(_)) => SkipReason::ShutdownRequested,
                    _ => SkipReason::ProbeFailed,
                };
                debug!("SKIPPED   {:>10}  {} ({})", "?", candidate.path().display(), detail);
                skipped.push(LockOutcome::skipped(candidate, reason, detail));
                continue;
            }
        };

        let fits = limit_bytes > 0
            && running.checked_add(size).map_or(false, |next| next <= limit_bytes);

        if fits {
            running += size;
            debug!("SELECTED  {:>10}  {}", format_size(size), candidate.path().display());
            included.push(candidate);
        } else {
            debug!(
                "SKIPPED   {:>10}  {} (remaining {})",
                format_size(size),
                candidate.path().display(),
                format_size(limit_bytes.saturating_sub(running))
            );
            skipped.push(LockOutcome::skipped(candidate, SkipReason::BudgetExceeded, "budget exceeded"));
        }
    }

    Selection { included, skipped, limit_bytes, total_bytes: running }
}
