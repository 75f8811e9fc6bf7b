//! Plain-text report blocks printed to stdout at the end of a run.

use std::fmt::Write as _;

use appcache_core::{format_size, LockStatus, Plan, RunReport};
use appcache_io::MemoryInfo;

const WIDE_RULE: usize = 80;
const NARROW_RULE: usize = 60;

pub fn analysis_table(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "DIRECTORY ANALYSIS:");
    let _ = writeln!(out, "{}", "-".repeat(WIDE_RULE));
    let _ = writeln!(out, "{:<8} {:<8} {:<12} {:<10} {}", "Priority", "Source", "Size", "Status", "Directory");
    let _ = writeln!(out, "{}", "-".repeat(WIDE_RULE));

    for candidate in &plan.candidates {
        let selected = plan.selection.included.iter().any(|c| c.path() == candidate.path());
        let size = candidate.size_bytes().map(format_size).unwrap_or_else(|| "?".to_string());
        let _ = writeln!(
            out,
            "{:<8} {:<8} {:<12} {:<10} {}",
            candidate.category().priority(),
            candidate.category().label(),
            size,
            if selected { "SELECTED" } else { "SKIPPED" },
            candidate.path().display()
        );
    }

    let _ = writeln!(out, "{}", "-".repeat(WIDE_RULE));
    let _ = writeln!(
        out,
        "Selected: {} directories, Total size: {}",
        plan.selected(),
        format_size(plan.selection.total_bytes)
    );
    out
}

/// The `verify-sizes` footer.
pub fn memory_analysis(memory: &MemoryInfo, plan: &Plan) -> String {
    let limit = plan.selection.limit_bytes;
    let mut out = String::new();
    let _ = writeln!(out, "MEMORY ANALYSIS SUMMARY:");
    let _ = writeln!(out, "{}", "=".repeat(NARROW_RULE));
    let _ = writeln!(out, "Total System RAM:     {}", format_size(memory.total));
    let _ = writeln!(out, "Currently Used:       {} ({:.1}%)", format_size(memory.used), memory.percent);
    let _ = writeln!(out, "Available for Cache:  {}", format_size(limit));
    let _ = writeln!(out, "Will be Cached:       {}", format_size(plan.selection.total_bytes));
    let _ = writeln!(out, "Remaining Limit:      {}", format_size(plan.selection.remaining_bytes()));
    let _ = writeln!(out);
    let _ = writeln!(out, "Directories Found:    {}", plan.found());
    let _ = writeln!(out, "Directories Selected: {}", plan.selected());
    let _ = writeln!(out, "Directories Skipped:  {}", plan.skipped());
    let _ = writeln!(out, "{}", "=".repeat(NARROW_RULE));
    out
}

pub fn lock_results(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "LOCK RESULTS:");
    let _ = writeln!(out, "{}", "-".repeat(WIDE_RULE));
    for outcome in &report.outcomes {
        let _ = write!(
            out,
            "{:<10} {:>8}ms  {}",
            outcome.status.label(),
            outcome.duration_ms,
            outcome.candidate.path().display()
        );
        match &outcome.error_detail {
            Some(detail) => {
                let _ = writeln!(out, "  ({})", first_line(detail));
            }
            None => {
                let _ = writeln!(out);
            }
        }
    }
    let _ = writeln!(out, "{}", "-".repeat(WIDE_RULE));

    let counts = report.counts();
    let _ = writeln!(
        out,
        "Locked: {}  Failed: {}  Timed out: {}  Skipped: {}",
        counts.locked, counts.failed, counts.timed_out, counts.skipped
    );
    let _ = writeln!(
        out,
        "Completed: {}/{} directories locked successfully",
        counts.locked, report.selected_count
    );
    if report.interrupted {
        let _ = writeln!(out, "Run interrupted by shutdown request");
    }
    out
}

/// The `preload` footer comparing memory before and after locking.
pub fn memory_statistics(before: &MemoryInfo, after: &MemoryInfo, limit_percent: u8, report: &RunReport) -> String {
    let delta = before.used_delta(after);
    let increase = if delta < 0 {
        format!("-{}", format_size(delta.unsigned_abs().min(u64::MAX as u128) as u64))
    } else {
        format_size(delta.min(u64::MAX as i128) as u64)
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(NARROW_RULE));
    let _ = writeln!(out, "MEMORY STATISTICS");
    let _ = writeln!(out, "{}", "=".repeat(NARROW_RULE));
    let _ = writeln!(out, "Total System RAM:     {}", format_size(before.total));
    let _ = writeln!(
        out,
        "Memory Limit ({}%):{:pad$}{}",
        limit_percent,
        "",
        format_size(report.limit_bytes),
        pad = limit_pad(limit_percent)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "BEFORE CACHING:");
    let _ = writeln!(out, "  Used Memory:        {} ({:.1}%)", format_size(before.used), before.percent);
    let _ = writeln!(out, "  Available Memory:   {}", format_size(before.available));
    let _ = writeln!(out);
    let _ = writeln!(out, "CACHING OPERATION:");
    let _ = writeln!(out, "  Data Selected:      {}", format_size(report.selected_bytes));
    let _ = writeln!(out, "  Data Cached:        {}", format_size(report.locked_bytes()));
    let _ = writeln!(out);
    let _ = writeln!(out, "AFTER CACHING:");
    let _ = writeln!(out, "  Used Memory:        {} ({:.1}%)", format_size(after.used), after.percent);
    let _ = writeln!(out, "  Available Memory:   {}", format_size(after.available));
    let _ = writeln!(out, "  Memory Increase:    {}", increase);
    let _ = writeln!(out, "{}", "=".repeat(NARROW_RULE));
    out
}

// Keeps the value column aligned with the other 22-character labels.
fn limit_pad(limit_percent: u8) -> usize {
    let label = format!("Memory Limit ({}%):", limit_percent);
    22usize.saturating_sub(label.len()).max(1)
}

fn first_line(detail: &str) -> &str {
    detail.lines().next().unwrap_or(detail)
}
