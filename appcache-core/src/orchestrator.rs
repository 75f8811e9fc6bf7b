//! The two pipelines the CLI exposes: `verify-sizes` (plan only) and `preload` (plan + lock).

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::budget::{select, Budget, Selection};
use crate::candidate::{Candidate, CandidateSet};
use crate::executor::LockExecutor;
use crate::probe::{probe_all, SizeProbe};
use crate::report::{format_size, RunReport};
use crate::shutdown::ShutdownCoordinator;

/// Sized candidates and the budget decision for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    #[serde(skip)]
    pub order: CandidateSet,
    pub budget: Budget,
    pub candidates: Vec<Candidate>,
    pub selection: Selection,
}

impl Plan {
    pub fn found(&self) -> usize {
        self.candidates.len()
    }

    pub fn selected(&self) -> usize {
        self.selection.len()
    }

    pub fn skipped(&self) -> usize {
        self.found() - self.selected()
    }
}

pub struct Orchestrator {
    probe: Arc<dyn SizeProbe>,
    executor: LockExecutor,
}

impl Orchestrator {
    pub fn new(probe: Arc<dyn SizeProbe>, executor: LockExecutor) -> Self {
        Self { probe, executor }
    }

    /// Turns the configured lists into a candidate set.
    ///
    /// `resolve` maps a command to the directory of its executable; commands it cannot
    /// resolve never become candidates.
    pub fn gather<R>(app_commands: &[String], resource_dirs: &[String], mut resolve: R) -> CandidateSet
    where
        R: FnMut(&str) -> Option<PathBuf>,
    {
        let app_dirs: Vec<PathBuf> = app_commands.iter().filter_map(|cmd| resolve(cmd)).collect();
        debug!("{} of {} application commands resolved", app_dirs.len(), app_commands.len());
        CandidateSet::build(app_dirs, resource_dirs)
    }

    /// Sizes every candidate and applies the budget. Nothing is locked.
    ///
    /// A shutdown request cancels the remaining probes; those candidates are skipped.
    pub async fn plan(&self, order: CandidateSet, budget: Budget, shutdown: &ShutdownCoordinator) -> Plan {
        let config = self.executor.config();
        info!("Analyzing directory sizes and priorities...");
        let probed = probe_all(
            &order,
            self.probe.clone(),
            config.per_op_timeout,
            config.max_workers,
            shutdown,
        )
        .await;

        let limit = budget.limit_bytes();
        info!(
            "Selecting directories within memory limit: {} ({}% of {})",
            format_size(limit),
            budget.limit_percent(),
            format_size(budget.total_system_memory_bytes())
        );
        let selection = select(&probed, limit);
        info!(
            "Selected: {} directories, Total size: {}",
            selection.len(),
            format_size(selection.total_bytes)
        );

        let candidates = probed.into_iter().map(|p| p.candidate).collect();
        Plan { order, budget, candidates, selection }
    }

    /// Locks the plan's selection and folds every outcome into one ordered report.
    pub async fn preload(&self, plan: &Plan, shutdown: &ShutdownCoordinator) -> RunReport {
        let selection = &plan.selection;
        let mut outcomes = selection.skipped.clone();

        if !selection.is_empty() {
            info!("Locking {} directories into memory...", selection.len());
            outcomes.extend(self.executor.run(&selection.included, shutdown).await);
        }

        RunReport::new(
            &plan.order,
            outcomes,
            selection.limit_bytes,
            selection.total_bytes,
            selection.len(),
            shutdown.is_shutting_down(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::executor::{ExecutorConfig, LockTool};
    use crate::report::{LockStatus, SkipReason};
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    struct FixedSizes(HashMap<PathBuf, u64>);

    impl SizeProbe for FixedSizes {
        fn size(&self, path: &Path) -> Result<u64, ProbeError> {
            self.0
                .get(path)
                .copied()
                .ok_or_else(|| ProbeError::NotFound(path.to_path_buf()))
        }
    }

    fn orchestrator(sizes: &[(&str, u64)], script: &str) -> Orchestrator {
        let sizes = sizes.iter().map(|(p, s)| (PathBuf::from(p), *s)).collect();
        let tool = LockTool::new("sh", ["-c", script, "lock-tool"]);
        let config = ExecutorConfig {
            max_workers: 2,
            per_op_timeout: Duration::from_secs(5),
            drain_grace: Duration::from_secs(1),
        };
        Orchestrator::new(Arc::new(FixedSizes(sizes)), LockExecutor::new(tool, config))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn resolve(cmd: &str) -> Option<PathBuf> {
        match cmd {
            "alpha" => Some(PathBuf::from("/bin")),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_preload_scenario_apps_first_and_budget() {
        let orch = orchestrator(&[("/bin", 100 * MB), ("/data/shared", 300 * MB)], "exit 0");
        let set = Orchestrator::gather(&strings(&["alpha", "beta"]), &strings(&["/data/shared"]), resolve);
        assert_eq!(set.len(), 2);

        // 50% of 700MB = 350MB
        let plan = orch.plan(set, Budget::new(700 * MB, 50).unwrap(), &ShutdownCoordinator::new()).await;
        assert_eq!(plan.found(), 2);
        assert_eq!(plan.selected(), 1);
        assert_eq!(plan.selection.included[0].path(), Path::new("/bin"));

        let report = orch.preload(&plan, &ShutdownCoordinator::new()).await;
        let statuses: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.candidate.path().to_str().unwrap(), o.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("/bin", LockStatus::Locked),
                ("/data/shared", LockStatus::Skipped(SkipReason::BudgetExceeded)),
            ]
        );
        assert!(report.is_success());
        assert_eq!(report.locked_bytes(), 100 * MB);
        assert!(!report.interrupted);
    }

    #[tokio::test]
    async fn test_zero_budget_skips_everything() {
        let orch = orchestrator(&[("/bin", 10), ("/data", 0)], "exit 0");
        let set = Orchestrator::gather(&strings(&["alpha"]), &strings(&["/data"]), resolve);

        let plan = orch.plan(set, Budget::new(99, 1).unwrap(), &ShutdownCoordinator::new()).await;
        assert_eq!(plan.selection.limit_bytes, 0);
        assert_eq!(plan.selected(), 0);

        let report = orch.preload(&plan, &ShutdownCoordinator::new()).await;
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| matches!(o.status, LockStatus::Skipped(_))));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_probe_failure_and_lock_failure_are_reported_per_candidate() {
        let orch = orchestrator(&[("/bin", 10), ("/data/b", 10)], r#"[ "$1" = /bin ] || exit 2"#);
        let set = Orchestrator::gather(&strings(&["alpha"]), &strings(&["/data/a", "/data/b"]), resolve);

        let plan = orch.plan(set, Budget::new(1000, 100).unwrap(), &ShutdownCoordinator::new()).await;
        let report = orch.preload(&plan, &ShutdownCoordinator::new()).await;

        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                LockStatus::Locked,
                LockStatus::Skipped(SkipReason::ProbeFailed),
                LockStatus::Failed,
            ]
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_planning_is_idempotent() {
        let orch = orchestrator(&[("/bin", 40), ("/r1", 70), ("/r2", 20)], "exit 0");
        let lists = (strings(&["alpha"]), strings(&["/r1", "/r2"]));
        let budget = Budget::new(200, 50).unwrap();

        let idle = ShutdownCoordinator::new();

        let first = orch.plan(Orchestrator::gather(&lists.0, &lists.1, resolve), budget, &idle).await;
        let second = orch.plan(Orchestrator::gather(&lists.0, &lists.1, resolve), budget, &idle).await;
        assert_eq!(first.selection.included, second.selection.included);
        assert_eq!(first.selection.total_bytes, 60);
    }

    #[tokio::test]
    async fn test_shutdown_mid_run_still_yields_ordered_partial_report() {
        let sizes = [("/bin", 10), ("/data/big", 10_000), ("/data/a", 10), ("/data/b", 10)];
        let orch = orchestrator(&sizes, "exec sleep 30");
        let set = Orchestrator::gather(
            &strings(&["alpha"]),
            &strings(&["/data/big", "/data/a", "/data/b"]),
            resolve,
        );

        let shutdown = ShutdownCoordinator::new();
        let plan = orch.plan(set, Budget::new(1000, 100).unwrap(), &shutdown).await;
        assert_eq!(plan.selected(), 3);

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.signal();
        });
        let report = orch.preload(&plan, &shutdown).await;

        assert!(report.interrupted);
        let rows: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.candidate.path().to_str().unwrap(), o.status, o.error_detail.as_deref()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("/bin", LockStatus::Failed, Some("interrupted by shutdown request")),
                ("/data/big", LockStatus::Skipped(SkipReason::BudgetExceeded), Some("budget exceeded")),
                ("/data/a", LockStatus::Failed, Some("interrupted by shutdown request")),
                ("/data/b", LockStatus::Skipped(SkipReason::ShutdownRequested), Some("shutdown requested")),
            ]
        );
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_shutdown_before_planning_skips_everything() {
        let orch = orchestrator(&[("/bin", 10), ("/data", 10)], "exit 0");
        let set = Orchestrator::gather(&strings(&["alpha"]), &strings(&["/data"]), resolve);
        let shutdown = ShutdownCoordinator::new();
        shutdown.signal();

        let plan = orch.plan(set, Budget::new(1000, 100).unwrap(), &shutdown).await;
        assert_eq!(plan.selected(), 0);

        let report = orch.preload(&plan, &shutdown).await;
        assert!(report.interrupted);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == LockStatus::Skipped(SkipReason::ShutdownRequested)));
    }
}
