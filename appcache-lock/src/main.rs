use std::env;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use appcache_core::{
    Budget, CandidateSet, DiskUsageProbe, LockExecutor, LockTool, Orchestrator, Plan, RunReport,
    ShutdownCoordinator,
};
use appcache_io::lists::{APP_COMMANDS_FILE, RESOURCE_DIRS_FILE};
use appcache_io::{find_in_path, is_root, resolve_command_dir, ConfigLists, MemoryInfo};

mod config;
mod lifecycle;
mod summary;

use config::{Args, Command, PreloadArgs};
use lifecycle::{LifecycleManager, ServiceLayout};

/// Lock failures, cancellations, empty selections, missing tools.
const EXIT_FAILURE: u8 = 1;
/// A required input list is absent or unreadable.
const EXIT_CONFIG_MISSING: u8 = 3;

/// How long exit waits on blocking work still running, e.g. a walk of a stalled mount.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match &args.command {
        Command::Preload(opts) => block_on(preload(&args, opts)).and_then(|r| r),
        Command::VerifySizes => block_on(verify_sizes(&args)).and_then(|r| r),
        Command::Install => LifecycleManager::new(ServiceLayout::default())
            .install(&args.config_dir)
            .map(|_| ExitCode::SUCCESS),
        Command::Uninstall => LifecycleManager::new(ServiceLayout::default())
            .uninstall()
            .map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Runs `future` on a fresh runtime, then shuts the runtime down without waiting
/// longer than [`RUNTIME_SHUTDOWN`] for blocking tasks.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    Ok(output)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "warn,appcache_core=debug,appcache_io=debug,appcache_lock=debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

/// Everything both pipelines need before sizing starts.
struct Prepared {
    memory: MemoryInfo,
    budget: Budget,
    order: CandidateSet,
}

/// Loads the lists, samples memory and builds the candidate set.
/// `Err` carries the exit code for an early, already-logged stop.
fn prepare(args: &Args) -> Result<Result<Prepared, ExitCode>> {
    let lists = match ConfigLists::load(&args.config_dir) {
        Ok(lists) => lists,
        Err(e) => {
            let dir = e.path().parent().unwrap_or(args.config_dir.as_path());
            error!(
                "{}; both {} and {} are required in {}",
                e,
                APP_COMMANDS_FILE,
                RESOURCE_DIRS_FILE,
                dir.display()
            );
            return Ok(Err(ExitCode::from(EXIT_CONFIG_MISSING)));
        }
    };
    if lists.is_empty() {
        error!("No applications or resource directories configured");
        return Ok(Err(ExitCode::from(EXIT_FAILURE)));
    }

    let memory = MemoryInfo::sample();
    let budget = Budget::new(memory.total, args.memory_limit)?;

    let order = Orchestrator::gather(&lists.app_commands, &lists.resource_dirs, resolve_command_dir);
    if order.is_empty() {
        error!("No valid directories found");
        return Ok(Err(ExitCode::from(EXIT_FAILURE)));
    }

    Ok(Ok(Prepared { memory, budget, order }))
}

fn orchestrator(args: &Args, tool: LockTool, grace_secs: u64) -> Orchestrator {
    Orchestrator::new(Arc::new(DiskUsageProbe), LockExecutor::new(tool, args.executor_config(grace_secs)))
}

async fn verify_sizes(args: &Args) -> Result<ExitCode> {
    let prepared = match prepare(args)? {
        Ok(prepared) => prepared,
        Err(code) => return Ok(code),
    };

    let defaults = PreloadArgs::default();
    let plan = orchestrator(args, LockTool::vmtouch(), defaults.grace)
        .plan(prepared.order, prepared.budget, &ShutdownCoordinator::new())
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan).context("Failed to encode plan")?);
    } else {
        print!("{}", summary::analysis_table(&plan));
        println!();
        print!("{}", summary::memory_analysis(&prepared.memory, &plan));
    }

    if plan.skipped() > 0 {
        warn!("{} directories will be skipped due to memory limits", plan.skipped());
    }
    Ok(ExitCode::SUCCESS)
}

async fn preload(args: &Args, opts: &PreloadArgs) -> Result<ExitCode> {
    let tool = match lock_tool(opts) {
        Some(tool) => tool,
        None => return Ok(ExitCode::from(EXIT_FAILURE)),
    };

    // Installed before sizing so an early signal cancels the remaining probes too.
    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handler().context("Failed to set signal handler")?;

    let prepared = match prepare(args)? {
        Ok(prepared) => prepared,
        Err(code) => return Ok(code),
    };
    let before = prepared.memory;

    let orchestrator = orchestrator(args, tool, opts.grace);
    let plan = orchestrator.plan(prepared.order, prepared.budget, &shutdown).await;
    if plan.selection.is_empty() {
        if !args.json {
            print!("{}", summary::analysis_table(&plan));
        }
        error!("No directories selected within memory limit");
        return Ok(ExitCode::from(EXIT_FAILURE));
    }

    let report = orchestrator.preload(&plan, &shutdown).await;
    let after = MemoryInfo::sample();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to encode report")?);
    } else {
        print_preload_summary(&plan, &report, &before, &after);
    }

    if report.interrupted {
        warn!("Preload interrupted by shutdown request; partial report emitted");
    }
    Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::from(EXIT_FAILURE) })
}

fn print_preload_summary(plan: &Plan, report: &RunReport, before: &MemoryInfo, after: &MemoryInfo) {
    print!("{}", summary::analysis_table(plan));
    println!();
    print!("{}", summary::lock_results(report));
    println!();
    print!("{}", summary::memory_statistics(before, after, plan.budget.limit_percent(), report));
}

/// Resolves the lock tool, wrapping it in `sudo -n` when we are not root.
fn lock_tool(opts: &PreloadArgs) -> Option<LockTool> {
    let path_var = env::var_os("PATH");

    if find_in_path(&opts.lock_tool, path_var.as_deref()).is_none() {
        error!(
            "{} is not installed or not in PATH. Please install it: sudo apt install vmtouch",
            opts.lock_tool
        );
        return None;
    }

    let sudo = !opts.no_sudo && !is_root();
    if sudo && find_in_path("sudo", path_var.as_deref()).is_none() {
        error!("Not running as root and sudo is not available; rerun as root or pass --no-sudo");
        return None;
    }

    let tool = LockTool::new(opts.lock_tool.as_str(), ["-vl"]).with_sudo(sudo);
    if tool.uses_sudo() {
        info!("Not running as root; invoking {} through sudo -n", opts.lock_tool);
    }
    Some(tool)
}
