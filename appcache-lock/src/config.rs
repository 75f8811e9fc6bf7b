use std::path::PathBuf;
use std::time::Duration;

use appcache_core::ExecutorConfig;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Preload and lock application directories into the page cache")]
pub struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing the app_commands and resource_dirs lists
    #[arg(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,

    /// Maximum percentage of system memory to use for caching
    #[arg(long, global = true, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub memory_limit: u8,

    /// Maximum concurrent lock processes (and size probes)
    #[arg(long, global = true, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_workers: u16,

    /// Timeout for each lock operation and size probe, in seconds
    #[arg(long, global = true, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Print the report as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Preload applications and resources into memory
    Preload(PreloadArgs),
    /// Calculate and display directory sizes against the memory budget
    VerifySizes,
    /// Install as a systemd service
    Install,
    /// Remove the systemd service
    Uninstall,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PreloadArgs {
    /// Seconds a lock process gets to exit after a shutdown request
    #[arg(long, default_value_t = 5)]
    pub grace: u64,

    /// Lock tool program, invoked as `<tool> -vl <dir>`
    #[arg(long, default_value = "vmtouch")]
    pub lock_tool: String,

    /// Never wrap the lock tool in `sudo -n`, even when not running as root
    #[arg(long)]
    pub no_sudo: bool,
}

impl Default for PreloadArgs {
    fn default() -> Self {
        Self { grace: 5, lock_tool: "vmtouch".to_string(), no_sudo: false }
    }
}

impl Args {
    pub fn executor_config(&self, grace_secs: u64) -> ExecutorConfig {
        ExecutorConfig {
            max_workers: self.max_workers as usize,
            per_op_timeout: Duration::from_secs(self.timeout),
            drain_grace: Duration::from_secs(grace_secs),
        }
    }
}
