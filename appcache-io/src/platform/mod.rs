pub mod memory;

use nix::unistd::geteuid;

/// Returns true when the process runs with an effective UID of 0.
///
/// # Logic
/// The lock tool needs `CAP_IPC_LOCK` (or a generous `ulimit -l`) to pin pages.
/// Without root we route it through `sudo`, so callers decide the invocation from this.
pub fn is_root() -> bool {
    geteuid().is_root()
}
