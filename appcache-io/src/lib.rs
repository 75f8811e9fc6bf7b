//! AppCache I/O: the host-facing layer.
//!
//! Everything that touches the machine outside of the lock pipeline lives here:
//! memory sampling, privilege checks, PATH discovery and the plain-text input lists.

pub mod discovery;
pub mod lists;
pub mod platform;

// Re-exports for easier access by appcache-core and the CLI
pub use discovery::{find_in_path, resolve_command_dir};
pub use lists::{ConfigLists, ListError};
pub use platform::is_root;
pub use platform::memory::MemoryInfo;
