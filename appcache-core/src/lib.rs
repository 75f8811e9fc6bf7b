//! AppCache Core: the budget-constrained preload orchestrator.
//!
//! Pipeline, leaf first: [`candidate`] builds the ordered, de-duplicated directory list,
//! [`probe`] sizes each entry, [`budget`] picks what fits in memory, [`executor`] locks
//! the selection through the external tool, and [`shutdown`] wraps the executor so a
//! termination signal drains in-flight work instead of abandoning it.

pub mod budget;
pub mod candidate;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod shutdown;

pub use budget::{select, Budget, Selection};
pub use candidate::{Candidate, CandidateSet, Category};
pub use error::{BudgetError, ProbeError};
pub use executor::{ExecutorConfig, LockExecutor, LockTool};
pub use orchestrator::{Orchestrator, Plan};
pub use probe::{DiskUsageProbe, Probed, SizeProbe};
pub use report::{format_size, LockOutcome, LockStatus, RunReport, SkipReason};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
