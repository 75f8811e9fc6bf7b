//! SizeProbe: recursive apparent size of a directory tree.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::candidate::{Candidate, CandidateSet};
use crate::error::ProbeError;
use crate::report::format_size;
use crate::shutdown::{reached, ShutdownCoordinator, ShutdownPhase};

/// Computes the on-disk size of a candidate directory.
///
/// Implementations are blocking; [`probe_all`] moves them onto the blocking pool
/// and bounds each call with a timeout.
pub trait SizeProbe: Send + Sync {
    fn size(&self, path: &Path) -> Result<u64, ProbeError>;
}

/// Sums apparent file sizes under a path without following symlinks below the root.
///
/// Entries that vanish or cannot be read mid-walk are skipped; only a failure on the
/// root itself fails the probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskUsageProbe;

impl SizeProbe for DiskUsageProbe {
    fn size(&self, path: &Path) -> Result<u64, ProbeError> {
        let root = fs::metadata(path).map_err(|e| ProbeError::from_io(path, e))?;
        if root.is_file() {
            return Ok(root.len());
        }

        let mut total = 0u64;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"));
                    return Err(ProbeError::from_io(path, source));
                }
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", path.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() {
                match entry.metadata() {
                    Ok(meta) => total += meta.len(),
                    Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
                }
            }
        }
        Ok(total)
    }
}

/// A candidate after probing: sized on success, unsized with the reason on failure.
#[derive(Debug)]
pub struct Probed {
    pub candidate: Candidate,
    pub failure: Option<ProbeError>,
}

impl Probed {
    pub fn sized(candidate: Candidate, size_bytes: u64) -> Self {
        Self { candidate: candidate.with_size(size_bytes), failure: None }
    }

    pub fn failed(candidate: Candidate, failure: ProbeError) -> Self {
        Self { candidate, failure: Some(failure) }
    }
}

/// Probes every candidate concurrently (at most `concurrency` at a time), each bounded by
/// `timeout`. Results come back in set order; one failure never stops the others.
///
/// Once `shutdown` leaves `Running`, waiting probes never start and running ones stop being
/// awaited; both come back as [`ProbeError::Cancelled`]. An abandoned walk keeps its blocking
/// thread until it returns, so the caller's runtime must not wait for blocking tasks on exit.
pub async fn probe_all(
    set: &CandidateSet,
    probe: Arc<dyn SizeProbe>,
    timeout: Duration,
    concurrency: usize,
    shutdown: &ShutdownCoordinator,
) -> Vec<Probed> {
    let slots = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(set.len());

    for candidate in set {
        let candidate = candidate.clone();
        let probe = probe.clone();
        let slots = slots.clone();
        let mut phase = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            let path = candidate.path().to_path_buf();
            let cancelled = || ProbeError::Cancelled(candidate.path().to_path_buf());

            let result = tokio::select! {
                biased;
                _ = reached(&mut phase, ShutdownPhase::ShutdownRequested) => Err(cancelled()),
                permit = slots.acquire_owned() => {
                    let _permit = permit.ok();
                    let job = tokio::task::spawn_blocking(move || probe.size(&path));
                    tokio::select! {
                        biased;
                        _ = reached(&mut phase, ShutdownPhase::ShutdownRequested) => Err(cancelled()),
                        joined = tokio::time::timeout(timeout, job) => match joined {
                            Ok(Ok(result)) => result,
                            Ok(Err(_)) => Err(ProbeError::Aborted(candidate.path().to_path_buf())),
                            Err(_) => Err(ProbeError::TimedOut {
                                path: candidate.path().to_path_buf(),
                                after: timeout,
                            }),
                        },
                    }
                }
            };

            match result {
                Ok(bytes) => {
                    debug!("{:>10}  |  {}", format_size(bytes), candidate.path().display());
                    Probed::sized(candidate, bytes)
                }
                Err(e @ ProbeError::Cancelled(_)) => {
                    debug!("{}", e);
                    Probed::failed(candidate, e)
                }
                Err(e) => {
                    warn!("Could not calculate size for {}: {}", candidate.path().display(), e);
                    Probed::failed(candidate, e)
                }
            }
        }));
    }

    let mut probed = Vec::with_capacity(handles.len());
    for (handle, candidate) in handles.into_iter().zip(set.iter()) {
        match handle.await {
            Ok(p) => probed.push(p),
            Err(_) => probed.push(Probed::failed(
                candidate.clone(),
                ProbeError::Aborted(candidate.path().to_path_buf()),
            )),
        }
    }
    probed
}
