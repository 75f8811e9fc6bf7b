use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Why a directory could not be sized. The candidate is skipped, the run goes on.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("directory does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("I/O error while sizing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("size probe of {} did not finish within {after:?}", path.display())]
    TimedOut { path: PathBuf, after: Duration },
    #[error("size probe of {} was aborted", .0.display())]
    Aborted(PathBuf),
    #[error("size probe of {} cancelled by shutdown request", .0.display())]
    Cancelled(PathBuf),
}

impl ProbeError {
    /// Classifies an I/O error raised on the probe root.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ProbeError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(path.to_path_buf()),
            _ => ProbeError::Io { path: path.to_path_buf(), source },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    #[error("memory limit must be between 1 and 100 percent, got {0}")]
    InvalidPercent(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified() {
        let p = Path::new("/srv/data");
        let nf = ProbeError::from_io(p, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(nf, ProbeError::NotFound(ref x) if x == p));

        let pd = ProbeError::from_io(p, io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(pd.to_string(), "permission denied: /srv/data");

        let other = ProbeError::from_io(p, io::Error::new(io::ErrorKind::Other, "stale handle"));
        assert!(matches!(other, ProbeError::Io { .. }));
    }
}
