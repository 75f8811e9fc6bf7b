use std::collections::HashSet;
use std::env;
use std::path::{Component, Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

/// Priority class of a directory. Applications always outrank resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Application,
    Resource,
}

impl Category {
    /// Numeric priority shown in reports (1 = highest).
    pub fn priority(self) -> u8 {
        match self {
            Category::Application => 1,
            Category::Resource => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Application => "app",
            Category::Resource => "resource",
        }
    }
}

/// A directory eligible for locking. Identity is the normalized absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    path: PathBuf,
    category: Category,
    size_bytes: Option<u64>,
}

impl Candidate {
    pub fn new(path: PathBuf, category: Category) -> Self {
        Self { path, category, size_bytes: None }
    }

    /// Freezes the probed size into a new value. A size is only ever set once.
    pub fn with_size(self, size_bytes: u64) -> Self {
        debug_assert!(self.size_bytes.is_none(), "size already probed for {}", self.path.display());
        Self { size_bytes: Some(size_bytes), ..self }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }
}

/// Ordered, duplicate-free candidate list: applications first, then resources,
/// each group in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    entries: Vec<Candidate>,
    duplicates_removed: usize,
}

impl CandidateSet {
    /// Builds the set relative to the process working directory.
    pub fn build<A, R>(app_dirs: A, resource_dirs: R) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<Path>,
        R: IntoIterator,
        R::Item: AsRef<Path>,
    {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::build_in(&cwd, app_dirs, resource_dirs)
    }

    /// Builds the set resolving relative entries against `cwd`.
    pub fn build_in<A, R>(cwd: &Path, app_dirs: A, resource_dirs: R) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<Path>,
        R: IntoIterator,
        R::Item: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut total = 0usize;

        let tagged = app_dirs
            .into_iter()
            .map(|p| (normalize_path(p.as_ref(), cwd), Category::Application))
            .chain(
                resource_dirs
                    .into_iter()
                    .map(|p| (normalize_path(p.as_ref(), cwd), Category::Resource)),
            );

        for (path, category) in tagged {
            total += 1;
            if seen.insert(path.clone()) {
                debug!("Candidate [{}] {}", category.label(), path.display());
                entries.push(Candidate::new(path, category));
            } else {
                debug!("Duplicate directory dropped: {}", path.display());
            }
        }

        let duplicates_removed = total - entries.len();
        if duplicates_removed > 0 {
            info!("Removed {} duplicate directories", duplicates_removed);
        }

        Self { entries, duplicates_removed }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.entries.iter()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }

    /// Position of `path` in set order, used to restore deterministic report ordering.
    pub fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|c| c.path == path)
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Lexical normalization: absolute against `cwd`, `.` dropped, `..` folded,
/// trailing separators stripped. Symlinks are not touched.
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };

    let mut out = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
