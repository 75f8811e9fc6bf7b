//! Plain-text input lists: one entry per line, `#` comments and blank lines ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// File name of the application command list inside the config directory.
pub const APP_COMMANDS_FILE: &str = "app_commands";
/// File name of the resource directory list inside the config directory.
pub const RESOURCE_DIRS_FILE: &str = "resource_dirs";

#[derive(Error, Debug)]
pub enum ListError {
    #[error("Configuration file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ListError {
    pub fn path(&self) -> &Path {
        match self {
            ListError::Missing(path) => path,
            ListError::Unreadable { path, .. } => path,
        }
    }
}

/// Extracts entries from list text. Lines are trimmed before the comment check.
pub fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_list(path: &Path) -> Result<Vec<String>, ListError> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ListError::Missing(path.to_path_buf()),
        _ => ListError::Unreadable { path: path.to_path_buf(), source },
    })?;

    let entries = parse_list(&text);
    debug!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// The two input lists read from a config directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLists {
    pub app_commands: Vec<String>,
    pub resource_dirs: Vec<String>,
}

impl ConfigLists {
    /// Loads both lists. Either file being absent or unreadable is fatal for the run.
    pub fn load(config_dir: &Path) -> Result<Self, ListError> {
        Ok(Self {
            app_commands: load_list(&config_dir.join(APP_COMMANDS_FILE))?,
            resource_dirs: load_list(&config_dir.join(RESOURCE_DIRS_FILE))?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.app_commands.is_empty() && self.resource_dirs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_comments_and_blanks() {
        let text = "# editors\nfirefox\n\n   \n  code  \n#gimp\n  # indented comment\n/opt/tool\n";
        assert_eq!(parse_list(text), vec!["firefox", "code", "/opt/tool"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_load_both_lists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_COMMANDS_FILE), "alpha\nbeta\n").unwrap();
        fs::write(dir.path().join(RESOURCE_DIRS_FILE), "# none yet\n").unwrap();

        let lists = ConfigLists::load(dir.path()).unwrap();
        assert_eq!(lists.app_commands, vec!["alpha", "beta"]);
        assert!(lists.resource_dirs.is_empty());
        assert!(!lists.is_empty());
    }

    #[test]
    fn test_missing_list_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_COMMANDS_FILE), "alpha\n").unwrap();

        let err = ConfigLists::load(dir.path()).unwrap_err();
        assert!(matches!(err, ListError::Missing(_)));
        assert_eq!(err.path(), dir.path().join(RESOURCE_DIRS_FILE));
    }

    #[test]
    fn test_directory_in_place_of_list_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(APP_COMMANDS_FILE)).unwrap();

        let err = load_list(&dir.path().join(APP_COMMANDS_FILE)).unwrap_err();
        assert!(matches!(err, ListError::Unreadable { .. }));
    }
}
