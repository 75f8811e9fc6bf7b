//! Executable discovery: maps an application command to the directory holding its binary.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Looks `command` up the same way a shell would.
///
/// Commands containing a `/` are taken as paths and only checked for being executable.
/// Otherwise every entry of `path_var` is searched in order and the first executable
/// regular file wins.
pub fn find_in_path(command: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }

    if command.contains('/') {
        let candidate = PathBuf::from(command);
        return is_executable(&candidate).then_some(candidate);
    }

    let path_var = path_var?;
    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

/// Resolves `command` through `$PATH`, follows symlinks and returns the parent directory
/// of the real executable. `None` means "not found" and is logged as a warning.
pub fn resolve_command_dir(command: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH");
    let found = match find_in_path(command, path_var.as_deref()) {
        Some(p) => p,
        None => {
            warn!("Command '{}' not found in PATH", command);
            return None;
        }
    };

    let real = match fs::canonicalize(&found) {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not resolve '{}' ({}): {}", command, found.display(), e);
            return None;
        }
    };

    let dir = real.parent()?.to_path_buf();
    debug!("Found '{}' at '{}' -> adding directory: {}", command, real.display(), dir.display());
    Some(dir)
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn write_exe(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_find_in_path_respects_order_and_mode() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        write_exe(&first.path().join("tool"), 0o644);
        write_exe(&second.path().join("tool"), 0o755);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_in_path("tool", Some(&path_var)).unwrap();
        assert_eq!(found, second.path().join("tool"));

        write_exe(&first.path().join("tool"), 0o755);
        let found = find_in_path("tool", Some(&path_var)).unwrap();
        assert_eq!(found, first.path().join("tool"));

        assert!(find_in_path("missing", Some(&path_var)).is_none());
        assert!(find_in_path("tool", None).is_none());
    }

    #[test]
    fn test_find_in_path_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tool")).unwrap();
        let path_var = dir.path().as_os_str().to_owned();
        assert!(find_in_path("tool", Some(&path_var)).is_none());
    }

    #[test]
    fn test_explicit_path_is_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app");
        write_exe(&exe, 0o755);

        let command = exe.to_str().unwrap();
        assert_eq!(find_in_path(command, None), Some(exe.clone()));
    }

    #[test]
    fn test_resolve_follows_symlinks() {
        let real_dir = tempfile::tempdir().unwrap();
        let link_dir = tempfile::tempdir().unwrap();
        let exe = real_dir.path().join("app-alpha");
        write_exe(&exe, 0o755);
        let link = link_dir.path().join("alpha");
        symlink(&exe, &link).unwrap();

        let dir = resolve_command_dir(link.to_str().unwrap()).unwrap();
        assert_eq!(dir, fs::canonicalize(real_dir.path()).unwrap());
    }
}
