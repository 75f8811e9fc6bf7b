use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use appcache_io::lists::{APP_COMMANDS_FILE, RESOURCE_DIRS_FILE};
use appcache_io::is_root;
use log::{info, warn};

pub const SERVICE_NAME: &str = "appcache-lock.service";
const BINARY_NAME: &str = "appcache-lock";

/// Where the installed copy and its unit file live.
#[derive(Debug, Clone)]
pub struct ServiceLayout {
    pub install_dir: PathBuf,
    pub unit_path: PathBuf,
}

impl Default for ServiceLayout {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("/usr/local/lib/appcache-lock"),
            unit_path: PathBuf::from("/etc/systemd/system").join(SERVICE_NAME),
        }
    }
}

pub struct LifecycleManager {
    layout: ServiceLayout,
}

impl LifecycleManager {
    pub fn new(layout: ServiceLayout) -> Self {
        Self { layout }
    }

    pub fn render_unit(&self) -> String {
        let exe = systemd_quote(&self.layout.install_dir.join(BINARY_NAME));
        let dir = systemd_quote(&self.layout.install_dir);
        format!(
            "[Unit]\n\
             Description=AppCache-Lock - Preload and lock apps into RAM\n\
             After=network.target\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             ExecStart={exe} --config-dir {dir} preload\n\
             RemainAfterExit=yes\n\
             User=root\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n"
        )
    }

    pub fn install(&self, config_dir: &Path) -> Result<()> {
        require_root()?;
        info!("Starting AppCache-Lock installation...");

        fs::create_dir_all(&self.layout.install_dir)
            .with_context(|| format!("Failed to create {}", self.layout.install_dir.display()))?;
        self.copy_binary()?;
        self.copy_lists(config_dir)?;

        fs::write(&self.layout.unit_path, self.render_unit())
            .with_context(|| format!("Failed to write {}", self.layout.unit_path.display()))?;
        info!("Created systemd service file: {}", self.layout.unit_path.display());

        systemctl(&["daemon-reload"])?;
        systemctl(&["enable", SERVICE_NAME])?;

        println!("AppCache-Lock installed to {}", self.layout.install_dir.display());
        println!("  - Start the service: sudo systemctl start {SERVICE_NAME}");
        println!("  - Check status: sudo systemctl status {SERVICE_NAME}");
        println!("  - The service will start automatically on boot");
        Ok(())
    }

    pub fn uninstall(&self) -> Result<()> {
        require_root()?;
        info!("Uninstalling AppCache-Lock...");

        // Either may fail when the unit was never started or enabled.
        if let Err(e) = systemctl(&["stop", SERVICE_NAME]) {
            warn!("{:#}", e);
        }
        if let Err(e) = systemctl(&["disable", SERVICE_NAME]) {
            warn!("{:#}", e);
        }

        if self.layout.unit_path.exists() {
            fs::remove_file(&self.layout.unit_path)
                .with_context(|| format!("Failed to remove {}", self.layout.unit_path.display()))?;
            info!("Removed service file: {}", self.layout.unit_path.display());
        }
        if self.layout.install_dir.exists() {
            fs::remove_dir_all(&self.layout.install_dir)
                .with_context(|| format!("Failed to remove {}", self.layout.install_dir.display()))?;
            info!("Removed installation directory: {}", self.layout.install_dir.display());
        }

        systemctl(&["daemon-reload"])?;
        println!("AppCache-Lock uninstalled successfully");
        Ok(())
    }

    fn copy_binary(&self) -> Result<()> {
        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        let dest = self.layout.install_dir.join(BINARY_NAME);
        fs::copy(&exe, &dest).with_context(|| format!("Failed to copy {} to {}", exe.display(), dest.display()))?;
        set_executable(&dest)?;
        info!("Copied binary to {}", dest.display());
        Ok(())
    }

    /// Copies both input lists, falling back to `<name>.example`. The service requires both
    /// files, so a list with neither source is installed as an empty placeholder.
    /// Returns how many were copied.
    pub fn copy_lists(&self, config_dir: &Path) -> Result<usize> {
        let mut copied = 0;
        for name in [APP_COMMANDS_FILE, RESOURCE_DIRS_FILE] {
            let dest = self.layout.install_dir.join(name);
            let primary = config_dir.join(name);
            let example = config_dir.join(format!("{name}.example"));

            let source = if primary.is_file() {
                primary
            } else if example.is_file() {
                example
            } else {
                fs::write(&dest, format!("# {name}: one entry per line\n"))
                    .with_context(|| format!("Failed to write {}", dest.display()))?;
                warn!(
                    "No {} or {}.example in {}; installed an empty {}, edit it before starting the service",
                    name,
                    name,
                    config_dir.display(),
                    dest.display()
                );
                continue;
            };

            fs::copy(&source, &dest)
                .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
            info!("Copied {} to {}", source.display(), dest.display());
            copied += 1;
        }
        Ok(copied)
    }
}

/// Double-quotes a path for a unit file command line, escaping `\`, `"` and `%` specifiers.
fn systemd_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"").replace('%', "%%");
    format!("\"{escaped}\"")
}

fn require_root() -> Result<()> {
    if !is_root() {
        bail!("Please run the installer as root (sudo appcache-lock install)");
    }
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<()> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .with_context(|| format!("Failed to run systemctl {}", args.join(" ")))?;
    if !status.success() {
        bail!("systemctl {} failed with {}", args.join(" "), status);
    }
    info!("systemctl {}", args.join(" "));
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use appcache_io::ConfigLists;
    use tempfile::TempDir;

    fn manager_in(root: &Path) -> LifecycleManager {
        LifecycleManager::new(ServiceLayout {
            install_dir: root.join("lib"),
            unit_path: root.join(SERVICE_NAME),
        })
    }

    #[test]
    fn test_default_layout() {
        let layout = ServiceLayout::default();
        assert_eq!(layout.install_dir, PathBuf::from("/usr/local/lib/appcache-lock"));
        assert_eq!(layout.unit_path, PathBuf::from("/etc/systemd/system/appcache-lock.service"));
    }

    #[test]
    fn test_render_unit() {
        let unit = LifecycleManager::new(ServiceLayout::default()).render_unit();
        assert!(unit.starts_with("[Unit]\n"));
        assert!(unit.contains("Type=oneshot\n"));
        assert!(unit.contains("RemainAfterExit=yes\n"));
        assert!(unit.contains("User=root\n"));
        assert!(unit.contains("After=network.target\n"));
        assert!(unit.contains("WantedBy=multi-user.target\n"));
        assert!(unit.contains(
            "ExecStart=\"/usr/local/lib/appcache-lock/appcache-lock\" --config-dir \"/usr/local/lib/appcache-lock\" preload\n"
        ));
    }

    #[test]
    fn test_render_unit_quotes_awkward_install_dirs() {
        let manager = LifecycleManager::new(ServiceLayout {
            install_dir: PathBuf::from("/opt/app cache/100%"),
            unit_path: PathBuf::from("/tmp/unit"),
        });
        assert!(manager.render_unit().contains(
            "ExecStart=\"/opt/app cache/100%%/appcache-lock\" --config-dir \"/opt/app cache/100%%\" preload\n"
        ));
        assert_eq!(systemd_quote(Path::new(r#"/a"b\c"#)), r#""/a\"b\\c""#);
    }

    #[test]
    fn test_copy_lists_prefers_real_file_then_example() {
        let root = TempDir::new().unwrap();
        let config = root.path().join("config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join(APP_COMMANDS_FILE), "firefox\n").unwrap();
        fs::write(config.join(format!("{APP_COMMANDS_FILE}.example")), "ignored\n").unwrap();
        fs::write(config.join(format!("{RESOURCE_DIRS_FILE}.example")), "/usr/share\n").unwrap();

        let manager = manager_in(root.path());
        fs::create_dir_all(root.path().join("lib")).unwrap();
        assert_eq!(manager.copy_lists(&config).unwrap(), 2);

        let lib = root.path().join("lib");
        assert_eq!(fs::read_to_string(lib.join(APP_COMMANDS_FILE)).unwrap(), "firefox\n");
        assert_eq!(fs::read_to_string(lib.join(RESOURCE_DIRS_FILE)).unwrap(), "/usr/share\n");
    }

    #[test]
    fn test_copy_lists_installs_loadable_placeholders_for_missing_sources() {
        let root = TempDir::new().unwrap();
        let manager = manager_in(root.path());
        let lib = root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        assert_eq!(manager.copy_lists(root.path()).unwrap(), 0);

        let lists = ConfigLists::load(&lib).unwrap();
        assert!(lists.is_empty());
    }
}
