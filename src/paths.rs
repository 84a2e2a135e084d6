//! Path resolution for the registry file, install root, and installer.
//!
//! Uses command-line overrides when given, otherwise home/XDG defaults.

use std::path::{Path, PathBuf};

/// Overrides collected from the command line. `None` means "use the default".
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub registry_file: Option<String>,
    pub install_root: Option<String>,
    pub installer: Option<String>,
}

/// Resolved paths for the registry and server installs.
#[derive(Debug, Clone)]
pub struct Paths {
    pub registry_file: PathBuf,
    pub install_root: PathBuf,
    pub installer: PathBuf,
}

impl Paths {
    /// Resolve paths from overrides, falling back to home/XDG defaults.
    pub fn resolve(overrides: &PathOverrides) -> Self {
        let registry_file = resolve_path(
            overrides.registry_file.as_deref(),
            dirs::data_local_dir().map(|p| p.join("appmgr/registry.json")),
            "~/.local/share/appmgr/registry.json",
        );
        let install_root = resolve_path(
            overrides.install_root.as_deref(),
            dirs::home_dir(),
            "/home/steam",
        );
        let installer = resolve_path(
            overrides.installer.as_deref(),
            dirs::home_dir().map(|p| p.join("steamcmd/steamcmd.sh")),
            "~/steamcmd/steamcmd.sh",
        );

        Self {
            registry_file,
            install_root,
            installer,
        }
    }

    /// Fixed paths, bypassing all defaults.
    pub fn new(
        registry_file: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        installer: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry_file: registry_file.into(),
            install_root: install_root.into(),
            installer: installer.into(),
        }
    }

    /// Registry file path.
    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    /// Root under which every server gets its own directory.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// SteamCMD executable.
    pub fn installer(&self) -> &Path {
        &self.installer
    }

    /// Install directory for a server.
    pub fn install_dir(&self, name: &str) -> PathBuf {
        self.install_root.join(name)
    }

    /// Install directory as handed to `+force_install_dir`: root, name, trailing separator.
    pub fn install_dir_arg(&self, name: &str) -> String {
        let root = self.install_root.to_string_lossy();
        format!("{}/{}/", root.trim_end_matches('/'), name)
    }
}

fn resolve_path(overridden: Option<&str>, default: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(val) = overridden {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    default.unwrap_or_else(|| expand_tilde(fallback))
}

fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}
