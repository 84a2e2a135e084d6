//! The server registry: load, mutate, and save the set of managed servers.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use time::OffsetDateTime;

use crate::install::{prepare_install_dir, InstallDirError, Prepared};
use crate::models::{RegistryFile, ServerEntry, CURRENT_VERSION};
use crate::paths::Paths;
use crate::validate::{validate_app_id, validate_name, ValidationError};

/// In-memory registry. All mutation goes through its methods, each of which
/// marks the registry dirty when something actually changed.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: BTreeMap<String, ServerEntry>,
    loaded_from_disk: bool,
    dirty: bool,
    _lock: Option<RegistryLock>,
}

/// Edit applied to a server's extra installer arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsEdit {
    Append(Vec<String>),
    /// Remove the first occurrence of a token.
    Remove(String),
    Replace(Vec<String>),
    Clear,
}

/// What an [`ArgsEdit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsChange {
    Changed,
    Unchanged,
    /// Remove was asked for but the list is empty.
    NothingToRemove,
    /// Remove was asked for a token that is not in the list.
    NotPresent,
}

/// Editable scalar fields of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    AppId(u64),
    Anon(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    Inserted,
    /// The install directory already existed and reuse was declined.
    Declined,
}

impl Registry {
    /// Empty registry that has never been saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            loaded_from_disk: false,
            dirty: false,
            _lock: None,
        }
    }

    /// Load the registry from disk without locking it.
    ///
    /// A missing file is not an error: the registry starts empty and
    /// [`Registry::loaded_from_disk`] reports false.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "registry not found, starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(RegistryError::Read { source, path }),
        };

        let file: RegistryFile = match serde_json::from_slice(&content) {
            Ok(f) => f,
            Err(source) => return Err(RegistryError::Corrupt { source, path }),
        };

        if file.version > CURRENT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                version: file.version,
                path,
            });
        }
        let migrated = file.version < CURRENT_VERSION;
        if migrated {
            tracing::info!(from = file.version, to = CURRENT_VERSION, "migrating registry schema");
        }

        let mut entries = BTreeMap::new();
        for entry in file.into_entries() {
            if let Err(source) = validate_name(&entry.name).and_then(|_| validate_app_id(entry.app_id)) {
                return Err(RegistryError::InvalidRecord { source, path });
            }
            entries.insert(entry.name.clone(), entry);
        }

        tracing::debug!(path = %path.display(), servers = entries.len(), "loaded registry");
        Ok(Self {
            path,
            entries,
            loaded_from_disk: true,
            dirty: migrated,
            _lock: None,
        })
    }

    /// Take the advisory lock for `path`, then load it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let lock = RegistryLock::acquire(&path)?;
        let mut registry = Self::load(path)?;
        registry._lock = Some(lock);
        Ok(registry)
    }

    /// Move an unreadable registry aside and start over with an empty, locked one.
    /// Returns the registry and where the old file went, if there was one.
    pub fn start_fresh(path: impl Into<PathBuf>) -> Result<(Self, Option<PathBuf>), RegistryError> {
        let path = path.into();
        let lock = RegistryLock::acquire(&path)?;

        let backup = if path.exists() {
            let stamp = OffsetDateTime::now_utc().unix_timestamp();
            let backup = with_suffix(&path, &format!(".corrupt-{stamp}"));
            fs::rename(&path, &backup).map_err(|source| RegistryError::Write {
                source,
                path: backup.clone(),
            })?;
            tracing::warn!(backup = %backup.display(), "moved unreadable registry aside");
            Some(backup)
        } else {
            None
        };

        let mut registry = Self::empty(path);
        registry._lock = Some(lock);
        Ok((registry, backup))
    }

    /// Write every entry to disk. Writes a temp file next to the registry and
    /// renames it over the old one.
    pub fn save(&mut self) -> Result<(), RegistryError> {
        let file = RegistryFile::from_entries(self.entries.values());
        let output = serde_json::to_string_pretty(&file).map_err(RegistryError::Serialize)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Write {
                source,
                path: parent.to_path_buf(),
            })?;
        }

        let tmp = with_suffix(&self.path, ".tmp");
        fs::write(&tmp, output).map_err(|source| RegistryError::Write {
            source,
            path: tmp.clone(),
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| RegistryError::Write {
            source,
            path: self.path.clone(),
        })?;

        self.dirty = false;
        tracing::info!(path = %self.path.display(), servers = self.entries.len(), "saved registry");
        Ok(())
    }

    /// Add a new server and make sure its install directory exists.
    ///
    /// If the directory is already there, `confirm_existing` decides whether to
    /// reuse it; declining leaves the registry untouched.
    pub fn create_entry(
        &mut self,
        paths: &Paths,
        entry: ServerEntry,
        confirm_existing: impl FnOnce(&Path) -> bool,
    ) -> Result<Created, RegistryError> {
        validate_name(&entry.name)?;
        validate_app_id(entry.app_id)?;
        if self.entries.contains_key(&entry.name) {
            return Err(RegistryError::DuplicateName(entry.name));
        }

        let dir = paths.install_dir(&entry.name);
        if prepare_install_dir(&dir, confirm_existing)? == Prepared::Declined {
            return Ok(Created::Declined);
        }

        tracing::info!(name = %entry.name, app_id = entry.app_id, anon = entry.anon, "added server");
        let entry = ServerEntry {
            last_update: None,
            ..entry
        };
        self.entries.insert(entry.name.clone(), entry);
        self.dirty = true;
        Ok(Created::Inserted)
    }

    /// Forget a server. Its install directory is left alone.
    pub fn remove_entry(&mut self, name: &str) -> Result<ServerEntry, RegistryError> {
        let removed = self
            .entries
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.dirty = true;
        tracing::info!(name, "removed server");
        Ok(removed)
    }

    pub fn edit_args(&mut self, name: &str, edit: ArgsEdit) -> Result<ArgsChange, RegistryError> {
        let entry = self.entry_mut(name)?;
        let change = match edit {
            ArgsEdit::Append(tokens) => {
                if tokens.is_empty() {
                    ArgsChange::Unchanged
                } else {
                    entry.args.extend(tokens);
                    ArgsChange::Changed
                }
            }
            ArgsEdit::Remove(token) => {
                if entry.args.is_empty() {
                    ArgsChange::NothingToRemove
                } else if let Some(pos) = entry.args.iter().position(|a| *a == token) {
                    entry.args.remove(pos);
                    ArgsChange::Changed
                } else {
                    ArgsChange::NotPresent
                }
            }
            ArgsEdit::Replace(tokens) => {
                if entry.args == tokens {
                    ArgsChange::Unchanged
                } else {
                    entry.args = tokens;
                    ArgsChange::Changed
                }
            }
            ArgsEdit::Clear => {
                if entry.args.is_empty() {
                    ArgsChange::Unchanged
                } else {
                    entry.args.clear();
                    ArgsChange::Changed
                }
            }
        };

        if change == ArgsChange::Changed {
            self.dirty = true;
        }
        Ok(change)
    }

    /// Update the app id or login mode. Returns whether the value changed.
    pub fn set_property(&mut self, name: &str, property: Property) -> Result<bool, RegistryError> {
        if let Property::AppId(id) = property {
            validate_app_id(id)?;
        }
        let entry = self.entry_mut(name)?;
        let changed = match property {
            Property::AppId(id) => std::mem::replace(&mut entry.app_id, id) != id,
            Property::Anon(anon) => std::mem::replace(&mut entry.anon, anon) != anon,
        };
        if changed {
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Stamp a successful update.
    pub fn record_update(&mut self, name: &str, at: OffsetDateTime) -> Result<(), RegistryError> {
        self.entry_mut(name)?.last_update = Some(at);
        self.dirty = true;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ServerEntry> {
        self.entries.get(name)
    }

    pub fn entry(&self, name: &str) -> Result<&ServerEntry, RegistryError> {
        self.entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut ServerEntry, RegistryError> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Entries ordered by name.
    pub fn list(&self) -> impl Iterator<Item = (&str, &ServerEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// False when no registry file existed at load time.
    pub fn loaded_from_disk(&self) -> bool {
        self.loaded_from_disk
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Server not found: {0}")]
    NotFound(String),
    #[error("A server named '{0}' already exists")]
    DuplicateName(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    FileSystem(#[from] InstallDirError),
    #[error("Failed to read registry {dir}: {source}", dir = .path.display())]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Registry {dir} is corrupt: {source}", dir = .path.display())]
    Corrupt {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Registry {dir} has an invalid record: {source}", dir = .path.display())]
    InvalidRecord {
        source: ValidationError,
        path: PathBuf,
    },
    #[error("Registry {dir} has schema version {version}, newer than this build supports", dir = .path.display())]
    UnsupportedVersion { version: u32, path: PathBuf },
    #[error("Failed to serialize registry: {0}")]
    Serialize(serde_json::Error),
    #[error("Failed to write {dir}: {source}", dir = .path.display())]
    Write {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Failed to open lock file {dir}: {source}", dir = .path.display())]
    Lock {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Registry is in use by another instance (lock held on {dir})", dir = .0.display())]
    Locked(PathBuf),
}

impl RegistryError {
    /// The file exists but its contents can't be used; starting fresh is an option.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, RegistryError::Corrupt { .. } | RegistryError::InvalidRecord { .. })
    }
}

/// Exclusive advisory lock on `<registry>.lock`, held for the registry's lifetime.
#[derive(Debug)]
struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    fn acquire(registry_path: &Path) -> Result<Self, RegistryError> {
        let path = with_suffix(registry_path, ".lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Lock {
                source,
                path: path.clone(),
            })?;
        }

        // The lock file is never unlinked; removing a held lock file would let a
        // second instance lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| RegistryError::Lock {
                source,
                path: path.clone(),
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(RegistryError::Locked(path));
        }
        Ok(Self { _file: file })
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
