//! Data structures for server entries and the registry file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 3;

/// One managed server install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerEntry {
    pub name: String,
    pub app_id: u64,
    pub anon: bool,
    pub args: Vec<String>,
    #[serde(serialize_with = "time::serde::rfc3339::option::serialize")]
    pub last_update: Option<OffsetDateTime>,
}

impl ServerEntry {
    pub fn new(name: impl Into<String>, app_id: u64, anon: bool, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            app_id,
            anon,
            args,
            last_update: None,
        }
    }

    /// "anonymous" or "account", for display.
    pub fn login_label(&self) -> &'static str {
        if self.anon {
            "anonymous"
        } else {
            "account"
        }
    }
}

/// Registry file at `<data_local_dir>/appmgr/registry.json`
///
/// Version 1 records carry `args`, version 2 records carry `last_update`,
/// version 3 carries both. Files without a `version` field are version 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default)]
    pub servers: BTreeMap<String, StoredEntry>,
}

/// Per-server record as stored on disk, keyed by server name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: u64,
    pub anon: bool,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_update: Option<OffsetDateTime>,
}

fn legacy_version() -> u32 {
    1
}

impl RegistryFile {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ServerEntry>) -> Self {
        let servers = entries
            .into_iter()
            .map(|e| {
                (
                    e.name.clone(),
                    StoredEntry {
                        id: e.app_id,
                        anon: e.anon,
                        args: e.args.clone(),
                        last_update: e.last_update,
                    },
                )
            })
            .collect();
        Self {
            version: CURRENT_VERSION,
            servers,
        }
    }

    pub fn into_entries(self) -> impl Iterator<Item = ServerEntry> {
        self.servers.into_iter().map(|(name, stored)| ServerEntry {
            name,
            app_id: stored.id,
            anon: stored.anon,
            args: stored.args,
            last_update: stored.last_update,
        })
    }
}
