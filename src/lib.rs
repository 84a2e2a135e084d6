//! appmgr - SteamCMD server manager
//!
//! Keeps a registry of dedicated-server installs and runs SteamCMD to
//! install or update them.

pub mod account;
pub mod command;
pub mod install;
pub mod models;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod shell;
pub mod update;
pub mod validate;

pub use account::{AccountError, Operator};
pub use command::{build_command, Credentials, Login};
pub use install::{delete_install_dir, prepare_install_dir, InstallDirError};
pub use models::ServerEntry;
pub use paths::{PathOverrides, Paths};
pub use process::{InstallerProcess, ProcessError};
pub use prompt::{CredentialSource, OutputSink, Prompter, Terminal};
pub use registry::{ArgsChange, ArgsEdit, Created, Property, Registry, RegistryError};
pub use shell::{server_table, Shell, ShellError};
pub use update::{Orchestrator, UpdateError, UpdateOutcome, UpdateState};
pub use validate::ValidationError;
