//! Update a registered server by running SteamCMD against its install directory.
//!
//! One call to [`Orchestrator::update`] walks
//! `Idle -> Building -> Running -> {Succeeded, Failed}`. Building picks the
//! login mode (asking for credentials when the entry is not anonymous),
//! Running streams installer output to the sink until the process exits, and
//! the exit code decides the outcome. Only a successful run stamps
//! `last_update`.

use thiserror::Error;
use time::OffsetDateTime;

use crate::account::Operator;
use crate::command::{build_command, redacted, Login};
use crate::install::{ensure_install_dir, InstallDirError};
use crate::paths::Paths;
use crate::process::{InstallerProcess, ProcessError};
use crate::prompt::{CredentialSource, OutputSink};
use crate::registry::{Registry, RegistryError};

/// Subsystem tag on every forwarded output line.
pub const SUBSYSTEM: &str = "steamCMD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Building,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Succeeded { lines: usize },
    /// Installer exited unsuccessfully. `code` is `None` if it was killed by a signal.
    Failed { code: Option<i32>, lines: usize },
    /// No credentials were given; nothing ran.
    Cancelled,
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Succeeded { .. })
    }
}

pub struct Orchestrator<'a> {
    paths: &'a Paths,
    operator: &'a Operator,
    state: UpdateState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(paths: &'a Paths, operator: &'a Operator) -> Self {
        Self {
            paths,
            operator,
            state: UpdateState::Idle,
        }
    }

    /// State reached by the most recent update.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Run the installer for `name` and block until it exits.
    ///
    /// A non-zero exit is reported as [`UpdateOutcome::Failed`], not an error;
    /// errors are reserved for a missing entry, an unusable install directory,
    /// or an installer that could not be started.
    pub fn update(
        &mut self,
        registry: &mut Registry,
        name: &str,
        credentials: &mut dyn CredentialSource,
        sink: &mut dyn OutputSink,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.state = UpdateState::Idle;
        let result = self.run(registry, name, credentials, sink);
        if result.is_err() {
            self.enter(UpdateState::Failed);
        }
        result
    }

    fn run(
        &mut self,
        registry: &mut Registry,
        name: &str,
        credentials: &mut dyn CredentialSource,
        sink: &mut dyn OutputSink,
    ) -> Result<UpdateOutcome, UpdateError> {
        let paths = self.paths;
        let entry = registry.entry(name)?.clone();

        self.enter(UpdateState::Building);
        let login = if entry.anon {
            Login::Anonymous
        } else {
            match credentials.credentials(&entry).map_err(UpdateError::Credentials)? {
                Some(creds) => Login::Account(creds),
                None => {
                    tracing::info!(name, "update cancelled at login");
                    self.enter(UpdateState::Idle);
                    return Ok(UpdateOutcome::Cancelled);
                }
            }
        };

        let dir = paths.install_dir(&entry.name);
        if ensure_install_dir(&dir)? {
            tracing::warn!(dir = %dir.display(), "install directory was missing, recreated it");
        }

        let installer = paths.installer().to_string_lossy();
        let argv = build_command(&installer, &paths.install_dir_arg(&entry.name), &entry, &login);
        tracing::info!(
            name,
            app_id = entry.app_id,
            login = entry.login_label(),
            command = %redacted(&argv, &login),
            "starting installer"
        );

        self.enter(UpdateState::Running);
        let mut process = InstallerProcess::spawn(&argv)?;

        let mut lines = 0usize;
        for line in process.by_ref() {
            sink.line(self.operator.name(), SUBSYSTEM, &line);
            lines += 1;
        }
        let status = process.wait()?;

        if status.success() {
            registry.record_update(name, OffsetDateTime::now_utc())?;
            self.enter(UpdateState::Succeeded);
            tracing::info!(name, lines, "update succeeded");
            Ok(UpdateOutcome::Succeeded { lines })
        } else {
            self.enter(UpdateState::Failed);
            tracing::warn!(name, %status, "installer failed");
            Ok(UpdateOutcome::Failed {
                code: status.code(),
                lines,
            })
        }
    }

    fn enter(&mut self, next: UpdateState) {
        tracing::debug!(from = ?self.state, to = ?next, "update state");
        self.state = next;
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Failed to read credentials: {0}")]
    Credentials(#[source] std::io::Error),
    #[error(transparent)]
    FileSystem(#[from] InstallDirError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::ServerEntry;
    use crate::prompt::{CollectedOutput, Scripted};
    use tempfile::TempDir;

    fn setup(installer: &str, anon: bool) -> (TempDir, Paths, Registry) {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path().join("registry.json"), tmp.path().join("servers"), installer);
        let mut registry = Registry::load(paths.registry_file()).unwrap();
        let entry = ServerEntry::new("valheim", 896660, anon, vec!["-beta".into(), "public-test".into()]);
        registry.create_entry(&paths, entry, |_| true).unwrap();
        registry.save().unwrap();
        (tmp, paths, registry)
    }

    #[test]
    fn anonymous_success_streams_and_stamps() {
        let (_tmp, paths, mut registry) = setup("echo", true);
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);
        let mut output = CollectedOutput::new();

        let outcome = orch
            .update(&mut registry, "valheim", &mut Scripted::new(), &mut output)
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Succeeded { lines: 1 });
        assert_eq!(orch.state(), UpdateState::Succeeded);
        let expected = format!(
            "+force_install_dir {} +login anonymous -beta public-test +app_update 896660 validate +quit",
            paths.install_dir_arg("valheim")
        );
        assert_eq!(output.text(), [expected.as_str()]);
        assert_eq!(output.lines[0].0, "steam");
        assert_eq!(output.lines[0].1, SUBSYSTEM);

        assert!(registry.entry("valheim").unwrap().last_update.is_some());
        assert!(registry.is_dirty());
    }

    #[test]
    fn account_login_uses_credentials_and_no_extra_args() {
        let (_tmp, paths, mut registry) = setup("echo", false);
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);
        let mut creds = Scripted::new().login("gaben", "hunter2");
        let mut output = CollectedOutput::new();

        let outcome = orch.update(&mut registry, "valheim", &mut creds, &mut output).unwrap();

        assert!(outcome.is_success());
        assert!(creds.exhausted());
        let line = output.text()[0];
        assert!(line.starts_with("+login gaben hunter2 +force_install_dir"));
        assert!(!line.contains("-beta"));
    }

    #[test]
    fn nonzero_exit_is_failure_without_timestamp() {
        let (_tmp, paths, mut registry) = setup("false", true);
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);

        let outcome = orch
            .update(&mut registry, "valheim", &mut Scripted::new(), &mut CollectedOutput::new())
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Failed { code: Some(1), lines: 0 });
        assert_eq!(orch.state(), UpdateState::Failed);
        assert!(registry.entry("valheim").unwrap().last_update.is_none());
        assert!(!registry.is_dirty());
    }

    #[test]
    fn missing_credentials_cancel_before_running() {
        let (_tmp, paths, mut registry) = setup("echo", false);
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);
        let mut output = CollectedOutput::new();

        let outcome = orch
            .update(&mut registry, "valheim", &mut Scripted::new(), &mut output)
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Cancelled);
        assert_eq!(orch.state(), UpdateState::Idle);
        assert!(output.lines.is_empty());
        assert!(!registry.is_dirty());
    }

    #[test]
    fn unstartable_installer_is_a_process_error() {
        let (tmp, _, mut registry) = setup("echo", true);
        let paths = Paths::new(
            tmp.path().join("registry.json"),
            tmp.path().join("servers"),
            tmp.path().join("steamcmd/steamcmd.sh"),
        );
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);

        let err = orch
            .update(&mut registry, "valheim", &mut Scripted::new(), &mut CollectedOutput::new())
            .unwrap_err();

        assert!(matches!(err, UpdateError::Process(ProcessError::Spawn { .. })));
        assert_eq!(orch.state(), UpdateState::Failed);
        assert!(!registry.is_dirty());
    }

    #[test]
    fn unknown_server_is_not_found() {
        let (_tmp, paths, mut registry) = setup("echo", true);
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);
        let err = orch
            .update(&mut registry, "ark", &mut Scripted::new(), &mut CollectedOutput::new())
            .unwrap_err();
        assert!(matches!(err, UpdateError::Registry(RegistryError::NotFound(_))));
    }

    #[test]
    fn missing_install_dir_is_recreated() {
        let (_tmp, paths, mut registry) = setup("echo", true);
        std::fs::remove_dir(paths.install_dir("valheim")).unwrap();
        let operator = Operator::named("steam");
        let mut orch = Orchestrator::new(&paths, &operator);

        let outcome = orch
            .update(&mut registry, "valheim", &mut Scripted::new(), &mut CollectedOutput::new())
            .unwrap();
        assert!(outcome.is_success());
        assert!(paths.install_dir("valheim").is_dir());
    }
}
