//! Headless runs of the interactive shell with scripted answers.
#![cfg(unix)]

use appmgr::prompt::{CollectedOutput, Scripted};
use appmgr::{Operator, Paths, Registry, ServerEntry, Shell};
use tempfile::TempDir;

const UPDATE: usize = 0;
const EDIT: usize = 1;
const NEW: usize = 2;
const REMOVE: usize = 3;

fn workspace(installer: &str) -> (TempDir, Paths) {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::new(tmp.path().join("registry.json"), tmp.path().join("servers"), installer);
    (tmp, paths)
}

/// Registry on disk with one anonymous server, reloaded as the shell would see it.
fn with_valheim(paths: &Paths, args: &[&str]) -> Registry {
    let mut registry = Registry::load(paths.registry_file()).unwrap();
    let entry = ServerEntry::new("valheim", 896660, true, args.iter().map(|s| s.to_string()).collect());
    registry.create_entry(paths, entry, |_| true).unwrap();
    registry.save().unwrap();
    Registry::load(paths.registry_file()).unwrap()
}

fn run(registry: &mut Registry, paths: &Paths, script: &mut Scripted) -> CollectedOutput {
    let operator = Operator::named("steam");
    let mut credentials = Scripted::new();
    let mut output = CollectedOutput::new();
    Shell::new(registry, paths, &operator, script, &mut credentials, &mut output)
        .run()
        .unwrap();
    output
}

#[test]
fn first_run_adds_a_server() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = Registry::load(paths.registry_file()).unwrap();
    let mut script = Scripted::new()
        .pick(Some(0)) // Add new server
        .type_line("my server") // rejected: whitespace
        .type_line("valheim")
        .type_line("896660")
        .pick(Some(0)) // no verification -> anonymous
        .pick(Some(1)) // additional arguments
        .type_line("-beta public-test")
        .pick(Some(4)); // Exit

    run(&mut registry, &paths, &mut script);

    assert!(script.exhausted());
    assert_eq!(script.titles[0], "No servers registered");
    assert!(script.messages.iter().any(|m| m.starts_with("Invalid response")));
    assert!(script.messages.iter().any(|m| m == "Server 'valheim' added"));

    let entry = registry.entry("valheim").unwrap();
    assert_eq!(entry.app_id, 896660);
    assert!(entry.anon);
    assert_eq!(entry.args, ["-beta", "public-test"]);
    assert!(registry.is_dirty());
    assert!(paths.install_dir("valheim").is_dir());
}

#[test]
fn first_run_exit_changes_nothing() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = Registry::load(paths.registry_file()).unwrap();
    let mut script = Scripted::new().pick(Some(1));

    run(&mut registry, &paths, &mut script);

    assert!(registry.is_empty());
    assert!(!registry.is_dirty());
    assert!(!paths.registry_file().exists());
}

#[test]
fn update_streams_output_and_stamps() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &["-beta"]);
    let mut script = Scripted::new()
        .pick(Some(UPDATE))
        .pick(Some(0)) // valheim
        .pick(Some(0)); // confirm

    let output = run(&mut registry, &paths, &mut script);

    assert_eq!(output.lines.len(), 1);
    let (user, subsystem, line) = &output.lines[0];
    assert_eq!(user, "steam");
    assert_eq!(subsystem, "steamCMD");
    assert!(line.contains("+login anonymous -beta +app_update 896660 validate +quit"));
    assert!(script.messages.iter().any(|m| m == "Anonymously updating app 896660 : 'valheim'"));
    assert!(script.messages.iter().any(|m| m == "Update of 'valheim' complete"));
    assert!(registry.entry("valheim").unwrap().last_update.is_some());
}

#[test]
fn failed_update_is_reported_and_not_stamped() {
    let (_tmp, paths) = workspace("false");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new().pick(Some(UPDATE)).pick(Some(0)).pick(Some(0));

    run(&mut registry, &paths, &mut script);

    assert!(script
        .messages
        .iter()
        .any(|m| m == "Update of 'valheim' failed (installer exit code 1)"));
    assert!(registry.entry("valheim").unwrap().last_update.is_none());
    assert!(!registry.is_dirty());
}

#[test]
fn declined_update_does_not_run() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new().pick(Some(UPDATE)).pick(Some(0)).pick(Some(1));

    let output = run(&mut registry, &paths, &mut script);

    assert!(output.lines.is_empty());
    assert!(!registry.is_dirty());
}

#[test]
fn append_arguments() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &["x"]);
    let mut script = Scripted::new()
        .pick(Some(EDIT))
        .pick(Some(0)) // valheim
        .pick(Some(0)) // Arguments
        .pick(Some(0)) // Append
        .type_line("a b");

    run(&mut registry, &paths, &mut script);

    assert_eq!(registry.entry("valheim").unwrap().args, ["x", "a", "b"]);
    assert!(registry.is_dirty());
    assert!(script.messages.iter().any(|m| m == "Arguments now: x a b"));
}

#[test]
fn removing_from_empty_arguments_is_reported() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new()
        .pick(Some(EDIT))
        .pick(Some(0))
        .pick(Some(0))
        .pick(Some(1)); // Remove an argument

    run(&mut registry, &paths, &mut script);

    assert!(script.messages.iter().any(|m| m == "Nothing to remove"));
    assert!(!registry.is_dirty());
}

#[test]
fn change_login_mode_and_app_id() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new()
        .pick(Some(EDIT))
        .pick(Some(0))
        .pick(Some(2)) // Login mode
        .pick(Some(1)) // Steam account
        .pick(Some(EDIT))
        .pick(Some(0))
        .pick(Some(1)) // App ID
        .type_line("1")
        .type_line("2394010");

    run(&mut registry, &paths, &mut script);

    let entry = registry.entry("valheim").unwrap();
    assert!(!entry.anon);
    assert_eq!(entry.app_id, 2394010);
}

#[test]
fn new_server_over_existing_directory_can_be_declined() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    std::fs::create_dir_all(paths.install_dir("ark")).unwrap();
    let mut script = Scripted::new()
        .pick(Some(NEW))
        .type_line("ark")
        .type_line("376030")
        .pick(Some(0))
        .pick(Some(0))
        .pick(Some(1)); // Cancel reuse of existing directory

    run(&mut registry, &paths, &mut script);

    assert!(registry.get("ark").is_none());
    assert!(!registry.is_dirty());
    assert!(script.messages.iter().any(|m| m == "Cancelled"));
}

#[test]
fn new_server_with_taken_name_is_refused() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new().pick(Some(NEW)).type_line("valheim");

    run(&mut registry, &paths, &mut script);

    assert!(script
        .messages
        .iter()
        .any(|m| m == "A server named 'valheim' already exists"));
    assert!(!registry.is_dirty());
}

#[test]
fn remove_server_and_files() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    std::fs::write(paths.install_dir("valheim").join("valheim_server.x86_64"), b"elf").unwrap();
    let mut script = Scripted::new()
        .pick(Some(REMOVE))
        .pick(Some(0))
        .pick(Some(0)) // confirm removal
        .pick(Some(0)); // confirm deleting files

    run(&mut registry, &paths, &mut script);

    assert!(registry.is_empty());
    assert!(!paths.install_dir("valheim").exists());
    registry.save().unwrap();
    assert!(Registry::load(paths.registry_file()).unwrap().get("valheim").is_none());
}

#[test]
fn remove_server_keeps_files_unless_confirmed() {
    let (_tmp, paths) = workspace("echo");
    let mut registry = with_valheim(&paths, &[]);
    let mut script = Scripted::new()
        .pick(Some(REMOVE))
        .pick(Some(0))
        .pick(Some(0))
        .pick(Some(1));

    run(&mut registry, &paths, &mut script);

    assert!(registry.is_empty());
    assert!(paths.install_dir("valheim").is_dir());
}
