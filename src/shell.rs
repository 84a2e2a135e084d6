//! Interactive menu loop: Update / Edit / New / Remove / Exit.
//!
//! Every prompt can be cancelled, and cancelling leaves the registry as it
//! was. Saving is left to the caller so edits survive a shell error.

use std::io;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use crate::account::Operator;
use crate::install::delete_install_dir;
use crate::models::ServerEntry;
use crate::paths::Paths;
use crate::prompt::{ask_validated, confirm, parse_tokens, CredentialSource, OutputSink, Prompter};
use crate::registry::{ArgsChange, ArgsEdit, Created, Property, Registry};
use crate::update::{Orchestrator, UpdateOutcome};
use crate::validate::{parse_app_id, validate_name};

pub struct Shell<'a> {
    registry: &'a mut Registry,
    paths: &'a Paths,
    operator: &'a Operator,
    prompter: &'a mut dyn Prompter,
    credentials: &'a mut dyn CredentialSource,
    output: &'a mut dyn OutputSink,
}

impl<'a> Shell<'a> {
    pub fn new(
        registry: &'a mut Registry,
        paths: &'a Paths,
        operator: &'a Operator,
        prompter: &'a mut dyn Prompter,
        credentials: &'a mut dyn CredentialSource,
        output: &'a mut dyn OutputSink,
    ) -> Self {
        Self {
            registry,
            paths,
            operator,
            prompter,
            credentials,
            output,
        }
    }

    /// Run until the user exits or cancels the main menu.
    pub fn run(&mut self) -> Result<(), ShellError> {
        if !self.registry.loaded_from_disk() && self.registry.is_empty() {
            self.prompter
                .message(&format!("Registry not found at {}", self.registry.path().display()));
            let options = ["Add new server".to_string(), "Exit".to_string()];
            match self.prompter.choose("No servers registered", &options) {
                Some(0) => self.create()?,
                _ => return Ok(()),
            }
        }

        let options = [
            "Update a server",
            "Edit a server",
            "New server",
            "Remove server",
            "Exit",
        ]
        .map(String::from);
        loop {
            self.show_servers();
            match self.prompter.choose("Main Menu", &options) {
                Some(0) => self.update()?,
                Some(1) => self.edit()?,
                Some(2) => self.create()?,
                Some(3) => self.remove()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn show_servers(&mut self) {
        for line in server_table(self.registry) {
            self.prompter.message(&line);
        }
    }

    fn select_server(&mut self, title: &str) -> Option<String> {
        let names = self.registry.names();
        if names.is_empty() {
            self.prompter.message("No existing servers found");
            return None;
        }
        self.prompter.choose(title, &names).map(|i| names[i].clone())
    }

    fn update(&mut self) -> Result<(), ShellError> {
        let Some(name) = self.select_server("Select server") else {
            return Ok(());
        };
        if !confirm(self.prompter, &format!("Update server {name}?")) {
            return Ok(());
        }

        if let Some(entry) = self.registry.get(&name) {
            let mode = if entry.anon { "Anonymously updating" } else { "Logging in and updating" };
            self.prompter
                .message(&format!("{mode} app {} : '{name}'", entry.app_id));
        }

        let mut orchestrator = Orchestrator::new(self.paths, self.operator);
        let message = match orchestrator.update(self.registry, &name, self.credentials, self.output) {
            Ok(UpdateOutcome::Succeeded { .. }) => format!("Update of '{name}' complete"),
            Ok(UpdateOutcome::Failed { code: Some(code), .. }) => {
                format!("Update of '{name}' failed (installer exit code {code})")
            }
            Ok(UpdateOutcome::Failed { code: None, .. }) => {
                format!("Update of '{name}' failed (installer was terminated)")
            }
            Ok(UpdateOutcome::Cancelled) => "Update cancelled".to_string(),
            Err(e) => format!("Error: {e}"),
        };
        self.prompter.message(&message);
        Ok(())
    }

    fn create(&mut self) -> Result<(), ShellError> {
        self.prompter.message("Creating a new server");

        let Some(name) = ask_validated(self.prompter, "Name server: ", |s| {
            validate_name(s).map(|_| s.to_string())
        })?
        else {
            return Ok(());
        };
        if self.registry.get(&name).is_some() {
            self.prompter
                .message(&format!("A server named '{name}' already exists"));
            return Ok(());
        }

        let Some(app_id) = ask_validated(self.prompter, "Enter app id: ", parse_app_id)? else {
            return Ok(());
        };

        let yes_no = ["No".to_string(), "Yes".to_string()];
        let anon = match self.prompter.choose("Is user verification required?", &yes_no) {
            Some(0) => true,
            Some(_) => false,
            None => return Ok(()),
        };

        let args = match self.prompter.choose("Additional arguments?", &yes_no) {
            Some(0) => Vec::new(),
            Some(_) => {
                match ask_validated(self.prompter, "Enter arguments separated by spaces: ", parse_tokens)? {
                    Some(tokens) => tokens,
                    None => return Ok(()),
                }
            }
            None => return Ok(()),
        };

        let entry = ServerEntry::new(name.clone(), app_id, anon, args);
        let prompter = &mut *self.prompter;
        let created = self.registry.create_entry(self.paths, entry, |dir| {
            confirm(
                prompter,
                &format!("Existing directory '{}' found. Continue anyway?", dir.display()),
            )
        });
        let message = match created {
            Ok(Created::Inserted) => format!("Server '{name}' added"),
            Ok(Created::Declined) => "Cancelled".to_string(),
            Err(e) => format!("Error: {e}"),
        };
        self.prompter.message(&message);
        Ok(())
    }

    fn remove(&mut self) -> Result<(), ShellError> {
        let Some(name) = self.select_server("Select server to remove") else {
            return Ok(());
        };
        if !confirm(self.prompter, &format!("Remove server {name}?")) {
            return Ok(());
        }

        if let Err(e) = self.registry.remove_entry(&name) {
            self.prompter.message(&format!("Error: {e}"));
            return Ok(());
        }
        self.prompter.message(&format!("Server '{name}' removed"));

        let dir = self.paths.install_dir(&name);
        if dir.exists() && confirm(self.prompter, &format!("Delete files on disk ({})?", dir.display())) {
            match delete_install_dir(&dir) {
                Ok(()) => self.prompter.message("Files deleted"),
                Err(e) => self.prompter.message(&format!("Error: {e}")),
            }
        }
        Ok(())
    }

    fn edit(&mut self) -> Result<(), ShellError> {
        let Some(name) = self.select_server("Select server to edit") else {
            return Ok(());
        };
        let options = ["Arguments", "App ID", "Login mode"].map(String::from);
        match self.prompter.choose(&format!("Edit {name}"), &options) {
            Some(0) => self.edit_args(&name),
            Some(1) => self.edit_app_id(&name),
            Some(2) => self.edit_login(&name),
            _ => Ok(()),
        }
    }

    fn edit_args(&mut self, name: &str) -> Result<(), ShellError> {
        let current = match self.registry.get(name) {
            Some(entry) => entry.args.clone(),
            None => return Ok(()),
        };
        self.prompter.message(&format!("Current arguments: {}", format_args_list(&current)));

        let options = [
            "Append arguments",
            "Remove an argument",
            "Replace all arguments",
            "Clear arguments",
        ]
        .map(String::from);
        let edit = match self.prompter.choose("Edit arguments", &options) {
            Some(0) => match ask_validated(self.prompter, "Arguments to append: ", parse_tokens)? {
                Some(tokens) => ArgsEdit::Append(tokens),
                None => return Ok(()),
            },
            Some(1) => {
                if current.is_empty() {
                    ArgsEdit::Remove(String::new())
                } else {
                    match self.prompter.choose("Argument to remove", &current) {
                        Some(i) => ArgsEdit::Remove(current[i].clone()),
                        None => return Ok(()),
                    }
                }
            }
            Some(2) => match ask_validated(self.prompter, "New arguments: ", parse_tokens)? {
                Some(tokens) => ArgsEdit::Replace(tokens),
                None => return Ok(()),
            },
            Some(3) => {
                if !confirm(self.prompter, &format!("Clear all arguments of {name}?")) {
                    return Ok(());
                }
                ArgsEdit::Clear
            }
            _ => return Ok(()),
        };

        let message = match self.registry.edit_args(name, edit) {
            Ok(ArgsChange::Changed) => match self.registry.get(name) {
                Some(entry) => format!("Arguments now: {}", format_args_list(&entry.args)),
                None => "Arguments updated".to_string(),
            },
            Ok(ArgsChange::Unchanged) => "Arguments unchanged".to_string(),
            Ok(ArgsChange::NothingToRemove) => "Nothing to remove".to_string(),
            Ok(ArgsChange::NotPresent) => "Argument not present".to_string(),
            Err(e) => format!("Error: {e}"),
        };
        self.prompter.message(&message);
        Ok(())
    }

    fn edit_app_id(&mut self, name: &str) -> Result<(), ShellError> {
        let Some(app_id) = ask_validated(self.prompter, "Enter new app id: ", parse_app_id)? else {
            return Ok(());
        };
        self.apply_property(name, Property::AppId(app_id));
        Ok(())
    }

    fn edit_login(&mut self, name: &str) -> Result<(), ShellError> {
        let options = ["Anonymous".to_string(), "Steam account".to_string()];
        let anon = match self.prompter.choose("Login mode", &options) {
            Some(0) => true,
            Some(_) => false,
            None => return Ok(()),
        };
        self.apply_property(name, Property::Anon(anon));
        Ok(())
    }

    fn apply_property(&mut self, name: &str, property: Property) {
        let message = match self.registry.set_property(name, property) {
            Ok(true) => format!("Server '{name}' updated"),
            Ok(false) => "No change".to_string(),
            Err(e) => format!("Error: {e}"),
        };
        self.prompter.message(&message);
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Failed to read input: {0}")]
    Input(#[from] io::Error),
}

/// Table of registered servers, one line per row, header first.
pub fn server_table(registry: &Registry) -> Vec<String> {
    if registry.is_empty() {
        return vec!["    No existing servers found".to_string()];
    }

    let mut lines = vec![
        "Servers:".to_string(),
        format!(
            "{:>12} {:>12} {:>12} {:>25}  {}",
            "Name", "App ID", "Login", "Last update", "Arguments"
        ),
    ];
    for (name, entry) in registry.list() {
        let last_update = entry
            .last_update
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!(
            "{:>12} {:>12} {:>12} {:>25}  {}",
            name,
            entry.app_id,
            entry.login_label(),
            last_update,
            format_args_list(&entry.args)
        ));
    }
    lines
}

fn format_args_list(args: &[String]) -> String {
    if args.is_empty() {
        "(none)".to_string()
    } else {
        args.join(" ")
    }
}
