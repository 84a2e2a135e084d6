//! User-facing collaborators: menus, line input, credentials, installer output.
//!
//! The shell and orchestrator only talk to these traits. [`Terminal`] is the
//! interactive implementation; [`Scripted`] and [`CollectedOutput`] replay
//! canned answers so flows can run headless.

use std::collections::VecDeque;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::os::fd::AsFd;

use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};

use crate::command::Credentials;
use crate::models::ServerEntry;

/// Menus and free-text input.
pub trait Prompter {
    /// Show `options` under `title`; the chosen index, or `None` if cancelled.
    fn choose(&mut self, title: &str, options: &[String]) -> Option<usize>;

    /// One line of input, or `None` if input ended.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Informational text for the user.
    fn message(&mut self, text: &str);
}

/// Source of login credentials for non-anonymous updates.
pub trait CredentialSource {
    /// `None` means the user backed out.
    fn credentials(&mut self, entry: &ServerEntry) -> io::Result<Option<Credentials>>;
}

/// Receives installer output, one line at a time.
pub trait OutputSink {
    fn line(&mut self, user: &str, subsystem: &str, line: &str);
}

/// Confirm / Cancel menu. Anything but an explicit confirm is a no.
pub fn confirm(prompter: &mut dyn Prompter, title: &str) -> bool {
    let options = ["Confirm".to_string(), "Cancel".to_string()];
    prompter.choose(title, &options) == Some(0)
}

/// Ask until `parse` accepts the input. `None` if input ended first.
pub fn ask_validated<T, E: Display>(
    prompter: &mut dyn Prompter,
    prompt: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> io::Result<Option<T>> {
    loop {
        let Some(line) = prompter.read_line(prompt)? else {
            return Ok(None);
        };
        match parse(line.trim()) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => prompter.message(&format!("Invalid response: {e}")),
        }
    }
}

/// Whitespace-separated tokens; at least one is required.
pub fn parse_tokens(input: &str) -> Result<Vec<String>, &'static str> {
    let tokens: Vec<String> = input.split_whitespace().map(String::from).collect();
    if tokens.is_empty() {
        return Err("enter at least one argument");
    }
    Ok(tokens)
}

/// Stdin/stdout implementation.
#[derive(Debug, Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for Terminal {
    fn choose(&mut self, title: &str, options: &[String]) -> Option<usize> {
        println!("\n{title}");
        for (i, option) in options.iter().enumerate() {
            println!("  {:>2}) {}", i + 1, option);
        }
        loop {
            let line = match self.read_line(&format!("Select 1-{} (empty to cancel): ", options.len())) {
                Ok(Some(l)) => l,
                Ok(None) | Err(_) => return None,
            };
            let line = line.trim();
            if line.is_empty() || line.eq_ignore_ascii_case("q") {
                return None;
            }
            match line.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Some(n - 1),
                _ => println!("Invalid selection"),
            }
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn message(&mut self, text: &str) {
        println!("{text}");
    }
}

impl CredentialSource for Terminal {
    fn credentials(&mut self, _entry: &ServerEntry) -> io::Result<Option<Credentials>> {
        let Some(username) = self.read_line("Enter Steam username: ")? else {
            return Ok(None);
        };
        let username = username.trim().to_string();
        if username.is_empty() {
            return Ok(None);
        }
        let Some(password) = read_password("Enter Steam password: ")? else {
            return Ok(None);
        };
        Ok(Some(Credentials { username, password }))
    }
}

impl OutputSink for Terminal {
    fn line(&mut self, user: &str, subsystem: &str, line: &str) {
        println!("[{user}][{subsystem}]  {line}");
    }
}

/// Read a line with terminal echo turned off. Falls back to a plain read when
/// stdin is not a terminal. `None` if the user pressed Ctrl-C.
fn read_password(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let stdin = io::stdin();
    let _silent = SilentInput::enable(&stdin)?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    if line.contains(INTERRUPT) {
        println!();
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Ctrl-C as typed while signals are off.
const INTERRUPT: char = '\u{3}';

/// Terminal with echo and job-control signals off. The saved settings are put
/// back on drop, whichever way the read ends.
struct SilentInput<'a, F: AsFd> {
    fd: &'a F,
    saved: Termios,
}

impl<'a, F: AsFd> SilentInput<'a, F> {
    /// `None` when `fd` is not a terminal.
    fn enable(fd: &'a F) -> io::Result<Option<Self>> {
        let Ok(saved) = tcgetattr(fd) else {
            return Ok(None);
        };
        let mut silent = saved.clone();
        silent.local_flags.remove(LocalFlags::ECHO | LocalFlags::ISIG);
        silent.local_flags.insert(LocalFlags::ECHONL);
        tcsetattr(fd, SetArg::TCSANOW, &silent).map_err(io::Error::from)?;
        Ok(Some(Self { fd, saved }))
    }
}

impl<F: AsFd> Drop for SilentInput<'_, F> {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(self.fd, SetArg::TCSANOW, &self.saved) {
            tracing::warn!(error = %e, "failed to restore terminal settings");
        }
    }
}

/// Replays queued answers. An exhausted queue behaves like a user who
/// cancels every menu and closes input.
#[derive(Debug, Default)]
pub struct Scripted {
    choices: VecDeque<Option<usize>>,
    lines: VecDeque<String>,
    credentials: VecDeque<Credentials>,
    /// Menu titles in the order they were shown.
    pub titles: Vec<String>,
    pub messages: Vec<String>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a menu selection (`None` cancels).
    pub fn pick(mut self, choice: Option<usize>) -> Self {
        self.choices.push_back(choice);
        self
    }

    /// Queue a line of typed input.
    pub fn type_line(mut self, line: &str) -> Self {
        self.lines.push_back(line.to_string());
        self
    }

    pub fn login(mut self, username: &str, password: &str) -> Self {
        self.credentials.push_back(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// True once every queued answer has been used.
    pub fn exhausted(&self) -> bool {
        self.choices.is_empty() && self.lines.is_empty() && self.credentials.is_empty()
    }
}

impl Prompter for Scripted {
    fn choose(&mut self, title: &str, options: &[String]) -> Option<usize> {
        self.titles.push(title.to_string());
        self.choices
            .pop_front()
            .flatten()
            .filter(|&i| i < options.len())
    }

    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

impl CredentialSource for Scripted {
    fn credentials(&mut self, _entry: &ServerEntry) -> io::Result<Option<Credentials>> {
        Ok(self.credentials.pop_front())
    }
}

/// Keeps every output line with its tags.
#[derive(Debug, Default)]
pub struct CollectedOutput {
    pub lines: Vec<(String, String, String)>,
}

impl CollectedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Just the text of each line.
    pub fn text(&self) -> Vec<&str> {
        self.lines.iter().map(|(_, _, l)| l.as_str()).collect()
    }
}

impl OutputSink for CollectedOutput {
    fn line(&mut self, user: &str, subsystem: &str, line: &str) {
        self.lines
            .push((user.to_string(), subsystem.to_string(), line.to_string()));
    }
}
