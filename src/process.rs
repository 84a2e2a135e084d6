//! Running the installer and streaming its output.
//!
//! Stdout and stderr share one pipe, so lines reach the caller in the order
//! the installer wrote them. Once the stream ends, [`InstallerProcess::wait`]
//! yields the exit status.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use thiserror::Error;

/// A running installer. Iterate it for output lines, then call `wait`.
#[derive(Debug)]
pub struct InstallerProcess {
    child: Child,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl InstallerProcess {
    /// Spawn `argv[0]` with the remaining arguments.
    pub fn spawn(argv: &[String]) -> Result<Self, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::from_command(cmd)
    }

    /// Spawn a prepared command. Stdout and stderr are captured together; stdin
    /// stays attached to the terminal so the installer can ask for a Steam Guard code.
    pub fn from_command(mut cmd: Command) -> Result<Self, ProcessError> {
        let (output, writer) = io::pipe().map_err(ProcessError::Pipe)?;
        let stderr = writer.try_clone().map_err(ProcessError::Pipe)?;
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr));

        let program = cmd.get_program().to_string_lossy().into_owned();
        let spawned = cmd.spawn();
        // The command still owns the write ends; the reader sees EOF only once
        // they are closed here and the child has exited.
        drop(cmd);
        let child = spawned.map_err(|source| ProcessError::Spawn { source, program })?;

        let (tx, rx) = mpsc::channel();
        let reader = forward_lines(output, tx);

        Ok(Self {
            child,
            lines: rx,
            reader: Some(reader),
        })
    }

    /// Wait for the installer to exit. Any output not yet consumed is discarded.
    pub fn wait(mut self) -> Result<ExitStatus, ProcessError> {
        while self.lines.recv().is_ok() {}
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.child.wait().map_err(ProcessError::Wait)
    }
}

impl Iterator for InstallerProcess {
    type Item = String;

    /// Blocks until the next line arrives; `None` once the output pipe is closed.
    fn next(&mut self) -> Option<String> {
        self.lines.recv().ok()
    }
}

fn forward_lines<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "installer output stream failed");
                    break;
                }
            }
        }
    })
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("No installer command to run")]
    EmptyCommand,
    #[error("Failed to create installer output pipe: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("Failed to start {program}: {source}")]
    Spawn {
        source: std::io::Error,
        program: String,
    },
    #[error("Failed waiting for installer: {0}")]
    Wait(#[source] std::io::Error),
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> InstallerProcess {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        InstallerProcess::from_command(cmd).unwrap()
    }

    #[test]
    fn merges_stdout_and_stderr() {
        let mut child = sh("echo one; echo two >&2; echo three; exit 3");
        let lines: Vec<String> = child.by_ref().collect();
        assert_eq!(lines, ["one", "two", "three"]);

        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn interleaved_streams_keep_write_order() {
        let script = "i=0; while [ $i -lt 200 ]; do echo $i; i=$((i+1)); echo $i >&2; i=$((i+1)); done";
        for _ in 0..5 {
            let mut child = sh(script);
            let lines: Vec<String> = child.by_ref().collect();
            let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
            assert_eq!(lines, expected);
            assert!(child.wait().unwrap().success());
        }
    }

    #[test]
    fn stream_ends_when_child_exits() {
        let mut child = sh("echo done");
        assert_eq!(child.next().as_deref(), Some("done"));
        assert_eq!(child.next(), None);
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn strips_line_endings_and_keeps_unterminated_tail() {
        let mut child = sh(r"printf 'Update state (0x61) downloading\r\nSuccess!'");
        let lines: Vec<String> = child.by_ref().collect();
        assert_eq!(lines, ["Update state (0x61) downloading", "Success!"]);
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn wait_without_reading_output() {
        let child = sh("for i in 1 2 3 4 5; do echo line $i; done");
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let argv = vec!["/nonexistent/steamcmd.sh".to_string(), "+quit".to_string()];
        let err = InstallerProcess::spawn(&argv).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { ref program, .. } if program == "/nonexistent/steamcmd.sh"));
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(matches!(InstallerProcess::spawn(&[]), Err(ProcessError::EmptyCommand)));
    }
}
