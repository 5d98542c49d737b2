//! External command execution with consistent error handling.
//!
//! Every call to a system tool (container runtime, object-storage client,
//! `curl`, `gpg`, step scripts) goes through [`Cmd`] so failures carry the
//! program name, exit code and captured stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use crate::error::{HostkeepError, HostkeepResult};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    stdin_file: Option<PathBuf>,
    stdout_file: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin_file: None,
            stdout_file: None,
            allow_fail: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Feed a file to the child's stdin.
    pub fn stdin_from(mut self, path: &Path) -> Self {
        self.stdin_file = Some(path.to_path_buf());
        self
    }

    /// Stream the child's stdout into a file instead of capturing it.
    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_file = Some(path.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human-readable command line, for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the command and capture output.
    pub fn run(self) -> HostkeepResult<CommandResult> {
        debug!(command = %self.display(), "running command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(ref input) = self.stdin_file {
            let file = std::fs::File::open(input).map_err(|e| {
                HostkeepError::Io(format!("Failed to open {}: {}", input.display(), e))
            })?;
            cmd.stdin(Stdio::from(file));
        } else {
            cmd.stdin(Stdio::null());
        }
        if let Some(ref output) = self.stdout_file {
            let file = std::fs::File::create(output).map_err(|e| {
                HostkeepError::Io(format!("Failed to create {}: {}", output.display(), e))
            })?;
            cmd.stdout(Stdio::from(file));
        }

        let output = cmd.output().map_err(|e| {
            HostkeepError::Io(format!(
                "Failed to execute '{}'. Is it installed? ({})",
                self.program, e
            ))
        })?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            return Err(HostkeepError::Command {
                program: self.program,
                code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            });
        }

        Ok(result)
    }
}

/// Whether a program is reachable on `PATH`.
pub fn exists(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
