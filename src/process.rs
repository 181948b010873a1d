//! Thin wrapper around `std::process::Command` for external tool
//! invocations.
//!
//! Child stdout/stderr are inherited so tool diagnostics (compiler errors,
//! mkfs output) reach the user verbatim. The wrapper adds path-friendly
//! argument handling and a uniform failure message with the offending
//! command line.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// External command builder.
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Message used instead of the generic one when the command fails.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    /// Run to completion with inherited stdio. Non-zero exit is an error.
    pub fn run(self) -> Result<()> {
        let command_line = self.command_line();
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let status = command
            .status()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        if !status.success() {
            match self.error_msg {
                Some(msg) => bail!("{} ({})", msg, status),
                None => bail!("'{}' failed with {}", command_line, status),
            }
        }
        Ok(())
    }

    fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Check whether a tool is on PATH.
pub fn exists(tool: &str) -> bool {
    ::which::which(tool).is_ok()
}

/// Locate a tool on PATH.
pub fn which(tool: &str) -> Option<PathBuf> {
    ::which::which(tool).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_success() {
        Cmd::new("true").run().unwrap();
    }

    #[test]
    fn test_run_failure_uses_error_msg() {
        let err = Cmd::new("false")
            .error_msg("expected failure")
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("expected failure"));
    }

    #[test]
    fn test_run_failure_reports_command_line() {
        let err = Cmd::new("false").arg("--flag").run().unwrap_err();
        assert!(err.to_string().contains("false --flag"));
    }

    #[test]
    fn test_spawn_failure() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[test]
    fn test_exists() {
        assert!(exists("ls"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
