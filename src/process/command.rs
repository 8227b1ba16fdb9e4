//! Command description handed to a [`ProcessLauncher`](super::ProcessLauncher).

use std::borrow::Cow;
use std::path::PathBuf;

use super::SpawnError;

/// Shell used when `$SHELL` is unset.
const FALLBACK_SHELL: &str = "/bin/sh";

/// Program, arguments, working directory and environment for one spawn.
///
/// Built once per role and reused for every restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Run `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Split a literal command line on whitespace and append `extra` verbatim.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::EmptyCommand` if the line contains no program.
    pub fn from_line(line: &str, extra: &[String]) -> Result<Self, SpawnError> {
        let mut parts = line.split_whitespace();
        let program = parts.next().ok_or(SpawnError::EmptyCommand)?;
        Ok(Self::new(program)
            .args(parts)
            .args(extra.iter().map(String::as_str)))
    }

    /// Run the command line through the user's shell with `-c`.
    ///
    /// Extra arguments are shell-escaped before being appended so that
    /// tokens and paths survive the shell's word splitting.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::EmptyCommand` if the line is blank.
    pub fn from_shell_line(line: &str, extra: &[String]) -> Result<Self, SpawnError> {
        if line.trim().is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        let mut script = line.trim().to_string();
        for arg in extra {
            script.push(' ');
            script.push_str(&shell_escape::escape(Cow::Borrowed(arg.as_str())));
        }

        Ok(Self::new(shell_program()).arg("-c").arg(script))
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    #[must_use]
    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Human-readable command line, used in log and error messages.
    #[must_use]
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_program() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}
