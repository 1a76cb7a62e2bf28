use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use anyhow::{bail, Context};
use tokio::process::Command;

use crate::docker::docker_path;
use crate::types::BenchResult;

/// Number of trailing output lines included in the error when a command fails.
const FAILURE_OUTPUT_LINES: usize = 20;

/// A command line from the configuration, split on whitespace.
///
/// There is no shell involved, so quoting and pipes are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn parse(command: &str) -> BenchResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .with_context(|| format!("Command '{command}' is empty"))?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Append arguments to the command line.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a [Command] that runs in `cwd`.
    ///
    /// The process is killed if the returned command, or the child spawned from it, is dropped.
    pub fn command(&self, cwd: &Path) -> BenchResult<Command> {
        let mut cmd = Command::new(self.resolve_program()?);
        cmd.args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        Ok(cmd)
    }

    /// Run the command to completion, capturing its output.
    ///
    /// Fails if the command cannot be started or exits with a non-zero status. The error includes
    /// the tail of the command's output.
    pub async fn run_to_completion(&self, cwd: &Path) -> BenchResult<Output> {
        log::debug!("Running `{self}` in {}", cwd.display());

        let output = self
            .command(cwd)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run `{self}` in {}", cwd.display()))?;

        if !output.status.success() {
            bail!(
                "`{self}` failed with {status}{tail}",
                status = output.status,
                tail = output_tail(&output)
            );
        }

        Ok(output)
    }

    fn resolve_program(&self) -> BenchResult<PathBuf> {
        if self.program == "docker" {
            docker_path()
        } else {
            Ok(PathBuf::from(&self.program))
        }
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn output_tail(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let lines = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return String::new();
    }

    let start = lines.len().saturating_sub(FAILURE_OUTPUT_LINES);
    format!(":\n{}", lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let command = CommandLine::parse("  java -jar  build/libs/demo.jar --count=10 ").unwrap();

        assert_eq!("java", command.program);
        assert_eq!(vec!["-jar", "build/libs/demo.jar", "--count=10"], command.args);
        assert_eq!("java -jar build/libs/demo.jar --count=10", command.to_string());
    }

    #[test]
    fn parse_empty_command_is_an_error() {
        assert!(CommandLine::parse("   ").is_err());
    }

    #[test]
    fn with_args_appends() {
        let command = CommandLine::parse("docker-compose")
            .unwrap()
            .with_args(["down"]);

        assert_eq!("docker-compose down", command.to_string());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_to_completion_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let output = CommandLine::parse("echo hello")
            .unwrap()
            .run_to_completion(dir.path())
            .await
            .expect("echo should succeed");

        assert_eq!("hello\n", String::from_utf8_lossy(&output.stdout));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_to_completion_fails_on_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandLine::parse("false")
            .unwrap()
            .run_to_completion(dir.path())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("`false` failed with"), "{err}");
    }

    #[tokio::test]
    async fn run_to_completion_fails_on_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = CommandLine::parse("queue-bench-no-such-program")
            .unwrap()
            .run_to_completion(dir.path())
            .await;

        assert!(result.is_err());
    }
}
