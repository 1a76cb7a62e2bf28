use std::path::PathBuf;

use anyhow::Context;

use crate::command::CommandLine;
use crate::types::BenchResult;

/// The database that workers persist their results to.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// The number of records stored so far.
    async fn count(&self) -> BenchResult<u64>;
}

/// Counts records by running a command that prints the count as its last line of output.
#[derive(Debug, Clone)]
pub struct CommandRecordStore {
    command: CommandLine,
    cwd: PathBuf,
}

impl CommandRecordStore {
    pub fn new(command: &str, cwd: impl Into<PathBuf>) -> BenchResult<Self> {
        Ok(Self {
            command: CommandLine::parse(command)?,
            cwd: cwd.into(),
        })
    }
}

impl RecordStore for CommandRecordStore {
    async fn count(&self) -> BenchResult<u64> {
        let output = self
            .command
            .run_to_completion(&self.cwd)
            .await
            .context("Failed to count stored records")?;

        parse_count(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_count(stdout: &str) -> BenchResult<u64> {
    let last = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .context("Record count command printed nothing")?;

    last.parse::<u64>()
        .with_context(|| format!("Record count command printed '{last}', expected a number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_uses_last_line() {
        assert_eq!(480, parse_count("Current Mongosh Log ID: 1234\n480\n\n").unwrap());
    }

    #[test]
    fn parse_count_rejects_non_numbers() {
        assert!(parse_count("MongoServerError: Authentication failed.\n").is_err());
        assert!(parse_count("").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn count_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommandRecordStore::new("echo 510", dir.path()).unwrap();

        assert_eq!(510, store.count().await.unwrap());
    }
}
