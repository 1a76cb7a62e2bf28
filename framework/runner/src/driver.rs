use anyhow::Context;

use crate::command::CommandLine;
use crate::definition::WorkerDefinition;
use crate::process::{OutputOptions, RunHandle, WorkerProcess};
use crate::types::BenchResult;

/// Builds and launches worker implementations.
#[allow(async_fn_in_trait)]
pub trait WorkerDriver {
    type Handle: WorkerProcess;

    /// Run the worker's build command to completion. A failed build is an error.
    async fn build(&self, worker: &WorkerDefinition) -> BenchResult<()>;

    /// Launch the worker for `message_count` messages without waiting for it.
    fn run(&self, worker: &WorkerDefinition, message_count: u64) -> BenchResult<Self::Handle>;
}

/// Runs workers as local subprocesses in their working directory.
#[derive(Debug, Clone, Default)]
pub struct ProcessWorkerDriver {
    echo: bool,
}

impl ProcessWorkerDriver {
    /// With `echo`, worker output is logged at `info` under `worker::<id>`.
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }
}

impl WorkerDriver for ProcessWorkerDriver {
    type Handle = RunHandle;

    async fn build(&self, worker: &WorkerDefinition) -> BenchResult<()> {
        log::info!("Building {}", worker.name);

        CommandLine::parse(&worker.build_command)?
            .run_to_completion(&worker.cwd)
            .await
            .with_context(|| format!("Failed to build {}", worker.name))?;

        Ok(())
    }

    fn run(&self, worker: &WorkerDefinition, message_count: u64) -> BenchResult<RunHandle> {
        let command = CommandLine::parse(&worker.run_command(message_count))?;

        log::info!("Starting {} for {message_count} messages", worker.name);
        RunHandle::spawn(
            format!("worker::{}", worker.id),
            &command,
            &worker.cwd,
            OutputOptions {
                forward: true,
                echo: self.echo,
            },
        )
        .with_context(|| format!("Failed to start {}", worker.name))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::config::default_workers;
    use crate::process::Cancel;

    fn worker(dir: &std::path::Path, build: &str, run: &str) -> WorkerDefinition {
        let mut worker = default_workers().remove(0);
        worker.cwd = dir.to_path_buf();
        worker.build_command = build.to_string();
        worker.run_command = run.to_string();
        worker
    }

    #[tokio::test]
    async fn build_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), "touch built", "echo {count}");

        ProcessWorkerDriver::default()
            .build(&worker)
            .await
            .expect("build should succeed");

        assert!(dir.path().join("built").exists());
    }

    #[tokio::test]
    async fn failed_build_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), "false", "echo {count}");

        let err = ProcessWorkerDriver::default()
            .build(&worker)
            .await
            .unwrap_err();

        assert_eq!("Failed to build Rust", err.to_string());
    }

    #[tokio::test]
    async fn run_substitutes_message_count() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(dir.path(), "true", "echo Processed {count} messages");

        let mut handle = ProcessWorkerDriver::default().run(&worker, 42).unwrap();
        let lines = handle.output().collect::<Vec<_>>().await;
        handle.cancel();

        assert_eq!(vec!["Processed 42 messages".to_string()], lines);
    }
}
