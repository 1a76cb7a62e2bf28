use anyhow::Context;

use crate::command::CommandLine;
use crate::config::InfraConfig;
use crate::process::{Cancel, OutputOptions, RunHandle};
use crate::types::BenchResult;

/// The shared services that every worker is benchmarked against.
#[allow(async_fn_in_trait)]
pub trait Infrastructure {
    type Handle: Cancel;

    /// One-off preparation before the first worker is benchmarked.
    async fn prepare(&self) -> BenchResult<()>;

    /// Bring down anything left over from a previous run. Nothing running is not an error.
    async fn clean(&self) -> BenchResult<()>;

    /// Launch the services and return without waiting for them to be ready.
    fn start(&self) -> BenchResult<Self::Handle>;

    /// Load the dataset into the queue, addressed to `topic`.
    async fn trigger_load(&self, topic: &str) -> BenchResult<()>;

    /// Shut the services down and wait for that to complete. Safe to call when nothing is running.
    async fn stop(&self) -> BenchResult<()>;
}

/// The enrichment service and the compose stack, started together and cancelled together.
#[derive(Debug)]
pub struct InfraHandle {
    endpoint: RunHandle,
    stack: RunHandle,
}

impl Cancel for InfraHandle {
    fn cancel(&mut self) {
        self.endpoint.cancel();
        self.stack.cancel();
    }
}

/// Infrastructure driven by a compose file and a locally started enrichment service.
#[derive(Debug, Clone)]
pub struct ComposeInfrastructure {
    config: InfraConfig,
    echo: bool,
}

impl ComposeInfrastructure {
    /// With `echo`, the output of the services is logged at `info` under `infra::endpoint` and
    /// `infra::stack`.
    pub fn new(config: InfraConfig, echo: bool) -> Self {
        Self { config, echo }
    }

    fn compose(&self, subcommand: &str) -> BenchResult<CommandLine> {
        Ok(CommandLine::parse(&self.config.compose_command)?.with_args([subcommand]))
    }

    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            forward: false,
            echo: self.echo,
        }
    }

    async fn compose_down(&self) -> BenchResult<()> {
        self.compose("down")?
            .run_to_completion(&self.config.compose_dir)
            .await
            .context("Failed to bring down the infrastructure")?;

        Ok(())
    }
}

impl Infrastructure for ComposeInfrastructure {
    type Handle = InfraHandle;

    async fn prepare(&self) -> BenchResult<()> {
        if self.config.endpoint_prepare_command.trim().is_empty() {
            return Ok(());
        }

        CommandLine::parse(&self.config.endpoint_prepare_command)?
            .run_to_completion(&self.config.endpoint_dir)
            .await
            .context("Failed to prepare the enrichment service")?;

        Ok(())
    }

    async fn clean(&self) -> BenchResult<()> {
        log::debug!("Cleaning up infrastructure from any previous run");
        self.compose_down().await
    }

    fn start(&self) -> BenchResult<InfraHandle> {
        let mut endpoint = RunHandle::spawn(
            "infra::endpoint",
            &CommandLine::parse(&self.config.endpoint_start_command)?,
            &self.config.endpoint_dir,
            self.output_options(),
        )
        .context("Failed to start the enrichment service")?;

        let stack = self.compose("up").and_then(|command| {
            RunHandle::spawn(
                "infra::stack",
                &command,
                &self.config.compose_dir,
                self.output_options(),
            )
        });
        let stack = match stack {
            Ok(stack) => stack,
            Err(e) => {
                endpoint.cancel();
                return Err(e.context("Failed to start the infrastructure stack"));
            }
        };

        Ok(InfraHandle { endpoint, stack })
    }

    async fn trigger_load(&self, topic: &str) -> BenchResult<()> {
        log::debug!("Loading dataset for topic '{topic}'");

        CommandLine::parse("docker")?
            .with_args([
                "exec",
                self.config.queue_container.as_str(),
                "sh",
                self.config.load_script.as_str(),
                topic,
            ])
            .run_to_completion(&self.config.compose_dir)
            .await
            .with_context(|| format!("Failed to load the dataset for '{topic}'"))?;

        Ok(())
    }

    async fn stop(&self) -> BenchResult<()> {
        log::debug!("Stopping infrastructure");
        self.compose_down().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn config(dir: &std::path::Path, compose_command: &str) -> InfraConfig {
        InfraConfig {
            compose_dir: dir.to_path_buf(),
            compose_command: compose_command.to_string(),
            endpoint_dir: dir.to_path_buf(),
            endpoint_prepare_command: "true".to_string(),
            endpoint_start_command: "sleep 30".to_string(),
            ..InfraConfig::default()
        }
    }

    #[tokio::test]
    async fn stop_succeeds_when_down_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let infra = ComposeInfrastructure::new(config(dir.path(), "true"), false);

        infra.clean().await.expect("clean should succeed");
        infra.stop().await.expect("stop should succeed");
    }

    #[tokio::test]
    async fn stop_fails_when_down_fails() {
        let dir = tempfile::tempdir().unwrap();
        let infra = ComposeInfrastructure::new(config(dir.path(), "false"), false);

        assert!(infra.stop().await.is_err());
    }

    #[tokio::test]
    async fn prepare_skips_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "true");
        config.endpoint_prepare_command = String::new();
        let infra = ComposeInfrastructure::new(config, false);

        infra.prepare().await.expect("prepare should be skipped");
    }

    #[tokio::test]
    async fn start_returns_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let infra = ComposeInfrastructure::new(config(dir.path(), "sleep"), false);

        let started = Instant::now();
        let mut handle = infra.start().expect("start should succeed");
        assert!(started.elapsed() < Duration::from_secs(5));

        handle.cancel();
        handle.cancel();
    }

    #[tokio::test]
    async fn start_fails_for_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "true");
        config.endpoint_start_command = "queue-bench-no-such-program".to_string();
        let infra = ComposeInfrastructure::new(config, false);

        assert!(infra.start().is_err());
    }
}
