use std::future::Future;

use anyhow::Context;
use chrono::Local;
use dataset_builder::{build_dataset, DatasetOptions};
use queue_bench_core::prelude::WorkerFailedError;

use crate::checkpoint::CheckpointMonitor;
use crate::cli::{RunArgs, WorkerFilter};
use crate::config::BenchConfig;
use crate::definition::{check_message_counts, select_workers, WorkerDefinition};
use crate::driver::WorkerDriver;
use crate::infra::Infrastructure;
use crate::monitor::ResourceMonitor;
use crate::operator::{Operator, TerminalOperator};
use crate::process::{Cancel, WorkerProcess};
use crate::progress::Progress;
use crate::report::{Reporter, WorkerOutcome, WorkerReport};
use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
use crate::store::RecordStore;
use crate::types::BenchResult;
use crate::validation::settle_and_validate;

/// The choices made on the command line for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Message count for the reference worker.
    pub message_count: u64,
    pub filter: WorkerFilter,
    /// Build each worker against running infrastructure, then pause instead of running it.
    pub dont_run: bool,
    /// Wait for the operator before moving on to the next worker.
    pub confirm: bool,
}

impl From<&RunArgs> for RunOptions {
    fn from(args: &RunArgs) -> Self {
        Self {
            message_count: args.message_count,
            filter: args.worker_filter(),
            dont_run: args.dont_run,
            confirm: args.confirm,
        }
    }
}

/// Benchmarks the selected workers one at a time.
///
/// Each worker goes through the same lifecycle: clean, generate the dataset, start the
/// infrastructure, build, warm up, trigger the load, wait for the checkpoint, validate, report and
/// tear down. Teardown runs on every path out of an iteration once the infrastructure has been
/// started, including errors and Ctrl-C.
///
/// Errors while measuring a worker are reported against that worker and the batch carries on.
/// Anything else, such as a failed build or infrastructure that won't stop, ends the run.
pub struct Coordinator<I, D, S, O = TerminalOperator> {
    config: BenchConfig,
    options: RunOptions,
    infra: I,
    driver: D,
    store: S,
    operator: O,
    progress: Progress,
    reporter: Reporter,
    // Held so that the listener doesn't see a closed channel.
    _shutdown_handle: ShutdownHandle,
    shutdown_listener: DelegatedShutdownListener,
}

impl<I, D, S> Coordinator<I, D, S> {
    /// A coordinator that prompts on the terminal when it needs the operator.
    pub fn new(
        config: BenchConfig,
        options: RunOptions,
        infra: I,
        driver: D,
        store: S,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        let shutdown_listener = shutdown_handle.new_listener();
        let reporter = Reporter::new(options.message_count);

        Self {
            config,
            options,
            infra,
            driver,
            store,
            operator: TerminalOperator::new(Progress::hidden()),
            progress: Progress::hidden(),
            reporter,
            _shutdown_handle: shutdown_handle,
            shutdown_listener,
        }
    }
}

impl<I, D, S, O> Coordinator<I, D, S, O> {
    pub fn with_operator<P: Operator>(self, operator: P) -> Coordinator<I, D, S, P> {
        Coordinator {
            config: self.config,
            options: self.options,
            infra: self.infra,
            driver: self.driver,
            store: self.store,
            operator,
            progress: self.progress,
            reporter: self.reporter,
            _shutdown_handle: self._shutdown_handle,
            shutdown_listener: self.shutdown_listener,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

impl<I, D, S, O> Coordinator<I, D, S, O>
where
    I: Infrastructure,
    D: WorkerDriver,
    S: RecordStore,
    O: Operator,
{
    /// Benchmark every selected worker in configuration order and return their reports.
    pub async fn run(&self) -> BenchResult<Vec<WorkerReport>> {
        let workers = select_workers(&self.config.workers, &self.options.filter)?;
        check_message_counts(&workers, self.options.message_count)?;

        self.progress.phase("Preparing environment");
        self.infra.prepare().await?;

        let mut reports = Vec::with_capacity(workers.len());
        for (index, worker) in workers.iter().enumerate() {
            if index > 0 && self.options.confirm {
                self.wait_for_enter(&format!("Press Enter to benchmark {}", worker.name))
                    .await?;
            }

            let report = self.benchmark(worker).await?;
            self.progress.println(self.reporter.line(worker, &report));
            reports.push(report);
        }

        Ok(reports)
    }

    async fn benchmark(&self, worker: &WorkerDefinition) -> BenchResult<WorkerReport> {
        let message_count = worker.message_count(self.options.message_count);
        log::info!("Benchmarking {} with {message_count} messages", worker.name);

        self.progress.phase("Cleaning and starting environment");
        self.infra.clean().await?;

        build_dataset(&DatasetOptions::new(&self.config.dataset_path, message_count))
            .with_context(|| format!("Failed to generate the dataset for {}", worker.name))?;

        let mut infra_handle = self.infra.start()?;
        let mut worker_handle = None;

        let outcome = self
            .exercise(worker, message_count, &mut worker_handle)
            .await;

        self.progress.phase(format!("Tearing down {}", worker.name));
        if let Some(mut handle) = worker_handle {
            handle.cancel();
        }
        infra_handle.cancel();
        let stopped = self.infra.stop().await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => match e.downcast::<WorkerFailedError>() {
                Ok(failed) => {
                    log::warn!("Failed to measure {}: {failed}", worker.name);
                    WorkerOutcome::Failed {
                        reason: failed.reason().to_string(),
                    }
                }
                Err(e) => {
                    if let Err(stop_err) = stopped {
                        log::error!("Failed to stop the infrastructure: {stop_err:?}");
                    }
                    return Err(e);
                }
            },
        };
        stopped?;

        Ok(WorkerReport {
            worker_id: worker.id.clone(),
            worker_name: worker.name.clone(),
            message_count,
            outcome,
        })
    }

    /// Everything between starting the infrastructure and tearing it down. A launched worker is
    /// left in `worker_handle` for the caller to cancel.
    async fn exercise(
        &self,
        worker: &WorkerDefinition,
        message_count: u64,
        worker_handle: &mut Option<D::Handle>,
    ) -> BenchResult<WorkerOutcome> {
        let timing = &self.config.timing;

        self.progress.phase(format!("Building {}", worker.name));
        self.until_shutdown(self.driver.build(worker)).await??;

        if self.options.dont_run {
            self.pause_for_inspection(worker).await?;
            return Ok(WorkerOutcome::Inspected);
        }

        self.progress.phase("Waiting for the infrastructure to warm up");
        self.until_shutdown(tokio::time::sleep(timing.infra_warmup()))
            .await?;

        self.progress.phase(format!("Starting {}", worker.name));
        let handle = worker_handle.insert(
            self.driver
                .run(worker, message_count)
                .map_err(worker_failure)?,
        );

        self.progress
            .phase(format!("Waiting for {} to warm up", worker.name));
        self.until_shutdown(tokio::time::sleep(timing.worker_warmup()))
            .await?;

        let monitor = ResourceMonitor::start(&worker.name)
            .inspect_err(|e| log::warn!("Resource monitor not available: {e:?}"))
            .ok();

        let outcome = self.measure(worker, message_count, handle).await;

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        outcome
    }

    async fn measure(
        &self,
        worker: &WorkerDefinition,
        message_count: u64,
        handle: &mut D::Handle,
    ) -> BenchResult<WorkerOutcome> {
        let timing = &self.config.timing;
        let checkpoint = CheckpointMonitor::new(message_count, &worker.timestamp_pattern)?;

        let started_at = Local::now().fixed_offset();

        self.progress
            .phase(format!("Loading {message_count} messages for {}", worker.name));
        self.until_shutdown(self.infra.trigger_load(&worker.id))
            .await?
            .map_err(worker_failure)?;

        self.progress.phase(format!("Executing {}", worker.name));
        let reached = self
            .until_shutdown(checkpoint.wait_with_timeout(handle.output(), timing.checkpoint_timeout()))
            .await?
            .map_err(worker_failure)?;
        // The worker keeps running until teardown, its output is still read but no longer kept.
        handle.output().close();

        let elapsed = reached.elapsed_since(started_at, worker.time_unit);
        log::info!(
            "{} reached the checkpoint at {} after {elapsed}",
            worker.name,
            reached.timestamp
        );

        self.progress.phase(format!("Validating {}", worker.name));
        let validation = self
            .until_shutdown(settle_and_validate(
                &self.store,
                message_count,
                timing.settle(),
                timing.settle_attempts,
            ))
            .await?
            .map_err(worker_failure)?;

        Ok(WorkerOutcome::Completed {
            elapsed,
            validation,
        })
    }

    async fn pause_for_inspection(&self, worker: &WorkerDefinition) -> BenchResult<()> {
        match self.config.timing.dont_run_pause() {
            Some(pause) => {
                self.progress.phase(format!(
                    "{} is built, pausing for {}s before teardown",
                    worker.name,
                    pause.as_secs()
                ));
                self.until_shutdown(tokio::time::sleep(pause)).await
            }
            None => {
                self.progress
                    .phase(format!("{} is built and paused for inspection", worker.name));
                self.wait_for_enter("Press Enter to tear down, or Ctrl-C to stop").await
            }
        }
    }

    async fn wait_for_enter(&self, prompt: &str) -> BenchResult<()> {
        self.until_shutdown(self.operator.wait_for_enter(prompt)).await?
    }

    /// Run `fut` unless a shutdown signal arrives first, in which case it is dropped. A signal that
    /// is already pending wins over `fut`.
    async fn until_shutdown<F: Future>(&self, fut: F) -> BenchResult<F::Output> {
        let mut listener = self.shutdown_listener.clone();

        tokio::select! {
            biased;
            _ = listener.wait_for_shutdown() => {
                log::warn!("Shutdown requested, tearing down");
                Err(ShutdownSignalError::default().into())
            }
            output = fut => Ok(output),
        }
    }
}

/// Mark an error as affecting only the current worker.
fn worker_failure<E: Into<anyhow::Error>>(e: E) -> anyhow::Error {
    let e = e.into();
    if e.is::<ShutdownSignalError>() {
        return e;
    }

    WorkerFailedError::new(format!("{e:#}")).into()
}
