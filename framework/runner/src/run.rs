use anyhow::Context;

use crate::cli::{Command, QueueBenchCli, RunArgs};
use crate::config::BenchConfig;
use crate::coordinator::{Coordinator, RunOptions};
use crate::driver::ProcessWorkerDriver;
use crate::infra::ComposeInfrastructure;
use crate::operator::TerminalOperator;
use crate::progress::Progress;
use crate::report::worker_table;
use crate::shutdown::start_shutdown_listener;
use crate::store::CommandRecordStore;
use crate::types::BenchResult;

/// Run the command given on the command line.
pub fn run(cli: QueueBenchCli) -> BenchResult<()> {
    let config = BenchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::List { message_count } => {
            println!("{}", worker_table(&config.workers, message_count));
            Ok(())
        }
        Command::Run(args) => run_benchmark(config, &args, !cli.no_progress),
    }
}

fn run_benchmark(config: BenchConfig, args: &RunArgs, show_progress: bool) -> BenchResult<()> {
    log::info!(
        "Benchmarking with {} messages from {}",
        args.message_count,
        config.root().display()
    );

    // Workers are benchmarked strictly one after another, so a single thread drives everything.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);

    let infra = ComposeInfrastructure::new(config.infra.clone(), args.verbose);
    let driver = ProcessWorkerDriver::new(args.verbose);
    let store = CommandRecordStore::new(&config.infra.record_count_command, config.root())?;
    let progress = Progress::new(show_progress);

    let coordinator = Coordinator::new(
        config,
        RunOptions::from(args),
        infra,
        driver,
        store,
        shutdown_handle,
    )
    .with_progress(progress.clone())
    .with_operator(TerminalOperator::new(progress.clone()));

    let result = runtime.block_on(coordinator.run());
    progress.finish();
    // A prompt may still be blocked reading stdin, don't wait for it.
    runtime.shutdown_background();

    let reports = result?;
    println!("{}", coordinator.reporter().summary(&reports));

    Ok(())
}
