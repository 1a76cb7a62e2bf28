use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct QueueBenchCli {
    /// Path to a TOML file describing the workers and infrastructure.
    ///
    /// If not provided, `queue-bench.toml` in the current directory is used when it exists and the
    /// built-in defaults otherwise.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not show a progress spinner on the CLI.
    ///
    /// This is recommended for CI/CD environments where the spinner isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, global = true, default_value = "false")]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Benchmark the configured workers one after another
    Run(RunArgs),
    /// Print the configured workers and the number of messages each would process
    List {
        /// The global message count used to compute each worker's share
        message_count: Option<u64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The number of messages for the reference worker. Other workers process this count divided
    /// by their configured divisor.
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub message_count: u64,

    /// Only benchmark the worker with this id or source directory.
    ///
    /// Values that look like a flag are treated as no worker at all.
    #[clap(value_parser = parse_worker_filter)]
    pub worker: Option<WorkerFilter>,

    /// Echo the output of workers and infrastructure
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,

    /// Set up the infrastructure and build each worker, then pause for manual inspection instead
    /// of running the worker
    #[clap(long, default_value = "false")]
    pub dont_run: bool,

    /// Wait for confirmation before moving on to the next worker
    #[clap(short, long, default_value = "false")]
    pub confirm: bool,
}

/// Restricts a run to a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerFilter {
    All,
    Only(String),
}

impl WorkerFilter {
    pub fn only(&self) -> Option<&str> {
        match self {
            WorkerFilter::All => None,
            WorkerFilter::Only(name) => Some(name),
        }
    }
}

fn parse_worker_filter(s: &str) -> anyhow::Result<WorkerFilter> {
    if s.is_empty() || s.starts_with('-') {
        Ok(WorkerFilter::All)
    } else {
        Ok(WorkerFilter::Only(s.to_string()))
    }
}

impl RunArgs {
    pub fn worker_filter(&self) -> WorkerFilter {
        self.worker.clone().unwrap_or(WorkerFilter::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> QueueBenchCli {
        QueueBenchCli::try_parse_from(std::iter::once("queue-bench").chain(args.iter().copied()))
            .expect("failed to parse arguments")
    }

    fn run_args(cli: QueueBenchCli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn parse_message_count_only() {
        let args = run_args(parse(&["run", "1000"]));

        assert_eq!(1000, args.message_count);
        assert_eq!(WorkerFilter::All, args.worker_filter());
        assert!(!args.verbose);
        assert!(!args.dont_run);
        assert!(!args.confirm);
    }

    #[test]
    fn parse_worker_and_flags() {
        let args = run_args(parse(&["run", "1000", "rust", "-v", "--dont-run", "-c"]));

        assert_eq!(WorkerFilter::Only("rust".to_string()), args.worker_filter());
        assert!(args.verbose);
        assert!(args.dont_run);
        assert!(args.confirm);
    }

    #[test]
    fn flag_in_worker_position_is_not_a_worker() {
        let args = run_args(parse(&["run", "1000", "--verbose"]));

        assert_eq!(WorkerFilter::All, args.worker_filter());
        assert!(args.verbose);
    }

    #[test]
    fn parse_global_options() {
        let cli = parse(&["--no-progress", "--config", "bench.toml", "list"]);

        assert!(cli.no_progress);
        assert_eq!(Some(PathBuf::from("bench.toml")), cli.config);
        assert!(matches!(cli.command, Command::List { message_count: None }));
    }

    #[test]
    fn message_count_is_required() {
        assert!(QueueBenchCli::try_parse_from(["queue-bench", "run"]).is_err());
    }

    #[test]
    fn zero_message_count_is_rejected() {
        assert!(QueueBenchCli::try_parse_from(["queue-bench", "run", "0"]).is_err());
    }
}
