use clap::Parser;
use env_logger::Env;

use crate::cli::{Command, QueueBenchCli};

/// Parse the command line and set up logging.
///
/// Logs at `warn` by default, `--verbose` lowers that to `info` so that worker and infrastructure
/// output is shown. `RUST_LOG` takes precedence over both.
pub fn init() -> QueueBenchCli {
    let cli = QueueBenchCli::parse();

    let verbose = matches!(&cli.command, Command::Run(args) if args.verbose);
    env_logger::Builder::from_env(Env::default().default_filter_or(if verbose {
        "info"
    } else {
        "warn"
    }))
    .init();

    cli
}
