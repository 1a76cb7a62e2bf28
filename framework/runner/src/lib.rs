mod checkpoint;
mod cli;
mod command;
mod config;
mod coordinator;
mod definition;
mod docker;
mod driver;
mod infra;
mod init;
mod monitor;
mod operator;
mod process;
mod progress;
mod report;
mod run;
mod shutdown;
mod store;
mod types;
mod validation;

pub mod prelude {
    pub use crate::checkpoint::{
        checkpoint_phrase, parse_timestamp, CheckpointError, CheckpointMonitor, CheckpointResult,
        Elapsed,
    };
    pub use crate::cli::{Command, QueueBenchCli, RunArgs, WorkerFilter};
    pub use crate::command::CommandLine;
    pub use crate::config::{
        default_workers, BenchConfig, InfraConfig, TimingConfig, DEFAULT_CONFIG_FILE,
    };
    pub use crate::coordinator::{Coordinator, RunOptions};
    pub use crate::definition::{
        check_message_counts, parse_hex_color, select_workers, TimeUnit, WorkerDefinition,
        MESSAGE_COUNT_PLACEHOLDER,
    };
    pub use crate::docker::{docker_path, QB_DOCKER_PATH_ENV};
    pub use crate::driver::{ProcessWorkerDriver, WorkerDriver};
    pub use crate::infra::{ComposeInfrastructure, InfraHandle, Infrastructure};
    pub use crate::init::init;
    pub use crate::operator::{Operator, TerminalOperator};
    pub use crate::process::{Cancel, OutputOptions, OutputStream, RunHandle, WorkerProcess};
    pub use crate::progress::Progress;
    pub use crate::report::{worker_table, Reporter, WorkerOutcome, WorkerReport};
    pub use crate::run::run;
    pub use crate::store::{CommandRecordStore, RecordStore};
    pub use crate::types::BenchResult;
    pub use crate::validation::{settle_and_validate, ValidationOutcome};
    pub use queue_bench_core::prelude::{ShutdownHandle, ShutdownSignalError, WorkerFailedError};
}
