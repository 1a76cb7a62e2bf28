use anyhow::Context;
use dataset_builder::{build_dataset, DatasetOptions};

/// For example: `cargo run --bin make-data 10000 $(pwd)/data.txt`
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);

    let count = args
        .next()
        .context("Argument 1 should be: record count")?
        .parse::<u64>()
        .context("Record count must be a non-negative integer")?;
    let path = args.next().unwrap_or_else(|| "data.txt".to_string());

    build_dataset(&DatasetOptions::new(path, count))
}
