use queue_bench_runner::prelude::{init, run};

fn main() -> anyhow::Result<()> {
    let cli = init();

    run(cli)
}
