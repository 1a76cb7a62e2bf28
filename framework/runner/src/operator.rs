use anyhow::Context;

use crate::progress::Progress;
use crate::types::BenchResult;

/// The person running the benchmark, for the points where a run waits on them.
#[allow(async_fn_in_trait)]
pub trait Operator {
    /// Show `prompt` and return once the operator has pressed Enter.
    async fn wait_for_enter(&self, prompt: &str) -> BenchResult<()>;
}

/// Prompts on stdout and reads a line from stdin.
///
/// The spinner is suspended for the whole prompt so that it doesn't draw over what is typed.
#[derive(Clone)]
pub struct TerminalOperator {
    progress: Progress,
}

impl TerminalOperator {
    pub fn new(progress: Progress) -> Self {
        Self { progress }
    }
}

impl Operator for TerminalOperator {
    async fn wait_for_enter(&self, prompt: &str) -> BenchResult<()> {
        let _suspended = self.progress.suspend();
        println!("{prompt}");

        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await
        .context("Failed to wait for input")?
        .context("Failed to read from stdin")
    }
}
