/// Result type used across the runner. Fatal errors are carried to `main` through it, per-worker
/// failures are converted into report lines by the coordinator before they get that far.
pub type BenchResult<T> = anyhow::Result<T>;
