/// A worker could not be measured, but the rest of the batch can still run.
///
/// The coordinator turns this into a failure line for the worker and moves on to the next one. Any
/// other error out of a worker iteration ends the whole run.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct WorkerFailedError {
    reason: String,
}

impl WorkerFailedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for WorkerFailedError {
    fn default() -> Self {
        Self::new("Worker failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_reason() {
        let err = WorkerFailedError::new("Output ended before 'Processed 5 messages' was seen");

        assert_eq!(
            "Output ended before 'Processed 5 messages' was seen",
            err.to_string()
        );
    }

    #[test]
    fn can_be_found_in_an_error_chain() {
        let err = anyhow::Error::new(WorkerFailedError::default()).context("Measuring Rust");

        assert!(err.downcast_ref::<WorkerFailedError>().is_some());
    }
}
