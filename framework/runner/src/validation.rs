use std::time::Duration;

use crate::store::RecordStore;
use crate::types::BenchResult;

/// How many records a worker stored compared to how many it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub actual: u64,
    pub expected: u64,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.actual >= self.expected
    }
}

/// Wait for the worker's writes to land, then compare the stored record count with `expected`.
///
/// The count is checked up to `attempts` times, `settle` apart, and the wait ends early once the
/// count reaches `expected`. The last count read is the outcome. A failing count is retried, the
/// error is only returned if the last attempt also fails.
pub async fn settle_and_validate<S: RecordStore>(
    store: &S,
    expected: u64,
    settle: Duration,
    attempts: u32,
) -> BenchResult<ValidationOutcome> {
    let attempts = attempts.max(1);
    let mut outcome = None;

    for attempt in 1..=attempts {
        tokio::time::sleep(settle).await;

        match store.count().await {
            Ok(actual) => {
                log::debug!("Validation attempt {attempt}/{attempts}: {actual} of {expected} records");
                let current = ValidationOutcome { actual, expected };
                if current.passed() {
                    return Ok(current);
                }
                outcome = Some(current);
            }
            Err(e) if attempt == attempts => match outcome {
                Some(outcome) => {
                    log::warn!("Failed to count records, using the previous count: {e:?}");
                    return Ok(outcome);
                }
                None => return Err(e),
            },
            Err(e) => log::warn!("Failed to count records on attempt {attempt}: {e:?}"),
        }
    }

    Ok(outcome.unwrap_or(ValidationOutcome {
        actual: 0,
        expected,
    }))
}
