//! Detects the point at which a worker reports that it has processed all of its messages.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use futures::{Stream, StreamExt};
use regex::Regex;

use crate::definition::TimeUnit;
use crate::types::BenchResult;

/// Characters that may surround a captured timestamp when a pattern is greedy, such as the
/// closing bracket in `[2024-01-01T00:00:10Z]`.
const TIMESTAMP_DELIMITERS: &[char] = &['[', ']', '(', ')', '"', '\'', ',', ';'];

/// The phrase a worker logs once it has processed `count` messages.
pub fn checkpoint_phrase(count: u64) -> String {
    format!("Processed {count} messages")
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint reached but the timestamp pattern `{pattern}` did not match: {line}")]
    MissingTimestamp { pattern: String, line: String },
    #[error("Checkpoint reached but '{timestamp}' is not a recognised timestamp")]
    InvalidTimestamp { timestamp: String },
    #[error("Output ended before '{phrase}' was seen")]
    StreamEnded { phrase: String },
    #[error("Timed out after {}s waiting for '{phrase}'", .timeout.as_secs())]
    TimedOut { phrase: String, timeout: Duration },
}

/// The checkpoint line that was found and the time the worker reported in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointResult {
    /// The timestamp as it was extracted from the worker's output.
    pub timestamp: String,
    pub reached_at: DateTime<FixedOffset>,
}

impl CheckpointResult {
    /// Time from `start` to the checkpoint in whole `unit`s.
    pub fn elapsed_since(&self, start: DateTime<FixedOffset>, unit: TimeUnit) -> Elapsed {
        Elapsed {
            value: unit.whole_units(self.reached_at - start),
            unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub value: i64,
    pub unit: TimeUnit,
}

impl Display for Elapsed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Watches worker output for the checkpoint phrase of one expected message count.
#[derive(Debug, Clone)]
pub struct CheckpointMonitor {
    phrase: String,
    pattern: Regex,
}

impl CheckpointMonitor {
    pub fn new(expected_count: u64, timestamp_pattern: &str) -> BenchResult<Self> {
        let pattern = Regex::new(timestamp_pattern)
            .with_context(|| format!("Invalid timestamp pattern `{timestamp_pattern}`"))?;

        Ok(Self {
            phrase: checkpoint_phrase(expected_count),
            pattern,
        })
    }

    /// Check a single line. Returns [None] if the line does not contain the checkpoint phrase.
    pub fn check_line(&self, line: &str) -> Option<Result<CheckpointResult, CheckpointError>> {
        if !line.contains(&self.phrase) {
            return None;
        }

        let Some(captured) = self
            .pattern
            .captures(line)
            .and_then(|captures| captures.get(1))
        else {
            return Some(Err(CheckpointError::MissingTimestamp {
                pattern: self.pattern.to_string(),
                line: line.to_string(),
            }));
        };

        let timestamp = captured.as_str().trim_matches(TIMESTAMP_DELIMITERS);
        Some(match parse_timestamp(timestamp) {
            Some(reached_at) => Ok(CheckpointResult {
                timestamp: timestamp.to_string(),
                reached_at,
            }),
            None => Err(CheckpointError::InvalidTimestamp {
                timestamp: timestamp.to_string(),
            }),
        })
    }

    /// Consume `output` until the checkpoint phrase is seen.
    ///
    /// Resolves on the first line with the phrase, anything after it is left in the stream.
    pub async fn wait<S>(&self, output: &mut S) -> Result<CheckpointResult, CheckpointError>
    where
        S: Stream<Item = String> + Unpin,
    {
        while let Some(line) = output.next().await {
            if let Some(result) = self.check_line(&line) {
                return result;
            }
        }

        Err(CheckpointError::StreamEnded {
            phrase: self.phrase.clone(),
        })
    }

    /// [CheckpointMonitor::wait], giving up after `timeout`.
    pub async fn wait_with_timeout<S>(
        &self,
        output: &mut S,
        timeout: Duration,
    ) -> Result<CheckpointResult, CheckpointError>
    where
        S: Stream<Item = String> + Unpin,
    {
        match tokio::time::timeout(timeout, self.wait(output)).await {
            Ok(result) => result,
            Err(_) => Err(CheckpointError::TimedOut {
                phrase: self.phrase.clone(),
                timeout,
            }),
        }
    }
}

/// Parse the timestamp formats that workers log with.
///
/// Timestamps without an offset are taken to be in local time, matching the clock that the start
/// of the measurement is taken from.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt);
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}
