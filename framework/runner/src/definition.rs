use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::TimeDelta;
use serde::Deserialize;

use crate::cli::WorkerFilter;
use crate::types::BenchResult;

/// Placeholder in [WorkerDefinition::run_command] that is replaced by the worker's message count.
pub const MESSAGE_COUNT_PLACEHOLDER: &str = "{count}";

/// A worker implementation to benchmark.
///
/// Definitions are read once from the configuration and never modified. Their order in the
/// configuration is the order in which they are benchmarked.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkerDefinition {
    /// Unique identifier. Also used as the topic that load is generated for.
    pub id: String,
    /// Name shown in reports.
    pub name: String,
    /// The directory holding the worker's source, relative to the project root.
    pub src_dir: String,
    /// The directory that the build and run commands are executed in.
    ///
    /// Defaults to [WorkerDefinition::src_dir]. Relative paths are resolved against the project
    /// root when the configuration is loaded.
    #[serde(default)]
    pub cwd: PathBuf,
    /// Command that builds the worker, it must exit with status 0.
    pub build_command: String,
    /// Command that runs the worker. Must contain [MESSAGE_COUNT_PLACEHOLDER].
    pub run_command: String,
    /// The global message count is divided by this to get the count for this worker.
    #[serde(default = "default_divisor")]
    pub message_divisor: u64,
    /// Pattern with one capture group that extracts the timestamp from the checkpoint line.
    pub timestamp_pattern: String,
    /// Unit that elapsed times are reported in.
    pub time_unit: TimeUnit,
    /// Background color of the worker's badge, as `#rgb` or `#rrggbb`.
    pub color: String,
    /// Text color of the worker's badge, as `#rgb` or `#rrggbb`.
    pub text_color: String,
}

fn default_divisor() -> u64 {
    1
}

impl WorkerDefinition {
    /// The number of messages this worker processes when the reference worker processes
    /// `global_count`.
    pub fn message_count(&self, global_count: u64) -> u64 {
        global_count / self.message_divisor.max(1)
    }

    pub fn run_command(&self, message_count: u64) -> String {
        self.run_command
            .replace(MESSAGE_COUNT_PLACEHOLDER, &message_count.to_string())
    }

    /// Whether this definition is selected by a worker filter given on the command line.
    pub fn matches(&self, filter: &WorkerFilter) -> bool {
        match filter.only() {
            None => true,
            Some(name) => self.id == name || self.src_dir == name,
        }
    }

    pub(crate) fn resolve_cwd(&mut self, root: &Path) {
        let cwd = if self.cwd.as_os_str().is_empty() {
            PathBuf::from(&self.src_dir)
        } else {
            self.cwd.clone()
        };

        self.cwd = if cwd.is_absolute() { cwd } else { root.join(cwd) };
    }

    pub(crate) fn validate(&self) -> BenchResult<()> {
        if self.id.is_empty() {
            bail!("Worker id must not be empty");
        }
        if self.message_divisor == 0 {
            bail!("Worker '{}' has a message divisor of 0", self.id);
        }
        if !self.run_command.contains(MESSAGE_COUNT_PLACEHOLDER) {
            bail!(
                "Run command for worker '{}' does not contain '{MESSAGE_COUNT_PLACEHOLDER}'",
                self.id
            );
        }
        if self.build_command.trim().is_empty() {
            bail!("Worker '{}' has an empty build command", self.id);
        }

        let pattern = regex::Regex::new(&self.timestamp_pattern).with_context(|| {
            format!("Invalid timestamp pattern for worker '{}'", self.id)
        })?;
        if pattern.captures_len() < 2 {
            bail!(
                "Timestamp pattern for worker '{}' must have a capture group",
                self.id
            );
        }

        parse_hex_color(&self.color)
            .with_context(|| format!("Invalid color for worker '{}'", self.id))?;
        parse_hex_color(&self.text_color)
            .with_context(|| format!("Invalid text color for worker '{}'", self.id))?;

        Ok(())
    }
}

/// Select the workers to benchmark, in declaration order.
///
/// Naming a worker that is not configured is an error rather than an empty run.
pub fn select_workers<'a>(
    workers: &'a [WorkerDefinition],
    filter: &WorkerFilter,
) -> BenchResult<Vec<&'a WorkerDefinition>> {
    let selected = workers
        .iter()
        .filter(|w| w.matches(filter))
        .collect::<Vec<_>>();

    if let (Some(name), true) = (filter.only(), selected.is_empty()) {
        bail!(
            "No worker named '{name}', configured workers are: {}",
            workers
                .iter()
                .map(|w| w.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(selected)
}

/// Fail if `global_count` leaves any of `workers` with nothing to process. Such a worker would
/// never print its checkpoint and only fail after the checkpoint timeout.
pub fn check_message_counts(
    workers: &[&WorkerDefinition],
    global_count: u64,
) -> BenchResult<()> {
    let empty = workers
        .iter()
        .filter(|w| w.message_count(global_count) == 0)
        .map(|w| format!("{} (divisor {})", w.id, w.message_divisor))
        .collect::<Vec<_>>();

    if !empty.is_empty() {
        bail!(
            "A message count of {global_count} leaves no messages for: {}",
            empty.join(", ")
        );
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    /// Express a time difference in this unit, truncating towards zero.
    pub fn whole_units(&self, delta: TimeDelta) -> i64 {
        match self {
            TimeUnit::Milliseconds => delta.num_milliseconds(),
            TimeUnit::Seconds => delta.num_seconds(),
            TimeUnit::Minutes => delta.num_minutes(),
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
        };
        f.write_str(s)
    }
}

/// Parse `#rgb` or `#rrggbb` into its components.
pub fn parse_hex_color(color: &str) -> BenchResult<(u8, u8, u8)> {
    let hex = color
        .strip_prefix('#')
        .with_context(|| format!("Color '{color}' must start with '#'"))?;

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Color '{color}' is not valid hex");
    }

    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => bail!("Color '{color}' must have 3 or 6 hex digits"),
    };

    let component = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .with_context(|| format!("Color '{color}' is not valid hex"))
    };

    Ok((component(0)?, component(2)?, component(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_workers;

    fn rust_worker() -> WorkerDefinition {
        default_workers()
            .into_iter()
            .find(|w| w.id == "rust")
            .expect("rust worker is a default")
    }

    #[test]
    fn message_count_uses_divisor() {
        let mut worker = rust_worker();
        assert_eq!(1000, worker.message_count(1000));

        worker.message_divisor = 10;
        assert_eq!(100, worker.message_count(1000));
        assert_eq!(100, worker.message_count(1009));
    }

    #[test]
    fn run_command_substitutes_message_count() {
        let worker = rust_worker();

        assert_eq!("./target/release/rust -m=500", worker.run_command(500));
    }

    #[test]
    fn matches_id_or_source_dir() {
        let mut worker = rust_worker();
        worker.id = "kotlin-spring".to_string();
        worker.src_dir = "kotlin".to_string();

        assert!(worker.matches(&WorkerFilter::All));
        assert!(worker.matches(&WorkerFilter::Only("kotlin-spring".to_string())));
        assert!(worker.matches(&WorkerFilter::Only("kotlin".to_string())));
        assert!(!worker.matches(&WorkerFilter::Only("rust".to_string())));
    }

    #[test]
    fn select_unknown_worker_is_an_error() {
        let workers = default_workers();

        let result = select_workers(&workers, &WorkerFilter::Only("cobol".to_string()));

        assert!(result.is_err());
    }

    #[test]
    fn select_keeps_declaration_order() {
        let workers = default_workers();

        let ids = select_workers(&workers, &WorkerFilter::All)
            .unwrap()
            .into_iter()
            .map(|w| w.id.clone())
            .collect::<Vec<_>>();

        assert_eq!(vec!["rust", "javascript", "kotlin-spring"], ids);
    }

    #[test]
    fn message_counts_scaled_to_zero_are_rejected() {
        let workers = default_workers();
        let selected = workers.iter().collect::<Vec<_>>();

        let err = check_message_counts(&selected, 5).unwrap_err();

        assert_eq!(
            "A message count of 5 leaves no messages for: javascript (divisor 10), kotlin-spring (divisor 10)",
            err.to_string()
        );
        assert!(check_message_counts(&selected, 0).is_err());
        assert!(check_message_counts(&selected, 10).is_ok());
    }

    #[test]
    fn resolve_cwd_defaults_to_source_dir() {
        let mut worker = rust_worker();
        worker.cwd = PathBuf::new();

        worker.resolve_cwd(Path::new("/bench"));

        assert_eq!(PathBuf::from("/bench/rust"), worker.cwd);
    }

    #[test]
    fn resolve_cwd_keeps_absolute_path() {
        let mut worker = rust_worker();
        worker.cwd = PathBuf::from("/opt/worker");

        worker.resolve_cwd(Path::new("/bench"));

        assert_eq!(PathBuf::from("/opt/worker"), worker.cwd);
    }

    #[test]
    fn validate_rejects_pattern_without_group() {
        let mut worker = rust_worker();
        worker.timestamp_pattern = r"\S+".to_string();

        assert!(worker.validate().is_err());
    }

    #[test]
    fn validate_rejects_run_command_without_placeholder() {
        let mut worker = rust_worker();
        worker.run_command = "./target/release/rust".to_string();

        assert!(worker.validate().is_err());
    }

    #[test]
    fn whole_units_truncate() {
        let delta = TimeDelta::milliseconds(5_999);

        assert_eq!(5_999, TimeUnit::Milliseconds.whole_units(delta));
        assert_eq!(5, TimeUnit::Seconds.whole_units(delta));
        assert_eq!(0, TimeUnit::Minutes.whole_units(delta));
        assert_eq!(-5, TimeUnit::Seconds.whole_units(-delta));
    }

    #[test]
    fn parse_short_and_long_hex_colors() {
        assert_eq!((0xB9, 0x47, 0x00), parse_hex_color("#B94700").unwrap());
        assert_eq!((0xff, 0xff, 0xff), parse_hex_color("#FFF").unwrap());
        assert!(parse_hex_color("B94700").is_err());
        assert!(parse_hex_color("#B947").is_err());
        assert!(parse_hex_color("#GGGGGG").is_err());
    }
}
