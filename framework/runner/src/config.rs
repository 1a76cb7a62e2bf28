use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::definition::{TimeUnit, WorkerDefinition};
use crate::types::BenchResult;

/// Configuration file that is picked up from the current directory if `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "queue-bench.toml";

/// Everything the benchmark needs to know about the workers and the shared infrastructure.
///
/// Loaded once at startup and passed to the coordinator, it is not modified afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// The project root. Relative paths in the rest of the configuration are resolved against it.
    ///
    /// Defaults to the directory containing the configuration file, or the current directory.
    pub root: Option<PathBuf>,
    /// The file that the dataset is written to before each worker is set up.
    pub dataset_path: PathBuf,
    pub infra: InfraConfig,
    pub timing: TimingConfig,
    pub workers: Vec<WorkerDefinition>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            root: None,
            dataset_path: PathBuf::from("data.txt"),
            infra: InfraConfig::default(),
            timing: TimingConfig::default(),
            workers: default_workers(),
        }
    }
}

/// Commands and locations for the shared infrastructure.
///
/// Commands are split on whitespace and run without a shell.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InfraConfig {
    /// Directory containing the compose file for the queue broker and database.
    pub compose_dir: PathBuf,
    /// The compose program, run with `up` and `down`.
    pub compose_command: String,
    /// Directory of the HTTP enrichment service.
    pub endpoint_dir: PathBuf,
    /// Run once before the first worker, to install the enrichment service's dependencies.
    pub endpoint_prepare_command: String,
    /// Starts the enrichment service.
    pub endpoint_start_command: String,
    /// Container of the queue broker that the load script is executed in.
    pub queue_container: String,
    /// Script inside [InfraConfig::queue_container] that loads the dataset, given a worker id.
    pub load_script: String,
    /// Prints the number of records stored by the worker under test.
    pub record_count_command: String,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            compose_dir: PathBuf::new(),
            compose_command: "docker-compose".to_string(),
            endpoint_dir: PathBuf::from("endpoint"),
            endpoint_prepare_command: "yarn".to_string(),
            endpoint_start_command: "yarn start".to_string(),
            queue_container: "performance-test-kafka".to_string(),
            load_script: "./load-data.sh".to_string(),
            record_count_command: "docker exec performance-test-mongodb mongosh --quiet -u root -p example --authenticationDatabase admin performance-test --eval db.models.countDocuments()".to_string(),
        }
    }
}

/// Delays and limits, all in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Wait after starting the infrastructure, before the worker is started.
    pub infra_warmup_secs: u64,
    /// Wait after starting the worker, before load is generated.
    pub worker_warmup_secs: u64,
    /// Maximum time to wait for the worker to report the checkpoint.
    pub checkpoint_timeout_secs: u64,
    /// Delay between record count checks after the checkpoint.
    pub settle_secs: u64,
    /// Number of record count checks before the validation gives up.
    pub settle_attempts: u32,
    /// How long `--dont-run` pauses for. Waits for the operator if not set.
    pub dont_run_pause_secs: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            infra_warmup_secs: 10,
            worker_warmup_secs: 10,
            checkpoint_timeout_secs: 600,
            settle_secs: 5,
            settle_attempts: 6,
            dont_run_pause_secs: None,
        }
    }
}

impl TimingConfig {
    pub fn infra_warmup(&self) -> Duration {
        Duration::from_secs(self.infra_warmup_secs)
    }

    pub fn worker_warmup(&self) -> Duration {
        Duration::from_secs(self.worker_warmup_secs)
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.checkpoint_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn dont_run_pause(&self) -> Option<Duration> {
        self.dont_run_pause_secs.map(Duration::from_secs)
    }
}

impl BenchConfig {
    /// Load the configuration.
    ///
    /// An explicitly given file must exist. Without one, [DEFAULT_CONFIG_FILE] in the current
    /// directory is used if present, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> BenchResult<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;

        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(current_dir.join(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let base = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or(current_dir);

                Self::from_toml(&content, &base)
                    .with_context(|| format!("Invalid config file {}", path.display()))
            }
            None => {
                log::info!("No configuration file found, using the built-in workers");
                Self::default().resolved(&current_dir)
            }
        }
    }

    /// Parse a configuration, resolving relative paths against `base` unless it sets a root.
    pub fn from_toml(content: &str, base: &Path) -> BenchResult<Self> {
        let config: BenchConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.resolved(base)
    }

    /// The project root that relative paths were resolved against.
    pub fn root(&self) -> &Path {
        self.root.as_deref().unwrap_or_else(|| Path::new("."))
    }

    fn resolved(mut self, base: &Path) -> BenchResult<Self> {
        let root = match self.root.take() {
            Some(root) if root.is_absolute() => root,
            Some(root) => base.join(root),
            None => base.to_path_buf(),
        };

        self.dataset_path = resolve(&root, &self.dataset_path);
        self.infra.compose_dir = resolve(&root, &self.infra.compose_dir);
        self.infra.endpoint_dir = resolve(&root, &self.infra.endpoint_dir);
        for worker in &mut self.workers {
            worker.resolve_cwd(&root);
        }
        self.root = Some(root);

        self.validate()?;

        Ok(self)
    }

    fn validate(&self) -> BenchResult<()> {
        if self.workers.is_empty() {
            bail!("No workers configured");
        }

        let mut ids = HashSet::new();
        for worker in &self.workers {
            worker.validate()?;
            if !ids.insert(worker.id.as_str()) {
                bail!("Worker id '{}' is configured more than once", worker.id);
            }
        }

        for (name, command) in [
            ("compose_command", &self.infra.compose_command),
            ("endpoint_start_command", &self.infra.endpoint_start_command),
            ("record_count_command", &self.infra.record_count_command),
        ] {
            if command.trim().is_empty() {
                bail!("'{name}' must not be empty");
            }
        }

        if self.timing.settle_attempts == 0 {
            bail!("'settle_attempts' must be at least 1");
        }

        Ok(())
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(path)
    }
}

/// The workers that are benchmarked when no configuration file is present.
pub fn default_workers() -> Vec<WorkerDefinition> {
    vec![
        WorkerDefinition {
            id: "rust".to_string(),
            name: "Rust".to_string(),
            src_dir: "rust".to_string(),
            cwd: PathBuf::from("rust"),
            build_command: "cargo build -r".to_string(),
            run_command: "./target/release/rust -m={count}".to_string(),
            message_divisor: 1,
            timestamp_pattern: r"\[((\S)+)".to_string(),
            time_unit: TimeUnit::Milliseconds,
            color: "#B94700".to_string(),
            text_color: "#000".to_string(),
        },
        WorkerDefinition {
            id: "javascript".to_string(),
            name: "JavaScript".to_string(),
            src_dir: "js".to_string(),
            cwd: PathBuf::from("js"),
            build_command: "yarn".to_string(),
            run_command: "node index.js {count}".to_string(),
            message_divisor: 10,
            timestamp_pattern: r"\[((\S)+)\]".to_string(),
            time_unit: TimeUnit::Seconds,
            color: "#F0DB4F".to_string(),
            text_color: "#323330".to_string(),
        },
        WorkerDefinition {
            id: "kotlin-spring".to_string(),
            name: "Spring".to_string(),
            src_dir: "kotlin".to_string(),
            cwd: PathBuf::from("kotlin"),
            build_command: "./gradlew build".to_string(),
            run_command: "java -jar build/libs/demo-0.0.1-SNAPSHOT.jar --count={count}"
                .to_string(),
            message_divisor: 10,
            timestamp_pattern: r"((\S)+)".to_string(),
            time_unit: TimeUnit::Seconds,
            color: "#6db33f".to_string(),
            text_color: "#FFF".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn example_config_matches_defaults() {
        let example = BenchConfig::from_toml(
            include_str!("../../../queue-bench.example.toml"),
            Path::new("/bench"),
        )
        .expect("example config should be valid");

        let defaults = BenchConfig::default()
            .resolved(Path::new("/bench"))
            .unwrap();

        assert_eq!(defaults, example);
    }

    #[test]
    fn defaults_are_valid() {
        let config = BenchConfig::default()
            .resolved(Path::new("/bench"))
            .expect("defaults should be valid");

        assert_eq!(Path::new("/bench"), config.root());
        assert_eq!(PathBuf::from("/bench/data.txt"), config.dataset_path);
        assert_eq!(PathBuf::from("/bench"), config.infra.compose_dir);
        assert_eq!(PathBuf::from("/bench/endpoint"), config.infra.endpoint_dir);
        assert_eq!(PathBuf::from("/bench/js"), config.workers[1].cwd);
    }

    #[test]
    fn parse_partial_config_keeps_other_defaults() {
        let config = BenchConfig::from_toml(
            r##"
[timing]
checkpoint_timeout_secs = 30

[[workers]]
id = "go"
name = "Go"
src_dir = "go"
build_command = "go build -o worker ."
run_command = "./worker --count {count}"
message_divisor = 2
timestamp_pattern = '^(\S+)'
time_unit = "milliseconds"
color = "#00ADD8"
text_color = "#FFF"
"##,
            Path::new("/bench"),
        )
        .expect("failed to parse config");

        assert_eq!(30, config.timing.checkpoint_timeout_secs);
        assert_eq!(TimingConfig::default().settle_secs, config.timing.settle_secs);
        assert_eq!(InfraConfig::default().queue_container, config.infra.queue_container);
        assert_eq!(1, config.workers.len());
        assert_eq!(PathBuf::from("/bench/go"), config.workers[0].cwd);
        assert_eq!(500, config.workers[0].message_count(1000));
    }

    #[test]
    fn explicit_root_is_resolved_against_config_dir() {
        let config = BenchConfig::from_toml(
            r#"
root = "project"
dataset_path = "/tmp/data.txt"
"#,
            Path::new("/etc/bench"),
        )
        .unwrap();

        assert_eq!(Path::new("/etc/bench/project"), config.root());
        assert_eq!(PathBuf::from("/tmp/data.txt"), config.dataset_path);
        assert_eq!(PathBuf::from("/etc/bench/project/rust"), config.workers[0].cwd);
    }

    #[test]
    fn duplicate_worker_ids_are_rejected() {
        let mut config = BenchConfig::default();
        let duplicate = config.workers[0].clone();
        config.workers.push(duplicate);

        assert!(config.resolved(Path::new("/bench")).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = BenchConfig::from_toml("warmup = 3", Path::new("/bench"));

        assert!(result.is_err());
    }

    #[test]
    fn empty_worker_list_is_rejected() {
        let result = BenchConfig::from_toml("workers = []", Path::new("/bench"));

        assert!(result.is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "dataset_path = \"records.txt\"\n").unwrap();

        let config = BenchConfig::load(Some(&path)).expect("failed to load config");

        assert_eq!(dir.path(), config.root());
        assert_eq!(dir.path().join("records.txt"), config.dataset_path);
    }

    #[test]
    fn load_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(BenchConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
