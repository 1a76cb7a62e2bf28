use anyhow::Context;
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub type DatasetBuilderResult = anyhow::Result<()>;

/// Length of a generated record value, matching a full git commit sha.
pub const RECORD_VALUE_LEN: usize = 40;

pub struct DatasetOptions {
    /// Where the dataset is written. Any existing file is replaced.
    pub path: PathBuf,
    /// The number of records, one per line.
    pub count: u64,
}

impl DatasetOptions {
    pub fn new(path: impl Into<PathBuf>, count: u64) -> Self {
        Self {
            path: path.into(),
            count,
        }
    }
}

/// Write `count` records of the form `<sha>,<sha>\n` to the configured path.
///
/// Both values on a line are the same random commit-style id, so that the line can be split by
/// a consumer into a key and a payload without any further lookup.
pub fn build_dataset(options: &DatasetOptions) -> DatasetBuilderResult {
    if let Some(parent) = options.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create dataset directory {}", parent.display())
            })?;
        }
    }

    let file = File::create(&options.path)
        .with_context(|| format!("Failed to create dataset at {}", options.path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut rng = rand::thread_rng();

    write_records(&mut writer, &mut rng, options.count)
        .with_context(|| format!("Failed to write dataset to {}", options.path.display()))?;

    writer.flush().context("Failed to flush dataset")?;

    log::debug!(
        "Wrote {} records to {}",
        options.count,
        options.path.display()
    );

    Ok(())
}

fn write_records(writer: &mut impl Write, rng: &mut impl Rng, count: u64) -> std::io::Result<()> {
    for _ in 0..count {
        let sha = commit_sha(rng);
        writeln!(writer, "{sha},{sha}")?;
    }

    Ok(())
}

/// A random, lowercase hex, commit-style id.
pub fn commit_sha(rng: &mut impl Rng) -> String {
    let bytes: [u8; RECORD_VALUE_LEN / 2] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Count the records in an existing dataset.
pub fn count_records(path: &Path) -> anyhow::Result<u64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset at {}", path.display()))?;

    Ok(content.lines().filter(|l| !l.is_empty()).count() as u64)
}
