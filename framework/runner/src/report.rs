use console::{Color, Style};
use tabled::settings::Style as TableStyle;
use tabled::{Table, Tabled};

use crate::checkpoint::Elapsed;
use crate::definition::{parse_hex_color, TimeUnit, WorkerDefinition};
use crate::validation::ValidationOutcome;

/// What happened to one worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// The checkpoint was reached and the stored records were counted.
    Completed {
        elapsed: Elapsed,
        validation: ValidationOutcome,
    },
    /// The worker was built but not run, for manual inspection.
    Inspected,
    /// The measurement could not be completed.
    Failed { reason: String },
}

/// The outcome for one worker, as collected by the coordinator for the final summary.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker_id: String,
    pub worker_name: String,
    pub message_count: u64,
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    pub fn passed(&self) -> bool {
        matches!(&self.outcome, WorkerOutcome::Completed { validation, .. } if validation.passed())
    }
}

/// Formats the lines shown to the operator. Nothing here prints or decides anything.
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    /// The message count given on the command line.
    global_message_count: u64,
}

impl Reporter {
    pub fn new(global_message_count: u64) -> Self {
        Self {
            global_message_count,
        }
    }

    /// One line describing the outcome for `worker`.
    pub fn line(&self, worker: &WorkerDefinition, report: &WorkerReport) -> String {
        match &report.outcome {
            WorkerOutcome::Completed {
                elapsed,
                validation,
            } => self.completed_line(worker, report.message_count, elapsed, validation),
            WorkerOutcome::Inspected => format!(
                "{} {}",
                badge(worker),
                Style::new()
                    .white()
                    .apply_to("was built but not run (--dont-run)")
            ),
            WorkerOutcome::Failed { reason } => format!(
                "{} {} {}",
                badge(worker),
                Style::new().red().bold().apply_to("failed:"),
                Style::new().red().apply_to(reason)
            ),
        }
    }

    fn completed_line(
        &self,
        worker: &WorkerDefinition,
        message_count: u64,
        elapsed: &Elapsed,
        validation: &ValidationOutcome,
    ) -> String {
        let count_style = if message_count >= self.global_message_count {
            Style::new().green().bold()
        } else {
            Style::new().yellow().bold()
        };

        let mut line = format!(
            "{} {} {} {} {} {}",
            badge(worker),
            Style::new().white().apply_to("took"),
            unit_style(elapsed.unit).apply_to(elapsed),
            Style::new().white().apply_to("to process"),
            count_style.apply_to(message_count),
            Style::new().white().apply_to("messages"),
        );

        if validation.passed() {
            line.push_str(&format!(
                " {}",
                Style::new().green().apply_to(format!(
                    "({} of {} records stored)",
                    validation.actual, validation.expected
                ))
            ));
        } else {
            line.push_str(&format!(
                " {}",
                Style::new().red().bold().apply_to(format!(
                    "but only {} of {} records were stored",
                    validation.actual, validation.expected
                ))
            ));
        }

        line
    }

    /// A table of every worker's outcome.
    pub fn summary(&self, reports: &[WorkerReport]) -> String {
        let rows = reports.iter().map(SummaryRow::from).collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(TableStyle::modern());

        table.to_string()
    }
}

#[derive(Tabled)]
struct SummaryRow {
    worker: String,
    messages: u64,
    elapsed: String,
    stored: String,
    result: &'static str,
}

impl From<&WorkerReport> for SummaryRow {
    fn from(report: &WorkerReport) -> Self {
        let (elapsed, stored, result) = match &report.outcome {
            WorkerOutcome::Completed {
                elapsed,
                validation,
            } => (
                elapsed.to_string(),
                format!("{}/{}", validation.actual, validation.expected),
                if validation.passed() { "pass" } else { "fail" },
            ),
            WorkerOutcome::Inspected => ("-".to_string(), "-".to_string(), "not run"),
            WorkerOutcome::Failed { .. } => ("-".to_string(), "-".to_string(), "error"),
        };

        Self {
            worker: report.worker_name.clone(),
            messages: report.message_count,
            elapsed,
            stored,
            result,
        }
    }
}

#[derive(Tabled)]
struct WorkerRow {
    id: String,
    name: String,
    source: String,
    divisor: u64,
    messages: String,
    unit: String,
}

/// A table of the configured workers, with the number of messages each one would process when
/// `global_message_count` is given.
pub fn worker_table(workers: &[WorkerDefinition], global_message_count: Option<u64>) -> String {
    let rows = workers
        .iter()
        .map(|worker| WorkerRow {
            id: worker.id.clone(),
            name: worker.name.clone(),
            source: worker.src_dir.clone(),
            divisor: worker.message_divisor,
            messages: global_message_count
                .map(|count| worker.message_count(count).to_string())
                .unwrap_or_else(|| "-".to_string()),
            unit: worker.time_unit.to_string(),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(TableStyle::modern());

    table.to_string()
}

fn unit_style(unit: TimeUnit) -> Style {
    match unit {
        TimeUnit::Milliseconds => Style::new().green(),
        TimeUnit::Seconds => Style::new().yellow(),
        TimeUnit::Minutes => Style::new().red(),
    }
}

/// The worker's name in its own colors.
fn badge(worker: &WorkerDefinition) -> String {
    let mut style = Style::new().bold();
    if let Ok(rgb) = parse_hex_color(&worker.color) {
        style = style.bg(Color::Color256(ansi256(rgb)));
    }
    if let Ok(rgb) = parse_hex_color(&worker.text_color) {
        style = style.fg(Color::Color256(ansi256(rgb)));
    }

    style.apply_to(format!(" {} ", worker.name)).to_string()
}

/// The closest color in the 6x6x6 cube of the 256 color palette.
fn ansi256((r, g, b): (u8, u8, u8)) -> u8 {
    let level = |c: u8| ((c as u16 * 5 + 127) / 255) as u8;
    16 + 36 * level(r) + 6 * level(g) + level(b)
}
