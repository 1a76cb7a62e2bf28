use std::borrow::Cow;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// A spinner showing which phase of the benchmark is running.
///
/// Lines printed through it appear above the spinner instead of being overwritten by it.
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::hidden();
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    /// No spinner, lines go straight to stdout.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn phase(&self, message: impl Into<Cow<'static, str>>) {
        let message = message.into();
        log::debug!("{message}");
        self.bar.set_message(message);
    }

    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    /// Stop drawing the spinner until the returned guard is dropped, for prompts that read from
    /// the terminal.
    ///
    /// Unlike [ProgressBar::suspend] nothing is locked while suspended, so the progress can still
    /// be finished if the read is abandoned.
    pub fn suspend(&self) -> Suspended<'_> {
        let visible = !self.bar.is_hidden();
        if visible {
            self.bar.set_draw_target(ProgressDrawTarget::hidden());
        }

        Suspended {
            bar: &self.bar,
            visible,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Guard returned by [Progress::suspend].
pub struct Suspended<'a> {
    bar: &'a ProgressBar,
    visible: bool,
}

impl Drop for Suspended<'_> {
    fn drop(&mut self) {
        if self.visible {
            self.bar.set_draw_target(ProgressDrawTarget::stderr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_spinner_is_not_drawn() {
        let progress = Progress::new(true);

        {
            let _suspended = progress.suspend();
            assert!(progress.bar.is_hidden());
            progress.phase("Waiting for Enter");
        }

        progress.finish();
    }

    #[test]
    fn hidden_progress_stays_hidden_after_suspend() {
        let progress = Progress::new(false);

        drop(progress.suspend());

        assert!(progress.bar.is_hidden());
        progress.finish();
    }
}
