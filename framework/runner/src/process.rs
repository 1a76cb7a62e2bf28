//! Subprocesses with a combined, line oriented, output stream.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use anyhow::Context;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::command::CommandLine;
use crate::types::BenchResult;

/// Something that must be explicitly stopped before it is discarded.
pub trait Cancel {
    /// Request termination. Best effort, does not wait for the process to exit, and calling it
    /// again or after the process has exited does nothing.
    fn cancel(&mut self);
}

/// A running worker whose output can be watched.
pub trait WorkerProcess: Cancel {
    fn output(&mut self) -> &mut OutputStream;
}

/// The stdout and stderr lines of a process, interleaved in the order they were read.
///
/// The stream ends once both pipes are closed.
#[derive(Debug)]
pub struct OutputStream {
    receiver: UnboundedReceiver<String>,
}

impl OutputStream {
    pub fn channel() -> (UnboundedSender<String>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// A finished stream that yields the given lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (sender, stream) = Self::channel();
        for line in lines {
            // The receiver is alive, so sending can't fail.
            let _ = sender.send(line.into());
        }
        stream
    }

    /// Stop buffering output. Lines that were already received are still yielded.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for OutputStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<String>> {
        self.receiver.poll_recv(cx)
    }
}

/// What happens to the lines that a [RunHandle] reads from its process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Make lines available through [RunHandle::output]. Otherwise they are only logged.
    pub forward: bool,
    /// Log lines at `info` rather than `trace`.
    pub echo: bool,
}

/// A live subprocess and its combined output.
///
/// Must be [cancelled](Cancel::cancel) by its owner once it is no longer needed.
#[derive(Debug)]
pub struct RunHandle {
    name: String,
    child: Child,
    output: OutputStream,
    cancelled: bool,
}

impl RunHandle {
    /// Start `command` in `cwd` without waiting for it.
    ///
    /// Output lines are logged under the target `name`, for example `worker::rust`.
    pub fn spawn(
        name: impl Into<String>,
        command: &CommandLine,
        cwd: &Path,
        options: OutputOptions,
    ) -> BenchResult<Self> {
        let name = name.into();

        log::debug!("Starting {name}: `{command}` in {}", cwd.display());
        let mut child = command
            .command(cwd)?
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start `{command}` in {}", cwd.display()))?;

        let stdout = child
            .stdout
            .take()
            .with_context(|| format!("Failed to get stdout for {name}"))?;
        let stderr = child
            .stderr
            .take()
            .with_context(|| format!("Failed to get stderr for {name}"))?;

        let (sender, output) = OutputStream::channel();
        let sender = options.forward.then_some(sender);
        tokio::spawn(pump_lines(stdout, sender.clone(), name.clone(), options.echo));
        tokio::spawn(pump_lines(stderr, sender, name.clone(), options.echo));

        Ok(Self {
            name,
            child,
            output,
            cancelled: false,
        })
    }
}

impl Cancel for RunHandle {
    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.output.close();

        match self.child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("{} had already exited with {status}", self.name);
                return;
            }
            Ok(None) => {}
            Err(e) => log::debug!("Failed to check whether {} has exited: {e}", self.name),
        }

        log::debug!("Terminating {}", self.name);
        terminate(&mut self.child, &self.name);
    }
}

impl WorkerProcess for RunHandle {
    fn output(&mut self) -> &mut OutputStream {
        &mut self.output
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.cancelled {
            log::warn!("{} was dropped without being cancelled", self.name);
            self.cancel();
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child, name: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        log::debug!("Failed to send SIGTERM to {name}, killing it instead: {e}");
        if let Err(e) = child.start_kill() {
            log::debug!("Failed to kill {name}: {e}");
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, name: &str) {
    if let Err(e) = child.start_kill() {
        log::debug!("Failed to kill {name}: {e}");
    }
}

/// Read lines until the pipe closes. Lines are always read, even once nobody is listening, so
/// that the process never blocks on a full pipe.
async fn pump_lines(
    reader: impl AsyncRead + Unpin,
    mut sender: Option<UnboundedSender<String>>,
    target: String,
    echo: bool,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();

                if echo {
                    log::info!(target: &target, "{line}");
                } else {
                    log::trace!(target: &target, "{line}");
                }

                if let Some(s) = &sender {
                    if s.send(line).is_err() {
                        sender = None;
                    }
                }
            }
            Err(e) => {
                log::debug!(target: &target, "Stopped reading output: {e}");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    fn sh(script: &str) -> CommandLine {
        CommandLine::parse("sh").unwrap().with_args(["-c", script])
    }

    const FORWARD: OutputOptions = OutputOptions {
        forward: true,
        echo: false,
    };

    async fn wait(handle: &mut RunHandle) -> std::process::ExitStatus {
        handle.child.wait().await.unwrap()
    }

    #[tokio::test]
    async fn output_combines_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RunHandle::spawn(
            "test",
            &sh("echo out; echo err >&2"),
            dir.path(),
            FORWARD,
        )
        .unwrap();

        let lines = handle.output().collect::<HashSet<_>>().await;
        handle.cancel();

        assert_eq!(
            HashSet::from(["out".to_string(), "err".to_string()]),
            lines
        );
    }

    #[tokio::test]
    async fn output_is_empty_when_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RunHandle::spawn(
            "test",
            &sh("echo out"),
            dir.path(),
            OutputOptions {
                forward: false,
                echo: false,
            },
        )
        .unwrap();

        let lines = handle.output().collect::<Vec<_>>().await;
        handle.cancel();

        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn cancel_terminates_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RunHandle::spawn("test", &sh("sleep 30"), dir.path(), FORWARD).unwrap();

        handle.cancel();

        let status = tokio::time::timeout(Duration::from_secs(5), wait(&mut handle))
            .await
            .expect("process was not terminated");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn cancel_twice_and_after_exit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = RunHandle::spawn("test", &sh("exit 0"), dir.path(), FORWARD).unwrap();
        wait(&mut handle).await;

        handle.cancel();
        handle.cancel();

        assert!(handle.cancelled);
    }

    #[tokio::test]
    async fn from_lines_yields_lines_then_ends() {
        let mut stream = OutputStream::from_lines(["a", "b"]);

        assert_eq!(Some("a".to_string()), stream.next().await);
        assert_eq!(Some("b".to_string()), stream.next().await);
        assert_eq!(None, stream.next().await);
    }
}
