use std::thread::JoinHandle;

use anyhow::Context;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
use crate::types::BenchResult;

/// Share of the machine's CPU above which the orchestrator itself may skew a measurement.
const HIGH_CPU_PERCENT: f32 = 10.0;

/// Watches the CPU usage of this process while a worker is being measured.
///
/// The orchestrator should be close to idle while it waits for a worker. If it isn't then the
/// worker is competing with it for CPU and the elapsed time is less trustworthy. That is only
/// worth a warning, the measurement carries on.
pub(crate) struct ResourceMonitor {
    stop: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    pub(crate) fn start(worker_name: &str) -> BenchResult<Self> {
        let stop = ShutdownHandle::new();
        let listener = stop.new_listener();
        let worker_name = worker_name.to_string();

        let thread = std::thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || sample_cpu(worker_name, listener))
            .context("Failed to start monitor thread")?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop sampling and wait for the thread to finish, without holding up the runtime.
    pub(crate) async fn stop(mut self) {
        self.stop.shutdown();
        let Some(thread) = self.thread.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => log::warn!("Monitor thread panicked"),
            Err(e) => log::warn!("Failed to wait for the monitor thread: {e}"),
        }
    }
}

impl Drop for ResourceMonitor {
    // The thread notices within one sampling interval, it is not waited for.
    fn drop(&mut self) {
        self.stop.shutdown();
    }
}

fn sample_cpu(worker_name: String, mut listener: DelegatedShutdownListener) {
    let this_process_pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();

    sys.refresh_cpu_all();
    let cpu_count = sys.cpus().len().max(1);

    loop {
        if listener.should_shutdown() {
            log::trace!("Monitor thread shutting down");
            break;
        }

        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[this_process_pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );

        let Some(process) = sys.process(this_process_pid) else {
            log::warn!("Could not read CPU usage for this process, resource monitor disabled");
            break;
        };

        let usage = process.cpu_usage() / cpu_count as f32;
        if usage > HIGH_CPU_PERCENT {
            log::warn!(
                "High CPU usage while measuring {worker_name}. queue-bench is using {usage:.2}% of the CPU, with {cpu_count} available cores"
            );
        }

        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    #[tokio::test]
    async fn runtime_keeps_running_while_stopping() {
        let monitor = ResourceMonitor::start("Rust").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let ran = Arc::new(AtomicBool::new(false));
        tokio::spawn({
            let ran = ran.clone();
            async move { ran.store(true, Ordering::SeqCst) }
        });
        monitor.stop().await;

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_does_not_wait_for_the_thread() {
        let monitor = ResourceMonitor::start("Rust").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let dropped_at = Instant::now();
        drop(monitor);

        assert!(dropped_at.elapsed() < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL / 2);
    }
}
