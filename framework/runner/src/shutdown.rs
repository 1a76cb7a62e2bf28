use tokio::signal;

pub(crate) use queue_bench_core::prelude::{
    DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError,
};

/// Listen for Ctrl-C and turn it into a shutdown signal. The coordinator still tears down the
/// worker and infrastructure that are running when the signal arrives.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, cleaning up...");
                listener_handle.shutdown();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C, shutdown signal disabled: {e}"),
        }
    });

    handle
}
