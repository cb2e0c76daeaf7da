use gale_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C. The first signal stops every scenario gracefully, a second one cancels
/// in-flight work immediately.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
    stop_handle: ShutdownHandle,
    hard_stop_handle: ShutdownHandle,
) {
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e:?}");
            return;
        }
        stop_handle.shutdown();
        println!("Received shutdown signal, stopping gracefully. Press Ctrl-C again to stop immediately...");

        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e:?}");
            return;
        }
        hard_stop_handle.shutdown();
        println!("Received second shutdown signal, cancelling in-flight requests...");
    });
}
