use std::future::Future;
use std::time::Duration;

use gale_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};

/// Drives async work for the synchronous virtual user threads.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    hard_stop_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, hard_stop_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            hard_stop_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the runner is stopped immediately, with a second
    /// Ctrl-C. You do not need to do anything special to handle this, but you should be aware that
    /// submitting a future which does not support cancelling may prevent the runner from shutting down.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut hard_stop_listener = self.hard_stop_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = hard_stop_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Like [Executor::execute_in_place] but also cancelled when `cancel` fires.
    pub(crate) fn execute_until<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        cancel: &mut DelegatedShutdownListener,
    ) -> anyhow::Result<T> {
        self.execute_in_place(async move {
            tokio::select! {
                result = fut => result,
                _ = cancel.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Sleep for `duration`, waking early if `wake` fires.
    pub(crate) fn sleep_until(&self, duration: Duration, wake: &mut DelegatedShutdownListener) {
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {},
                _ = wake.wait_for_shutdown() => {},
            }
        })
    }

    /// Submit async code to be run in the background.
    ///
    /// Note that the future will not be cancelled if the runner is shutdown. It is also not guaranteed
    /// that the runner will wait for the future to complete before shutting down.
    ///
    /// In workload hooks, you should use [Executor::execute_in_place] instead of [Executor::spawn]
    /// to ensure that your future completes before the iteration completes and the next one starts.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    pub(crate) fn hard_stop_handle(&self) -> &ShutdownHandle {
        &self.hard_stop_handle
    }
}
