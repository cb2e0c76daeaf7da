use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gale_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gale_instruments::prelude::{MetricsCollector, ThresholdSpec};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Checks the `abort_on_fail` thresholds while the run is in progress and stops the run when one
/// of them is breached.
///
/// Each threshold is only checked once its `delay_abort_eval` has passed since `started`. Returns
/// a flag that is set if the run was aborted.
pub(crate) fn start_threshold_monitor(
    thresholds: Vec<ThresholdSpec>,
    collector: Arc<MetricsCollector>,
    stop_handle: ShutdownHandle,
    mut finished_listener: DelegatedShutdownListener,
    started: Instant,
) -> anyhow::Result<Arc<AtomicBool>> {
    let aborted = Arc::new(AtomicBool::new(false));
    if thresholds.is_empty() {
        return Ok(aborted);
    }

    let aborted_flag = aborted.clone();
    std::thread::Builder::new()
        .name("threshold-monitor".to_string())
        .spawn(move || loop {
            if finished_listener.should_shutdown() {
                break;
            }

            if let Some(breached) = check_abort(&thresholds, &collector, started.elapsed()) {
                log::error!(
                    "Threshold `{}` on `{}` was breached, aborting the run",
                    breached.source,
                    breached.selector
                );
                aborted_flag.store(true, Ordering::Release);
                stop_handle.shutdown();
                break;
            }

            std::thread::sleep(POLL_INTERVAL);
        })?;

    Ok(aborted)
}

/// The first abort threshold that is due for evaluation and fails.
pub(crate) fn check_abort<'a>(
    thresholds: &'a [ThresholdSpec],
    collector: &MetricsCollector,
    elapsed: Duration,
) -> Option<&'a ThresholdSpec> {
    thresholds
        .iter()
        .filter(|t| t.abort_on_fail && elapsed >= t.delay_abort_eval)
        .filter(|t| {
            collector
                .snapshot(&t.selector.metric, &t.selector.filter)
                .is_some_and(|s| !s.is_empty())
        })
        .find(|t| !t.evaluate(collector).passed)
}
