use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use gale_core::prelude::DelegatedShutdownListener;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar while the run is in progress to show the user how long is left.
///
/// `planned_runtime` is the time until the last scenario reaches the end of its duration, so the
/// bar may sit at 100% while VUs finish during graceful stop.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    mut finished_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    )?
    .with_key("planned_runtime", {
        let hours = planned_runtime.as_secs() / 3600;
        let minutes = (planned_runtime.as_secs() % 3600) / 60;
        let seconds = planned_runtime.as_secs() % 60;
        move |_state: &ProgressState, w: &mut dyn Write| {
            let _ = write!(w, "{hours:02}:{minutes:02}:{seconds:02}");
        }
    })
    .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if finished_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let elapsed = start_time.elapsed().as_secs();
                if elapsed >= planned_runtime.as_secs() {
                    pb.set_message("stopping");
                }
                pb.set_position(min(elapsed, planned_runtime.as_secs()));
                std::thread::sleep(Duration::from_millis(500));
            }
        })?;

    Ok(())
}
