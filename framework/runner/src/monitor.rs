use gale_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Share of the machine's CPU above which the load generator itself may skew the results.
const HIGH_CPU_PERCENT: f32 = 80.0;

/// Monitor the resource usage of the Gale process and report high usage.
///
/// Note that this won't stop the run proceeding, it will just log a warning to let the user know
/// that latency measurements might be inflated by the load generator competing for CPU.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and
/// checked. If it is above [HIGH_CPU_PERCENT] with respect to the number of cores then a warning is
/// logged.
pub(crate) fn start_monitor(mut finished_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if finished_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                match sys.process(this_process_pid) {
                    Some(process) => {
                        let usage = process.cpu_usage() / cpu_count as f32;
                        if usage > HIGH_CPU_PERCENT {
                            log::warn!("High CPU usage detected. Gale is using {usage:.2}% of the CPU, with {cpu_count} available cores");
                        }
                    }
                    None => {
                        log::debug!("Process info unavailable, stopping the resource monitor");
                        break;
                    }
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(std::time::Duration::from_secs(1)));
            }
        })?;

    Ok(())
}
