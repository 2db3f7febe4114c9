//! Process resource usage reporting.

use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// A snapshot of this process's resource usage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Usage {
    /// Resident set size, in bytes.
    pub memory: u64,
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu: f32,
}

impl Usage {
    /// Resident set size in MiB.
    pub fn memory_mb(&self) -> f64 {
        self.memory as f64 / (1024.0 * 1024.0)
    }
}

/// Samples the resource usage of the current process.
///
/// CPU usage is measured between consecutive samples, so the first sample always reports 0%.
pub struct ResourceMonitor {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::warn!("resource usage will not be reported: {err}");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// Take a sample.
    pub fn sample(&self) -> Option<Usage> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        Some(Usage {
            memory: process.memory(),
            cpu: process.cpu_usage(),
        })
    }

    /// Log a sample, labelled with the current `stage` of processing.
    pub fn log(&self, stage: &str) {
        if let Some(usage) = self.sample() {
            tracing::info!(
                "{stage} - Memory Usage: {:.2} MB, CPU Usage: {}%",
                usage.memory_mb(),
                usage.cpu
            );
        }
    }
}
