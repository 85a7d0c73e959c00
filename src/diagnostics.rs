//! Optional introspection into the managed process
//!
//! Live diagnostics (thread count, CPU load, memory usage) are a side
//! channel of the control endpoint, never a requirement for lifecycle
//! correctness. The probe is a capability: platforms without support get
//! the no-op implementation and status queries simply omit the numbers.

use serde::{Deserialize, Serialize};

/// Memory usage of the managed process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Total virtual size in bytes
    pub total_bytes: u64,
    /// Resident set size in bytes
    pub resident_bytes: u64,
}

/// Capability interface answering live questions about a process.
pub trait DiagnosticsProbe: Send + Sync {
    /// Number of threads in the process, when the platform can tell.
    fn thread_count(&self, pid: u32) -> Option<u64>;
    /// Recent system load, when the platform can tell.
    fn cpu_load(&self) -> Option<f64>;
    /// Memory usage of the process, when the platform can tell.
    fn memory_usage(&self, pid: u32) -> Option<MemoryUsage>;
}

/// Probe for platforms without introspection support.
pub struct NoopProbe;

impl DiagnosticsProbe for NoopProbe {
    fn thread_count(&self, _pid: u32) -> Option<u64> {
        None
    }

    fn cpu_load(&self) -> Option<f64> {
        None
    }

    fn memory_usage(&self, _pid: u32) -> Option<MemoryUsage> {
        None
    }
}

/// Probe backed by the `/proc` filesystem.
#[cfg(target_os = "linux")]
pub struct ProcProbe;

#[cfg(target_os = "linux")]
impl DiagnosticsProbe for ProcProbe {
    fn thread_count(&self, pid: u32) -> Option<u64> {
        let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
        status
            .lines()
            .find_map(|line| line.strip_prefix("Threads:"))
            .and_then(|rest| rest.trim().parse().ok())
    }

    fn cpu_load(&self) -> Option<f64> {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        loadavg.split_whitespace().next()?.parse().ok()
    }

    fn memory_usage(&self, pid: u32) -> Option<MemoryUsage> {
        // /proc/<pid>/statm reports sizes in pages; 4 KiB pages assumed.
        const PAGE_SIZE: u64 = 4096;
        let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
        let mut fields = statm.split_whitespace();
        let total: u64 = fields.next()?.parse().ok()?;
        let resident: u64 = fields.next()?.parse().ok()?;
        Some(MemoryUsage {
            total_bytes: total * PAGE_SIZE,
            resident_bytes: resident * PAGE_SIZE,
        })
    }
}

/// The probe for the platform the launcher was built for.
#[must_use]
pub fn platform_probe() -> Box<dyn DiagnosticsProbe> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcProbe)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NoopProbe)
    }
}

/// Everything the probe can tell about a process right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    /// Number of threads, if known
    pub thread_count: Option<u64>,
    /// Recent system load, if known
    pub cpu_load: Option<f64>,
    /// Memory usage, if known
    pub memory: Option<MemoryUsage>,
}

/// Collects a snapshot for `pid`, or an empty one when no process runs.
#[must_use]
pub fn snapshot(probe: &dyn DiagnosticsProbe, pid: Option<u32>) -> DiagnosticsSnapshot {
    match pid {
        Some(pid) => DiagnosticsSnapshot {
            thread_count: probe.thread_count(pid),
            cpu_load: probe.cpu_load(),
            memory: probe.memory_usage(pid),
        },
        None => DiagnosticsSnapshot {
            thread_count: None,
            cpu_load: None,
            memory: None,
        },
    }
}
