//! Host load sampling for session admission.

/// Samples the host's 1-minute load average.
pub trait LoadMonitor: Send + Sync {
    /// The current 1-minute load average.
    fn load_avg(&self) -> f64;
}

/// Reads `/proc/loadavg`. Unreadable or unparseable input reports zero
/// load, so admission stays open on platforms without procfs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcLoad;

impl LoadMonitor for ProcLoad {
    fn load_avg(&self) -> f64 {
        std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|contents| {
                contents
                    .split_whitespace()
                    .next()
                    .and_then(|first| first.parse().ok())
            })
            .unwrap_or(0.0)
    }
}

/// A fixed load value, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub f64);

impl LoadMonitor for FixedLoad {
    fn load_avg(&self) -> f64 {
        self.0
    }
}
