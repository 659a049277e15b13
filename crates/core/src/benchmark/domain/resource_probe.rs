use std::time::Duration;

/// Reads process resource usage for the benchmark engine.
pub trait ResourceProbe: Send + Sync {
    /// Memory currently in use by the process, in bytes.
    fn memory_used_bytes(&self) -> u64;

    /// CPU time consumed by the process so far, summed over all threads.
    fn cpu_time(&self) -> Duration;
}
