use std::time::Duration;

use crate::benchmark::domain::resource_probe::ResourceProbe;

/// Resource probe for the running process.
///
/// Resident set size comes from `/proc/self/status`. CPU time is the
/// process-wide CPU clock (all threads) at nanosecond resolution. Readings
/// the platform cannot provide are zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcResourceProbe;

impl ProcResourceProbe {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceProbe for ProcResourceProbe {
    fn memory_used_bytes(&self) -> u64 {
        read_proc("/proc/self/status")
            .and_then(|s| parse_vm_rss(&s))
            .unwrap_or(0)
    }

    fn cpu_time(&self) -> Duration {
        process_cpu_time().unwrap_or_default()
    }
}

#[cfg(unix)]
fn process_cpu_time() -> Option<Duration> {
    let mut ts = std::mem::MaybeUninit::<libc::timespec>::uninit();
    // SAFETY: `ts` points to writable storage for one timespec.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, ts.as_mut_ptr()) };
    if rc != 0 {
        log::trace!(
            "Process CPU clock unavailable: {}",
            std::io::Error::last_os_error()
        );
        return None;
    }
    // SAFETY: clock_gettime returned 0, so it filled `ts`.
    let ts = unsafe { ts.assume_init() };
    let secs = u64::try_from(ts.tv_sec).ok()?;
    let nanos = u32::try_from(ts.tv_nsec).ok()?;
    Some(Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn process_cpu_time() -> Option<Duration> {
    None
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) => {
            log::trace!("Could not read {path}: {e}");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_proc(_path: &str) -> Option<String> {
    None
}

/// Extract `VmRSS` (reported in kB) from a `/proc/<pid>/status` body, in bytes.
pub(crate) fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
