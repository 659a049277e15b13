use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GuardState {
    held: bool,
    /// Bumped on every acquisition so a permit can tell whether it still
    /// owns the flag after a forced release.
    generation: u64,
}

/// Single-flight flag: at most one frame is mid-pipeline at a time.
///
/// [`try_acquire`](Self::try_acquire) never blocks. The returned
/// [`FlightPermit`] releases the flag when dropped, so every exit path of
/// the in-flight work (success, error, early return, panic) gives it back.
#[derive(Debug, Default)]
pub struct ConcurrencyGuard {
    state: Mutex<GuardState>,
    idle: Condvar,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically check-and-set the flag. Returns `None` if already held.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightPermit> {
        let mut state = self.lock();
        if state.held {
            return None;
        }
        state.held = true;
        state.generation = state.generation.wrapping_add(1);
        Some(FlightPermit {
            guard: Arc::clone(self),
            generation: state.generation,
        })
    }

    /// Force the flag clear regardless of who holds it.
    ///
    /// The outstanding permit, if any, becomes stale: dropping it later
    /// leaves the flag alone.
    pub fn release(&self) {
        let mut state = self.lock();
        if state.held {
            log::debug!("Force-releasing in-flight permit (generation {})", state.generation);
        }
        state.held = false;
        drop(state);
        self.idle.notify_all();
    }

    pub fn is_held(&self) -> bool {
        self.lock().held
    }

    /// Block until the flag is clear or `timeout` elapses.
    /// Returns `true` if the flag was observed clear.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (next, _) = self
                .idle
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
        true
    }

    fn release_generation(&self, generation: u64) {
        let mut state = self.lock();
        if !state.held || state.generation != generation {
            return;
        }
        state.held = false;
        drop(state);
        self.idle.notify_all();
    }
}

/// Proof of holding the [`ConcurrencyGuard`]. Releases it on drop.
#[derive(Debug)]
pub struct FlightPermit {
    guard: Arc<ConcurrencyGuard>,
    generation: u64,
}

impl FlightPermit {
    /// `false` once the guard has been force-released out from under this permit.
    pub fn is_current(&self) -> bool {
        let state = self.guard.lock();
        state.held && state.generation == self.generation
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.guard.release_generation(self.generation);
    }
}
