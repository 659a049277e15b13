use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_buffer::FrameBuffer;
use crate::pipeline::concurrency_guard::{ConcurrencyGuard, FlightPermit};

/// Why a frame was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    DetectionDisabled,
    TooSoon,
    InFlight,
}

/// A frame that passed the gate, together with the single-flight permit.
///
/// Dropping it releases both the buffer and the permit.
#[derive(Debug)]
pub struct AdmittedFrame {
    pub buffer: FrameBuffer,
    pub permit: FlightPermit,
}

#[derive(Debug)]
pub enum Admission {
    Admitted(AdmittedFrame),
    Dropped(DropReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

/// Rate-limiting admission control in front of the pipeline.
///
/// A frame is admitted only while detection is enabled, at least
/// `min_interval` after the previously admitted frame, and when no other
/// frame is in flight. Nothing is queued: a rejected frame is released
/// immediately.
#[derive(Debug)]
pub struct FrameGate {
    min_interval: Duration,
    detecting: AtomicBool,
    last_admitted: Mutex<Option<Instant>>,
    guard: Arc<ConcurrencyGuard>,
}

impl FrameGate {
    pub fn new(min_interval: Duration, guard: Arc<ConcurrencyGuard>) -> Self {
        Self {
            min_interval,
            detecting: AtomicBool::new(false),
            last_admitted: Mutex::new(None),
            guard,
        }
    }

    pub fn set_detecting(&self, detecting: bool) {
        self.detecting.store(detecting, Ordering::SeqCst);
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::SeqCst)
    }

    pub fn last_admitted(&self) -> Option<Instant> {
        *self.lock_last()
    }

    pub fn guard(&self) -> &Arc<ConcurrencyGuard> {
        &self.guard
    }

    fn lock_last(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn too_soon(&self, now: Instant) -> bool {
        match *self.lock_last() {
            Some(last) => now.saturating_duration_since(last) < self.min_interval,
            None => false,
        }
    }

    /// Decide whether `buffer` enters the pipeline.
    ///
    /// On rejection the buffer is dropped (and so released) before returning.
    pub fn admit(&self, buffer: FrameBuffer, now: Instant) -> Admission {
        let index = buffer.frame().index();
        let reason = match self.try_admit(now) {
            Ok(permit) => return Admission::Admitted(AdmittedFrame { buffer, permit }),
            Err(reason) => reason,
        };
        log::trace!("Dropping frame {index}: {reason:?}");
        drop(buffer);
        Admission::Dropped(reason)
    }

    fn try_admit(&self, now: Instant) -> Result<FlightPermit, DropReason> {
        if !self.is_detecting() {
            return Err(DropReason::DetectionDisabled);
        }
        if self.too_soon(now) {
            return Err(DropReason::TooSoon);
        }
        let permit = self.guard.try_acquire().ok_or(DropReason::InFlight)?;

        // Another frame may have been admitted and finished between the
        // interval check and the acquisition; check again while holding
        // the permit. Returning the error drops the permit.
        let mut last = self.lock_last();
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < self.min_interval {
                return Err(DropReason::TooSoon);
            }
        }
        *last = Some(now);
        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::{Frame, PixelFormat};
    use rstest::rstest;
    use std::sync::atomic::AtomicUsize;

    const INTERVAL: Duration = Duration::from_millis(500);

    fn gate() -> FrameGate {
        let gate = FrameGate::new(INTERVAL, Arc::new(ConcurrencyGuard::new()));
        gate.set_detecting(true);
        gate
    }

    fn buffer(index: usize, releases: &Arc<AtomicUsize>) -> FrameBuffer {
        let frame = Frame::new(vec![0; 4], 2, 2, PixelFormat::Gray8, index).unwrap();
        let releases = Arc::clone(releases);
        FrameBuffer::new(frame).with_release(move |_| {
            releases.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn ms(t0: Instant, n: u64) -> Instant {
        t0 + Duration::from_millis(n)
    }

    #[test]
    fn test_interval_scenario() {
        // Arrivals at 0, 100, 600 ms: admitted, dropped, admitted.
        let gate = gate();
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();

        let first = gate.admit(buffer(0, &releases), t0);
        assert!(first.is_admitted());
        drop(first);

        let second = gate.admit(buffer(1, &releases), ms(t0, 100));
        assert!(matches!(second, Admission::Dropped(DropReason::TooSoon)));

        let third = gate.admit(buffer(2, &releases), ms(t0, 600));
        assert!(third.is_admitted());
        assert_eq!(gate.last_admitted(), Some(ms(t0, 600)));
        drop(third);

        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[rstest]
    #[case::just_below(499, false)]
    #[case::exactly_at(500, true)]
    #[case::above(750, true)]
    fn test_interval_boundary(#[case] after_ms: u64, #[case] admitted: bool) {
        let gate = gate();
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        drop(gate.admit(buffer(0, &releases), t0));
        assert_eq!(
            gate.admit(buffer(1, &releases), ms(t0, after_ms)).is_admitted(),
            admitted
        );
    }

    #[test]
    fn test_rejects_while_in_flight_and_releases_frame() {
        let gate = gate();
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();

        let held = gate.admit(buffer(0, &releases), t0);
        assert!(held.is_admitted());

        let rejected = gate.admit(buffer(1, &releases), ms(t0, 1000));
        assert!(matches!(rejected, Admission::Dropped(DropReason::InFlight)));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        // A rejected frame does not move the interval window.
        assert_eq!(gate.last_admitted(), Some(t0));

        drop(held);
        assert_eq!(releases.load(Ordering::SeqCst), 2);
        assert!(gate.admit(buffer(2, &releases), ms(t0, 1000)).is_admitted());
    }

    #[test]
    fn test_rejects_when_disabled() {
        let gate = gate();
        gate.set_detecting(false);
        let releases = Arc::new(AtomicUsize::new(0));
        let outcome = gate.admit(buffer(0, &releases), Instant::now());
        assert!(matches!(
            outcome,
            Admission::Dropped(DropReason::DetectionDisabled)
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!gate.guard().is_held());
        assert_eq!(gate.last_admitted(), None);
    }

    #[test]
    fn test_too_soon_does_not_hold_guard() {
        let gate = gate();
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        drop(gate.admit(buffer(0, &releases), t0));
        let _ = gate.admit(buffer(1, &releases), ms(t0, 10));
        assert!(!gate.guard().is_held());
    }

    #[test]
    fn test_earlier_timestamp_than_last_is_too_soon() {
        let gate = gate();
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();
        drop(gate.admit(buffer(0, &releases), ms(t0, 1000)));
        assert!(matches!(
            gate.admit(buffer(1, &releases), t0),
            Admission::Dropped(DropReason::TooSoon)
        ));
    }

    #[test]
    fn test_concurrent_burst_admits_at_most_one() {
        let gate = Arc::new(gate());
        let releases = Arc::new(AtomicUsize::new(0));
        let t0 = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = Arc::clone(&gate);
                let releases = Arc::clone(&releases);
                std::thread::spawn(move || {
                    // Keep admitted frames alive so the burst overlaps them.
                    let outcome = gate.admit(buffer(i, &releases), ms(t0, i as u64));
                    std::thread::sleep(Duration::from_millis(20));
                    outcome.is_admitted()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&a| a)
            .count();

        assert_eq!(admitted, 1);
        assert_eq!(releases.load(Ordering::SeqCst), 16);
        assert!(!gate.guard().is_held());
    }
}
