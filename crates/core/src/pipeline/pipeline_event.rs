use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::benchmark::domain::benchmark_metrics::BenchmarkMetrics;
use crate::pipeline::result_aggregator::FrameResultSet;

/// Updates pushed to the consumer. Consumers must tolerate any timing and
/// empty result sets.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started,
    Results {
        frame_index: usize,
        results: FrameResultSet,
    },
    Metrics(BenchmarkMetrics),
    Error(String),
    /// The classifier could not be loaded; detection did not start.
    InitializationFailed(String),
    /// Detection stopped. Consumers clear any displayed results.
    Stopped {
        forced_release: bool,
    },
}

/// Suppresses an error message identical to the previous one while it
/// repeats inside `window`.
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Whether `message` should be published at `now`.
    pub fn should_publish(&mut self, message: &str, now: Instant) -> bool {
        if let Some((prev, at)) = &self.last {
            if prev == message && now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((message.to_string(), now));
        true
    }
}

/// Sending half of the consumer channel.
///
/// A disconnected consumer is not an error for the pipeline; events are
/// simply discarded.
#[derive(Debug)]
pub struct EventPublisher {
    tx: Sender<PipelineEvent>,
    throttle: Mutex<ErrorThrottle>,
}

impl EventPublisher {
    pub fn new(tx: Sender<PipelineEvent>, error_repeat_window: Duration) -> Self {
        Self {
            tx,
            throttle: Mutex::new(ErrorThrottle::new(error_repeat_window)),
        }
    }

    pub fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("Consumer disconnected; event discarded");
        }
    }

    pub fn publish_error(&self, message: String, now: Instant) {
        let allowed = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_publish(&message, now);
        if allowed {
            self.publish(PipelineEvent::Error(message));
        } else {
            log::debug!("Suppressed repeated error: {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(2000);

    #[test]
    fn test_throttle_suppresses_repeats_inside_window() {
        let mut throttle = ErrorThrottle::new(WINDOW);
        let t0 = Instant::now();
        assert!(throttle.should_publish("detector failed", t0));
        assert!(!throttle.should_publish("detector failed", t0 + Duration::from_millis(500)));
        assert!(!throttle.should_publish("detector failed", t0 + Duration::from_millis(1999)));
        assert!(throttle.should_publish("detector failed", t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_throttle_passes_different_messages() {
        let mut throttle = ErrorThrottle::new(WINDOW);
        let t0 = Instant::now();
        assert!(throttle.should_publish("a", t0));
        assert!(throttle.should_publish("b", t0));
        assert!(throttle.should_publish("a", t0));
    }

    #[test]
    fn test_publisher_throttles_errors_only() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let publisher = EventPublisher::new(tx, WINDOW);
        let t0 = Instant::now();

        publisher.publish_error("boom".into(), t0);
        publisher.publish_error("boom".into(), t0 + Duration::from_millis(10));
        publisher.publish(PipelineEvent::Started);
        publisher.publish(PipelineEvent::Started);

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PipelineEvent::Error("boom".into()),
                PipelineEvent::Started,
                PipelineEvent::Started
            ]
        );
    }

    #[test]
    fn test_publish_to_dropped_consumer_is_silent() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let publisher = EventPublisher::new(tx, WINDOW);
        publisher.publish(PipelineEvent::Started);
        publisher.publish_error("x".into(), Instant::now());
    }
}
