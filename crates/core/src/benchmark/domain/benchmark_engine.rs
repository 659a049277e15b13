use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::benchmark_metrics::{BenchmarkMetrics, ConfusionEntry};
use super::resource_probe::ResourceProbe;
use super::statistics::{mean, population_std_dev};
use crate::shared::emotion::Emotion;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchmarkError {
    #[error("no evaluation in progress for this token")]
    NotEvaluating,
    #[error("end_detection called without a matching start_detection")]
    NotDetecting,
}

/// Identifies one evaluation window.
///
/// Returned by [`BenchmarkEngine::start_evaluation`]. Ending, cancelling or
/// timing detection with a token whose window has been superseded does
/// nothing, so late work from an abandoned frame cannot touch a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvaluationId(u64);

/// One completed evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkSample {
    pub duration: Duration,
    pub memory_used: u64,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Evaluating {
        id: EvaluationId,
        started: Instant,
        cpu_start: Duration,
        detection_started: Option<Instant>,
    },
}

#[derive(Debug)]
struct BenchmarkState {
    phase: Phase,
    next_id: u64,
    samples: Vec<BenchmarkSample>,
    detection_times: Vec<Duration>,
    current_memory: u64,
    peak_memory: u64,
    cpu_utilization: f64,
    correct_predictions: u32,
    total_predictions: u32,
    confusion: BTreeMap<(Emotion, Emotion), u32>,
}

impl Default for BenchmarkState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            next_id: 0,
            samples: Vec::new(),
            detection_times: Vec::new(),
            current_memory: 0,
            peak_memory: 0,
            cpu_utilization: 0.0,
            correct_predictions: 0,
            total_predictions: 0,
            confusion: BTreeMap::new(),
        }
    }
}

impl BenchmarkState {
    /// The open window, if it belongs to `id`.
    fn window(&mut self, id: EvaluationId) -> Option<&mut Phase> {
        match self.phase {
            Phase::Evaluating { id: current, .. } if current == id => Some(&mut self.phase),
            _ => None,
        }
    }
}

/// Collects per-frame timing, memory, CPU and accuracy figures.
///
/// Safe to share between threads. Every operation, including `reset`,
/// takes the internal lock exactly once, so readers never observe a
/// half-updated state.
pub struct BenchmarkEngine {
    probe: Box<dyn ResourceProbe>,
    state: Mutex<BenchmarkState>,
}

impl BenchmarkEngine {
    pub fn new(probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            probe,
            state: Mutex::new(BenchmarkState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BenchmarkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_evaluating(&self) -> bool {
        matches!(self.lock().phase, Phase::Evaluating { .. })
    }

    /// Open a new evaluation window, superseding any open one.
    pub fn start_evaluation(&self) -> EvaluationId {
        self.start_evaluation_at(Instant::now())
    }

    pub fn start_evaluation_at(&self, now: Instant) -> EvaluationId {
        let cpu_start = self.probe.cpu_time();
        let mut state = self.lock();
        if let Phase::Evaluating { id, .. } = state.phase {
            log::debug!("Evaluation {} superseded before it ended", id.0);
        }
        let id = EvaluationId(state.next_id);
        state.next_id += 1;
        state.phase = Phase::Evaluating {
            id,
            started: now,
            cpu_start,
            detection_started: None,
        };
        id
    }

    /// Close the window `id` and record a sample.
    pub fn end_evaluation(&self, id: EvaluationId) -> Result<BenchmarkSample, BenchmarkError> {
        self.end_evaluation_at(id, Instant::now())
    }

    pub fn end_evaluation_at(
        &self,
        id: EvaluationId,
        now: Instant,
    ) -> Result<BenchmarkSample, BenchmarkError> {
        let cpu_now = self.probe.cpu_time();
        let memory = self.probe.memory_used_bytes();

        let mut state = self.lock();
        let Some(&mut Phase::Evaluating {
            started, cpu_start, ..
        }) = state.window(id)
        else {
            log::debug!("end_evaluation for evaluation {} that is not open; ignored", id.0);
            return Err(BenchmarkError::NotEvaluating);
        };
        state.phase = Phase::Idle;

        let wall = now.saturating_duration_since(started);
        let sample = BenchmarkSample {
            duration: wall,
            memory_used: memory,
        };
        state.samples.push(sample);
        state.current_memory = memory;
        state.peak_memory = state.peak_memory.max(memory);
        state.cpu_utilization = cpu_ratio(cpu_now.saturating_sub(cpu_start), wall);

        log::trace!(
            "Evaluation took {:.2} ms, rss {} bytes, cpu {:.2}",
            wall.as_secs_f64() * 1000.0,
            memory,
            state.cpu_utilization
        );
        Ok(sample)
    }

    /// Abandon the window `id` without recording a sample. Returns whether
    /// `id` was still open.
    pub fn cancel_evaluation(&self, id: EvaluationId) -> bool {
        let mut state = self.lock();
        if state.window(id).is_none() {
            return false;
        }
        state.phase = Phase::Idle;
        true
    }

    /// Start the face-detection sub-timer inside window `id`.
    pub fn start_detection(&self, id: EvaluationId) {
        self.start_detection_at(id, Instant::now());
    }

    pub fn start_detection_at(&self, id: EvaluationId, now: Instant) {
        if let Some(Phase::Evaluating {
            detection_started, ..
        }) = self.lock().window(id)
        {
            *detection_started = Some(now);
        }
    }

    pub fn end_detection(&self, id: EvaluationId) -> Result<Duration, BenchmarkError> {
        self.end_detection_at(id, Instant::now())
    }

    pub fn end_detection_at(
        &self,
        id: EvaluationId,
        now: Instant,
    ) -> Result<Duration, BenchmarkError> {
        let mut state = self.lock();
        let Some(Phase::Evaluating {
            detection_started, ..
        }) = state.window(id)
        else {
            return Err(BenchmarkError::NotEvaluating);
        };
        let started = detection_started.take().ok_or(BenchmarkError::NotDetecting)?;
        let elapsed = now.saturating_duration_since(started);
        state.detection_times.push(elapsed);
        Ok(elapsed)
    }

    /// Tally a prediction against its ground-truth label.
    pub fn record_prediction(&self, predicted: Emotion, actual: Emotion) {
        let mut state = self.lock();
        state.total_predictions += 1;
        if predicted == actual {
            state.correct_predictions += 1;
        }
        *state.confusion.entry((predicted, actual)).or_insert(0) += 1;
    }

    pub fn metrics(&self) -> BenchmarkMetrics {
        let state = self.lock();

        let processing_ms: Vec<f64> = state
            .samples
            .iter()
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();
        let memory_mb: Vec<f64> = state
            .samples
            .iter()
            .map(|s| s.memory_used as f64 / BYTES_PER_MB)
            .collect();
        let detection_ms: Vec<f64> = state
            .detection_times
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();

        let accuracy = if state.total_predictions == 0 {
            0.0
        } else {
            state.correct_predictions as f64 / state.total_predictions as f64 * 100.0
        };

        BenchmarkMetrics {
            frame_count: state.samples.len(),
            avg_processing_ms: mean(&processing_ms),
            std_dev_processing_ms: population_std_dev(&processing_ms),
            avg_detection_ms: mean(&detection_ms),
            current_memory_mb: state.current_memory as f64 / BYTES_PER_MB,
            peak_memory_mb: state.peak_memory as f64 / BYTES_PER_MB,
            avg_memory_mb: mean(&memory_mb),
            std_dev_memory_mb: population_std_dev(&memory_mb),
            cpu_utilization: state.cpu_utilization,
            accuracy,
            total_predictions: state.total_predictions,
            correct_predictions: state.correct_predictions,
            confusion: state
                .confusion
                .iter()
                .map(|(&(predicted, actual), &count)| ConfusionEntry {
                    predicted,
                    actual,
                    count,
                })
                .collect(),
        }
    }

    /// Clear every accumulator and return to idle. Tokens issued before the
    /// reset stay invalid.
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = BenchmarkState {
            next_id: state.next_id,
            ..BenchmarkState::default()
        };
        drop(state);
        log::debug!("Benchmark state reset");
    }
}

fn cpu_ratio(cpu: Duration, wall: Duration) -> f64 {
    let wall = wall.as_secs_f64();
    if wall <= 0.0 {
        return 0.0;
    }
    cpu.as_secs_f64() / wall
}
