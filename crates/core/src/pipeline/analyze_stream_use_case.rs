use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::benchmark::domain::benchmark_engine::{BenchmarkEngine, EvaluationId};
use crate::capture::domain::frame_buffer::FrameBuffer;
use crate::classification::domain::emotion_classifier::{ClassificationError, EmotionClassifier};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::region_extractor::RegionExtractor;
use crate::pipeline::concurrency_guard::ConcurrencyGuard;
use crate::pipeline::frame_gate::{AdmittedFrame, Admission, DropReason, FrameGate};
use crate::pipeline::inference_dispatcher::InferenceDispatcher;
use crate::pipeline::infrastructure::worker_pool::{panic_message, WorkerPool, WorkerPoolError};
use crate::pipeline::pipeline_config::{ConfigError, PipelineConfig};
use crate::pipeline::pipeline_event::{EventPublisher, PipelineEvent};
use crate::pipeline::result_aggregator::{FrameResultSet, ResultAggregator};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::emotion::{Emotion, EmotionResult};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("emotion classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("detection is not running")]
    NotDetecting,
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    WorkerPool(#[from] WorkerPoolError),
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// The in-flight frame outlived the stop timeout and the guard was
    /// released without it.
    pub forced_release: bool,
}

/// Shared state every frame job works against.
struct FrameWork {
    detector: Mutex<Box<dyn FaceDetector>>,
    dispatcher: Mutex<Option<InferenceDispatcher>>,
    extractor: RegionExtractor,
    aggregator: ResultAggregator,
    benchmark: Arc<BenchmarkEngine>,
    publisher: EventPublisher,
    rotation_degrees: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Analyzes a live frame stream for facial emotions.
///
/// Frames are offered with [`submit`](Self::submit). The gate admits at most
/// one frame per interval and never more than one in flight; admitted frames
/// run on the worker pool through detect, extract, classify and aggregate.
/// Results, metrics snapshots and errors go to the event channel.
pub struct AnalyzeStreamUseCase {
    config: PipelineConfig,
    guard: Arc<ConcurrencyGuard>,
    gate: FrameGate,
    work: Arc<FrameWork>,
    pool: WorkerPool,
}

impl AnalyzeStreamUseCase {
    pub fn new(
        config: PipelineConfig,
        detector: Box<dyn FaceDetector>,
        benchmark: Arc<BenchmarkEngine>,
        events: Sender<PipelineEvent>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let guard = Arc::new(ConcurrencyGuard::new());
        let gate = FrameGate::new(config.min_interval, Arc::clone(&guard));
        let pool = WorkerPool::new(config.worker_count)?;
        let work = Arc::new(FrameWork {
            detector: Mutex::new(detector),
            dispatcher: Mutex::new(None),
            extractor: RegionExtractor::new(),
            aggregator: ResultAggregator::new(config.significance_threshold),
            benchmark,
            publisher: EventPublisher::new(events, config.error_repeat_window),
            rotation_degrees: config.rotation_degrees,
        });

        Ok(Self {
            config,
            guard,
            gate,
            work,
            pool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn benchmark(&self) -> &Arc<BenchmarkEngine> {
        &self.work.benchmark
    }

    pub fn is_detecting(&self) -> bool {
        self.gate.is_detecting()
    }

    pub fn is_in_flight(&self) -> bool {
        self.guard.is_held()
    }

    /// Block until no frame is in flight, or `timeout` elapses.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.guard.wait_idle(timeout)
    }

    /// Enable detection, loading the classifier through `loader` the first
    /// time.
    ///
    /// A loader failure is published as [`PipelineEvent::InitializationFailed`]
    /// and detection stays off. Later starts reuse the loaded classifier and
    /// do not call `loader`.
    pub fn start_detection<F>(&self, loader: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<Box<dyn EmotionClassifier>, ClassificationError>,
    {
        {
            let mut dispatcher = lock(&self.work.dispatcher);
            if dispatcher.is_none() {
                match loader() {
                    Ok(classifier) => {
                        log::info!("Emotion classifier loaded");
                        *dispatcher = Some(InferenceDispatcher::new(classifier));
                    }
                    Err(e) => {
                        let message = e.to_string();
                        log::error!("Cannot start detection: {message}");
                        self.work
                            .publisher
                            .publish(PipelineEvent::InitializationFailed(message.clone()));
                        return Err(PipelineError::ClassifierUnavailable(message));
                    }
                }
            }
        }

        self.gate.set_detecting(true);
        log::info!("Detection started");
        self.work.publisher.publish(PipelineEvent::Started);
        Ok(())
    }

    /// Stop admitting frames and wind down the in-flight one.
    ///
    /// The in-flight frame, if any, is allowed to finish. If it is still
    /// running after `stop_timeout` the guard is force-released and whatever
    /// that frame produces later is discarded.
    pub fn stop_detection(&self) -> Result<StopOutcome, PipelineError> {
        if !self.gate.is_detecting() {
            return Err(PipelineError::NotDetecting);
        }
        self.gate.set_detecting(false);
        log::info!("Stopping detection");

        let drained = self.guard.wait_idle(self.config.stop_timeout);
        if !drained {
            log::warn!(
                "In-flight frame still running after {:?}; forcing release",
                self.config.stop_timeout
            );
            self.guard.release();
        }

        self.work.publisher.publish(PipelineEvent::Stopped {
            forced_release: !drained,
        });
        Ok(StopOutcome {
            forced_release: !drained,
        })
    }

    /// Offer a frame captured at `now`.
    ///
    /// A dropped frame is released before this returns. A queued frame is
    /// released by the worker once processing ends, on every path.
    pub fn submit(
        &self,
        buffer: FrameBuffer,
        now: Instant,
    ) -> Result<SubmitOutcome, PipelineError> {
        let admitted = match self.gate.admit(buffer, now) {
            Admission::Admitted(admitted) => admitted,
            Admission::Dropped(reason) => return Ok(SubmitOutcome::Dropped(reason)),
        };

        let index = admitted.buffer.frame().index();
        log::debug!("Admitted frame {index}");
        let evaluation = self.work.benchmark.start_evaluation();

        let work = Arc::clone(&self.work);
        if let Err(e) = self.pool.execute(move || work.run(admitted, evaluation)) {
            // The job, and with it the buffer and permit, is already dropped.
            self.work.benchmark.cancel_evaluation(evaluation);
            log::error!("Could not queue frame {index}: {e}");
            return Err(e.into());
        }
        Ok(SubmitOutcome::Queued)
    }
}

impl FrameWork {
    /// Runs one admitted frame. The permit outlives the processing so every
    /// outcome can be checked against it; once it is stale the frame may
    /// only clean up its own evaluation.
    fn run(&self, admitted: AdmittedFrame, evaluation: EvaluationId) {
        let AdmittedFrame { buffer, permit } = admitted;
        let index = buffer.frame().index();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(buffer, evaluation)));
        if !permit.is_current() {
            self.benchmark.cancel_evaluation(evaluation);
            log::debug!("Frame {index} finished after a forced release; discarding its outcome");
            return;
        }

        match outcome {
            Ok(Ok((results, ground_truth))) => {
                if let (Some(actual), Some(top)) = (ground_truth, results.top()) {
                    self.benchmark.record_prediction(top.emotion, actual);
                }
                if let Err(e) = self.benchmark.end_evaluation(evaluation) {
                    log::debug!("Frame {index}: {e}");
                }
                self.publisher.publish(PipelineEvent::Results {
                    frame_index: index,
                    results,
                });
                self.publisher
                    .publish(PipelineEvent::Metrics(self.benchmark.metrics()));
            }
            Ok(Err(message)) => {
                self.benchmark.cancel_evaluation(evaluation);
                self.publisher.publish_error(message, Instant::now());
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!("Processing frame {index} panicked: {message}");
                self.benchmark.cancel_evaluation(evaluation);
                self.publisher
                    .publish_error(format!("Frame processing failed: {message}"), Instant::now());
            }
        }
    }

    /// Detect, extract, classify and aggregate. The buffer is released
    /// before this returns. A detector failure comes back as the message to
    /// publish.
    fn process(
        &self,
        buffer: FrameBuffer,
        evaluation: EvaluationId,
    ) -> Result<(FrameResultSet, Option<Emotion>), String> {
        let index = buffer.frame().index();

        self.benchmark.start_detection(evaluation);
        let detected = lock(&self.detector).detect(buffer.frame(), self.rotation_degrees);
        let _ = self.benchmark.end_detection(evaluation);

        let boxes = detected.map_err(|e| {
            log::error!("Face detection failed on frame {index}: {e}");
            format!("Face detection failed: {e}")
        })?;
        log::debug!("Frame {index}: {} face(s) detected", boxes.len());

        let per_face = self.classify_faces(&buffer, &boxes);
        let results = self.aggregator.aggregate(&per_face);
        Ok((results, buffer.ground_truth()))
    }

    fn classify_faces(
        &self,
        buffer: &FrameBuffer,
        boxes: &[BoundingBox],
    ) -> Vec<Vec<EmotionResult>> {
        if boxes.is_empty() {
            return Vec::new();
        }
        let matrix = buffer.working_matrix();
        let regions = self.extractor.extract(&matrix, boxes);

        let mut slot = lock(&self.dispatcher);
        let Some(dispatcher) = slot.as_mut() else {
            log::warn!("No emotion classifier loaded; skipping {} face(s)", regions.len());
            return Vec::new();
        };

        regions
            .iter()
            .filter_map(|region| match dispatcher.classify(region) {
                Ok(results) => Some(results),
                Err(e) => {
                    log::warn!("Skipping face at {:?}: {e}", region.source_box());
                    None
                }
            })
            .collect()
    }
}
