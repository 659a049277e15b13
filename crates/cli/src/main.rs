use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;

use facemood_core::benchmark::domain::benchmark_engine::BenchmarkEngine;
use facemood_core::benchmark::infrastructure::proc_resource_probe::ProcResourceProbe;
use facemood_core::capture::domain::frame_buffer::FrameBuffer;
use facemood_core::capture::domain::frame_source::FrameSource;
use facemood_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use facemood_core::classification::domain::emotion_classifier::EmotionClassifier;
use facemood_core::classification::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use facemood_core::detection::infrastructure::replay_face_detector::{
    load_manifest, DetectionManifest, RecordedFrame, ReplayFaceDetector,
};
use facemood_core::pipeline::analyze_stream_use_case::{AnalyzeStreamUseCase, SubmitOutcome};
use facemood_core::pipeline::pipeline_config::PipelineConfig;
use facemood_core::pipeline::pipeline_event::PipelineEvent;
use facemood_core::shared::bounding_box::BoundingBox;
use facemood_core::shared::emotion::Emotion;
use facemood_core::shared::stream_metadata::StreamMetadata;

/// Live facial-emotion analysis, replaying an image sequence as a camera.
#[derive(Parser)]
#[command(name = "facemood")]
struct Cli {
    /// Image file or directory of images (replayed in name order).
    input: PathBuf,

    /// ONNX emotion model (input [1,48,48,1], output [1,7]).
    #[arg(long)]
    model: PathBuf,

    /// JSON file of recorded face boxes and labels keyed by file name.
    /// Without it every frame is treated as one full-frame face.
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Simulated camera frame rate.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Minimum milliseconds between analyzed frames.
    #[arg(long, default_value = "500")]
    interval_ms: u64,

    /// Worker threads.
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Confidence percentage a result must exceed to be reported.
    #[arg(long, default_value = "30")]
    threshold: f32,

    /// Sensor orientation in degrees (0, 90, 180, 270).
    #[arg(long, default_value = "0")]
    rotation: u32,

    /// Write the final benchmark metrics as JSON to this file.
    #[arg(long)]
    metrics_json: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = PipelineConfig {
        min_interval: Duration::from_millis(cli.interval_ms),
        worker_count: cli.workers,
        significance_threshold: cli.threshold,
        rotation_degrees: cli.rotation,
        ..Default::default()
    };
    config.validate()?;

    let mut source = ImageSequenceSource::open(&cli.input, cli.fps, cli.rotation)?;
    let metadata = *source.metadata();
    let (upright_w, upright_h) = metadata.upright_size();
    log::info!(
        "Replaying {} frame(s) of {}x{} (upright {upright_w}x{upright_h}) at {} fps; \
         about 1 in {:.0} will be analyzed",
        metadata.frame_count.unwrap_or_default(),
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.frames_per_window(config.min_interval)
    );

    let manifest = match &cli.detections {
        Some(path) => load_manifest(path)?,
        None => full_frame_manifest(source.paths(), &metadata),
    };
    let labels = labels_by_index(&manifest, source.paths());
    let detector = Box::new(ReplayFaceDetector::from_manifest(&manifest, source.paths()));

    let benchmark = Arc::new(BenchmarkEngine::new(Box::new(ProcResourceProbe::new())));
    let (tx, rx) = crossbeam_channel::unbounded();
    let use_case = AnalyzeStreamUseCase::new(config, detector, Arc::clone(&benchmark), tx)?;
    let consumer = spawn_consumer(rx);

    let model = cli.model.clone();
    use_case.start_detection(move || {
        OnnxEmotionClassifier::new(&model).map(|c| Box::new(c) as Box<dyn EmotionClassifier>)
    })?;

    let released = Arc::new(AtomicUsize::new(0));
    let mut queued = 0usize;
    let frame_interval = metadata.frame_interval();
    let start = Instant::now();

    while let Some(frame) = source.next_frame()? {
        let i = frame.index();
        // Pace delivery like a camera would.
        let due = start + frame_interval.mul_f64(i as f64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let counter = Arc::clone(&released);
        let mut buffer = FrameBuffer::new(frame).with_release(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        if let Some(&label) = labels.get(&i) {
            buffer = buffer.with_ground_truth(label);
        }

        if use_case.submit(buffer, Instant::now())? == SubmitOutcome::Queued {
            queued += 1;
        }
    }

    let outcome = use_case.stop_detection()?;
    if outcome.forced_release {
        log::warn!("Last frame did not finish before stop timeout");
    }
    drop(use_case);
    join_consumer(consumer);

    log::info!(
        "Analyzed {queued} of {} frame(s); {} frame buffer(s) released",
        metadata.frame_count.unwrap_or_default(),
        released.load(Ordering::Relaxed)
    );

    let metrics = benchmark.metrics();
    println!();
    print!("{}", metrics.report());

    if let Some(path) = &cli.metrics_json {
        std::fs::write(path, serde_json::to_string_pretty(&metrics)?)?;
        log::info!("Metrics written to {}", path.display());
    }
    Ok(())
}

/// Prints results as they arrive until the pipeline hangs up.
fn spawn_consumer(rx: Receiver<PipelineEvent>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in rx {
            match event {
                PipelineEvent::Started => log::info!("Detection running"),
                PipelineEvent::Results {
                    frame_index,
                    results,
                } => {
                    if results.is_empty() {
                        println!("frame {frame_index}: nothing salient");
                    } else {
                        let line: Vec<String> =
                            results.results.iter().map(|r| r.to_string()).collect();
                        println!("frame {frame_index}: {}", line.join(", "));
                    }
                }
                PipelineEvent::Metrics(m) => log::debug!(
                    "{} frame(s), {:.1} ms avg, {:.1} MB peak",
                    m.frame_count,
                    m.avg_processing_ms,
                    m.peak_memory_mb
                ),
                PipelineEvent::Error(message) => eprintln!("Warning: {message}"),
                PipelineEvent::InitializationFailed(message) => {
                    eprintln!("Initialization failed: {message}")
                }
                PipelineEvent::Stopped { .. } => log::info!("Detection stopped"),
            }
        }
    })
}

fn join_consumer(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Result consumer thread panicked");
    }
}

/// One whole-frame box per image, for inputs that are already face crops.
fn full_frame_manifest(paths: &[PathBuf], metadata: &StreamMetadata) -> DetectionManifest {
    let face = BoundingBox::new(0, 0, metadata.width as i32, metadata.height as i32);
    paths
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .map(|name| {
            let label = label_from_name(&name);
            (
                name,
                RecordedFrame {
                    faces: vec![face],
                    label,
                },
            )
        })
        .collect()
}

/// Recognises an emotion label as the file stem's prefix, e.g. `happy_012.png`.
fn label_from_name(name: &str) -> Option<Emotion> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let prefix = stem.split(['_', '-', '.']).next()?;
    prefix.parse().ok()
}

fn labels_by_index(manifest: &DetectionManifest, paths: &[PathBuf]) -> HashMap<usize, Emotion> {
    paths
        .iter()
        .enumerate()
        .filter_map(|(index, path)| {
            let name = path.file_name()?.to_str()?;
            manifest.get(name)?.label.map(|label| (index, label))
        })
        .collect()
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if !cli.fps.is_finite() || cli.fps <= 0.0 {
        return Err(format!("FPS must be positive, got {}", cli.fps).into());
    }
    if let Some(path) = &cli.detections {
        if !path.is_file() {
            return Err(format!("Detections file not found: {}", path.display()).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facemood_core::shared::frame::PixelFormat;

    #[test]
    fn test_label_from_name() {
        assert_eq!(label_from_name("happy_012.png"), Some(Emotion::Happy));
        assert_eq!(label_from_name("Surprise-7.jpg"), Some(Emotion::Surprise));
        assert_eq!(label_from_name("frame_0001.png"), None);
    }

    #[test]
    fn test_full_frame_manifest_and_labels() {
        let paths = vec![PathBuf::from("/tmp/seq/sad_1.png"), PathBuf::from("/tmp/seq/x.png")];
        let metadata = StreamMetadata {
            width: 64,
            height: 48,
            pixel_format: PixelFormat::Rgb8,
            fps: 30.0,
            sensor_rotation: 0,
            frame_count: Some(2),
        };
        let manifest = full_frame_manifest(&paths, &metadata);
        assert_eq!(manifest["x.png"].faces, vec![BoundingBox::new(0, 0, 64, 48)]);

        let labels = labels_by_index(&manifest, &paths);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[&0], Emotion::Sad);
    }
}
