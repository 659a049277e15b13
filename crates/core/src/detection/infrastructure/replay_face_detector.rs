use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::emotion::Emotion;
use crate::shared::frame::Frame;

/// Detector output recorded for one image, plus an optional expected label.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub faces: Vec<BoundingBox>,
    #[serde(default)]
    pub label: Option<Emotion>,
}

/// Recorded detections keyed by image file name.
pub type DetectionManifest = HashMap<String, RecordedFrame>;

pub fn load_manifest(path: &Path) -> Result<DetectionManifest, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Replays pre-computed detection results by frame index.
///
/// Used when boxes come from an offline detector run: the live pipeline
/// sees exactly the boxes that were recorded, which makes runs repeatable.
pub struct ReplayFaceDetector {
    cache: Arc<HashMap<usize, Vec<BoundingBox>>>,
}

impl ReplayFaceDetector {
    pub fn new(cache: Arc<HashMap<usize, Vec<BoundingBox>>>) -> Self {
        Self { cache }
    }

    /// Maps manifest entries onto frame indices via the sequence's file names.
    pub fn from_manifest(manifest: &DetectionManifest, paths: &[PathBuf]) -> Self {
        let cache = paths
            .iter()
            .enumerate()
            .filter_map(|(index, path)| {
                let name = path.file_name()?.to_str()?;
                manifest.get(name).map(|rec| (index, rec.faces.clone()))
            })
            .collect();
        Self::new(Arc::new(cache))
    }
}

impl FaceDetector for ReplayFaceDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        _rotation_degrees: u32,
    ) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        Ok(self.cache.get(&frame.index()).cloned().unwrap_or_default())
    }
}
