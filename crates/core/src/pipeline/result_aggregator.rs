use serde::Serialize;

use crate::shared::emotion::EmotionResult;

/// Salient results for one frame.
///
/// Faces appear in detection order; within a face, results are sorted by
/// descending confidence. There is no global ordering across faces. An empty
/// set means nothing salient was detected and is not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameResultSet {
    /// Number of faces that produced a classification.
    pub face_count: usize,
    pub results: Vec<EmotionResult>,
}

impl FrameResultSet {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Highest-confidence entry of the first face with a salient result.
    pub fn top(&self) -> Option<&EmotionResult> {
        self.results.first()
    }
}

/// Filters per-face classifications down to the salient ones.
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    threshold: f32,
}

impl ResultAggregator {
    /// `threshold` is a percentage; only confidences strictly above it survive.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn aggregate(&self, per_face: &[Vec<EmotionResult>]) -> FrameResultSet {
        let mut results = Vec::new();
        for face in per_face {
            let mut salient: Vec<EmotionResult> = face
                .iter()
                .filter(|r| r.confidence > self.threshold)
                .copied()
                .collect();
            salient.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            results.extend(salient);
        }
        FrameResultSet {
            face_count: per_face.iter().filter(|f| !f.is_empty()).count(),
            results,
        }
    }
}
