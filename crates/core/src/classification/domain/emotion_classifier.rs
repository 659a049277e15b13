use std::path::PathBuf;

use thiserror::Error;

use crate::detection::domain::face_region::FaceRegion;

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("failed to load emotion model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("emotion inference failed: {0}")]
    Inference(String),
    #[error("classifier returned {actual} scores, expected {expected}")]
    ScoreCount { expected: usize, actual: usize },
    #[error("classifier returned non-finite scores")]
    NonFiniteScores,
}

/// Domain interface for the emotion model.
///
/// Returns one raw score (logit) per class in
/// [`Emotion::ALL`](crate::shared::emotion::Emotion::ALL) order. Scores are
/// turned into percentages by the dispatcher, not by the model.
pub trait EmotionClassifier: Send {
    fn scores(&mut self, region: &FaceRegion) -> Result<Vec<f32>, ClassificationError>;
}
