use crate::classification::domain::emotion_classifier::{ClassificationError, EmotionClassifier};
use crate::classification::domain::softmax::softmax_percent;
use crate::detection::domain::face_region::FaceRegion;
use crate::shared::constants::EMOTION_CLASS_COUNT;
use crate::shared::emotion::{Emotion, EmotionResult};

/// Runs the classifier on one face region and labels its output.
pub struct InferenceDispatcher {
    classifier: Box<dyn EmotionClassifier>,
}

impl InferenceDispatcher {
    pub fn new(classifier: Box<dyn EmotionClassifier>) -> Self {
        Self { classifier }
    }

    /// Seven labelled percentages in class order, summing to ~100.
    ///
    /// An invalid region yields an empty list without calling the model.
    pub fn classify(
        &mut self,
        region: &FaceRegion,
    ) -> Result<Vec<EmotionResult>, ClassificationError> {
        if !region.is_valid() {
            log::warn!(
                "Skipping invalid face region at {:?} (shape {:?})",
                region.source_box(),
                region.pixels().dim()
            );
            return Ok(Vec::new());
        }

        let raw = self.classifier.scores(region)?;
        if raw.len() != EMOTION_CLASS_COUNT {
            return Err(ClassificationError::ScoreCount {
                expected: EMOTION_CLASS_COUNT,
                actual: raw.len(),
            });
        }
        if raw.iter().any(|s| !s.is_finite()) {
            return Err(ClassificationError::NonFiniteScores);
        }

        let percents = softmax_percent(&raw);
        log::debug!(
            "Raw scores {raw:?} -> {percents:?} (sum {:.4})",
            percents.iter().sum::<f32>()
        );

        Ok(Emotion::ALL
            .into_iter()
            .zip(percents)
            .map(|(emotion, confidence)| EmotionResult::new(emotion, confidence))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::constants::{FACE_REGION_SIZE, SOFTMAX_TOLERANCE};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedClassifier {
        scores: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl EmotionClassifier for FixedClassifier {
        fn scores(&mut self, _region: &FaceRegion) -> Result<Vec<f32>, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct FailingClassifier;

    impl EmotionClassifier for FailingClassifier {
        fn scores(&mut self, _region: &FaceRegion) -> Result<Vec<f32>, ClassificationError> {
            Err(ClassificationError::Inference("device lost".into()))
        }
    }

    fn dispatcher(scores: Vec<f32>) -> (InferenceDispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = FixedClassifier {
            scores,
            calls: Arc::clone(&calls),
        };
        (InferenceDispatcher::new(Box::new(classifier)), calls)
    }

    fn region() -> FaceRegion {
        FaceRegion::new(
            Array2::from_elem((FACE_REGION_SIZE, FACE_REGION_SIZE), 0.5),
            BoundingBox::new(0, 0, 48, 48),
        )
    }

    #[test]
    fn test_labels_in_class_order_and_sums_to_100() {
        let (mut d, _) = dispatcher(vec![0.1, 0.2, 2.5, 0.3, 0.4, 0.5, 0.6]);
        let results = d.classify(&region()).unwrap();

        let labels: Vec<Emotion> = results.iter().map(|r| r.emotion).collect();
        assert_eq!(labels, Emotion::ALL);
        let sum: f32 = results.iter().map(|r| r.confidence).sum();
        assert_abs_diff_eq!(sum, 100.0, epsilon = SOFTMAX_TOLERANCE);
        let top = results
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .unwrap();
        assert_eq!(top.emotion, Emotion::Fear);
    }

    #[test]
    fn test_large_scores_do_not_overflow() {
        let (mut d, _) = dispatcher(vec![1000.0, 999.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let results = d.classify(&region()).unwrap();
        assert!(results.iter().all(|r| r.confidence.is_finite()));
        let sum: f32 = results.iter().map(|r| r.confidence).sum();
        assert_abs_diff_eq!(sum, 100.0, epsilon = SOFTMAX_TOLERANCE);
    }

    #[test]
    fn test_invalid_region_returns_empty_without_calling_model() {
        let (mut d, calls) = dispatcher(vec![0.0; 7]);
        let bad = FaceRegion::new(Array2::zeros((10, 10)), BoundingBox::new(0, 0, 10, 10));
        assert!(d.classify(&bad).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nan_pixels_are_invalid() {
        let (mut d, _) = dispatcher(vec![0.0; 7]);
        let mut pixels = Array2::from_elem((FACE_REGION_SIZE, FACE_REGION_SIZE), 0.5);
        pixels[[3, 3]] = f32::NAN;
        let bad = FaceRegion::new(pixels, BoundingBox::new(0, 0, 48, 48));
        assert!(d.classify(&bad).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_score_count_is_error() {
        let (mut d, _) = dispatcher(vec![0.0; 5]);
        assert!(matches!(
            d.classify(&region()),
            Err(ClassificationError::ScoreCount {
                expected: 7,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_non_finite_scores_are_error() {
        let (mut d, _) = dispatcher(vec![0.0, f32::INFINITY, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            d.classify(&region()),
            Err(ClassificationError::NonFiniteScores)
        ));
    }

    #[test]
    fn test_classifier_error_propagates() {
        let mut d = InferenceDispatcher::new(Box::new(FailingClassifier));
        assert!(matches!(
            d.classify(&region()),
            Err(ClassificationError::Inference(_))
        ));
    }
}
