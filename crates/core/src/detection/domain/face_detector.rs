use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// The detector is an external collaborator: its boxes are untrusted and
/// are clipped by the region extractor before use. Implementations may be
/// stateful (e.g., tracking across frames), hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        rotation_degrees: u32,
    ) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;
}
