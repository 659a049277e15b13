use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;

/// A camera-like stream of frames in capture order.
///
/// Sources are pulled one frame at a time. `next_frame` returns `Ok(None)`
/// once a recorded stream is exhausted; a live camera never ends on its own.
/// Frame indices count up from zero without gaps.
pub trait FrameSource: Send {
    fn metadata(&self) -> &StreamMetadata;

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;
}
