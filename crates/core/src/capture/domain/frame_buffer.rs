use ndarray::Array3;

use crate::shared::emotion::Emotion;
use crate::shared::frame::{Frame, PixelFormat};

/// Callback that hands a frame's storage back to its producer.
/// Receives the frame index.
pub type ReleaseFn = Box<dyn FnOnce(usize) + Send>;

/// Exclusive owner of one camera frame for the duration of an admission cycle.
///
/// The release callback runs exactly once, when the buffer is dropped. Every
/// exit path (rejection at the gate, detector failure, success, or a panic
/// unwinding through a worker) therefore returns the frame to the camera.
pub struct FrameBuffer {
    frame: Frame,
    ground_truth: Option<Emotion>,
    on_release: Option<ReleaseFn>,
}

impl FrameBuffer {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            ground_truth: None,
            on_release: None,
        }
    }

    pub fn with_release(mut self, on_release: impl FnOnce(usize) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(on_release));
        self
    }

    /// Attaches the expected emotion, used for accuracy accounting.
    pub fn with_ground_truth(mut self, emotion: Emotion) -> Self {
        self.ground_truth = Some(emotion);
        self
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn ground_truth(&self) -> Option<Emotion> {
        self.ground_truth
    }

    /// Converts the raw buffer into the working color matrix.
    ///
    /// Shape is `(height, width, channels)` with `channels` 1 for grayscale
    /// sources and 3 (RGB order) for everything else.
    pub fn working_matrix(&self) -> Array3<u8> {
        let frame = &self.frame;
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let data = frame.data();

        match frame.format() {
            PixelFormat::Gray8 => Array3::from_shape_fn((h, w, 1), |(y, x, _)| data[y * w + x]),
            PixelFormat::Rgb8 => {
                Array3::from_shape_fn((h, w, 3), |(y, x, c)| data[(y * w + x) * 3 + c])
            }
            PixelFormat::Bgr8 => {
                Array3::from_shape_fn((h, w, 3), |(y, x, c)| data[(y * w + x) * 3 + (2 - c)])
            }
            PixelFormat::Rgba8 => {
                Array3::from_shape_fn((h, w, 3), |(y, x, c)| data[(y * w + x) * 4 + c])
            }
            PixelFormat::Nv21 => nv21_to_rgb(data, w, h),
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("index", &self.frame.index())
            .field("width", &self.frame.width())
            .field("height", &self.frame.height())
            .field("format", &self.frame.format())
            .field("ground_truth", &self.ground_truth)
            .finish_non_exhaustive()
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release(self.frame.index());
        }
    }
}

/// BT.601 limited-range YUV to RGB, integer arithmetic.
fn nv21_to_rgb(data: &[u8], w: usize, h: usize) -> Array3<u8> {
    let y_plane_len = w * h;
    let uv_stride = w.div_ceil(2) * 2;
    let mut out = Array3::<u8>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            let luma = data[y * w + x] as i32;
            let uv = y_plane_len + (y / 2) * uv_stride + (x / 2) * 2;
            let v = data[uv] as i32 - 128;
            let u = data[uv + 1] as i32 - 128;
            let c = 298 * (luma - 16);

            out[[y, x, 0]] = clamp_u8((c + 409 * v + 128) >> 8);
            out[[y, x, 1]] = clamp_u8((c - 100 * u - 208 * v + 128) >> 8);
            out[[y, x, 2]] = clamp_u8((c + 516 * u + 128) >> 8);
        }
    }
    out
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn frame(data: Vec<u8>, w: u32, h: u32, format: PixelFormat) -> Frame {
        Frame::new(data, w, h, format, 7).unwrap()
    }

    #[test]
    fn test_release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let buffer = FrameBuffer::new(frame(vec![0; 4], 2, 2, PixelFormat::Gray8))
            .with_release(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(buffer);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_receives_frame_index() {
        let seen = Arc::new(AtomicUsize::new(0));
        let slot = seen.clone();
        drop(
            FrameBuffer::new(frame(vec![0; 4], 2, 2, PixelFormat::Gray8))
                .with_release(move |idx| slot.store(idx, Ordering::SeqCst)),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_release_runs_during_unwind() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let result = std::panic::catch_unwind(move || {
            let _buffer = FrameBuffer::new(frame(vec![0; 4], 2, 2, PixelFormat::Gray8))
                .with_release(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            panic!("classifier blew up");
        });
        assert!(result.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ground_truth_defaults_to_none() {
        let buffer = FrameBuffer::new(frame(vec![0; 4], 2, 2, PixelFormat::Gray8));
        assert_eq!(buffer.ground_truth(), None);
        let buffer = buffer.with_ground_truth(Emotion::Happy);
        assert_eq!(buffer.ground_truth(), Some(Emotion::Happy));
    }

    #[test]
    fn test_gray_matrix_is_single_channel() {
        let buffer = FrameBuffer::new(frame(vec![1, 2, 3, 4, 5, 6], 3, 2, PixelFormat::Gray8));
        let m = buffer.working_matrix();
        assert_eq!(m.shape(), &[2, 3, 1]);
        assert_eq!(m[[1, 0, 0]], 4);
    }

    #[test]
    fn test_rgb_matrix_layout() {
        // 2x1: red, blue
        let buffer = FrameBuffer::new(frame(vec![255, 0, 0, 0, 0, 255], 2, 1, PixelFormat::Rgb8));
        let m = buffer.working_matrix();
        assert_eq!(m.shape(), &[1, 2, 3]);
        assert_eq!(m[[0, 0, 0]], 255);
        assert_eq!(m[[0, 1, 2]], 255);
    }

    #[test]
    fn test_bgr_is_swapped_to_rgb() {
        let buffer = FrameBuffer::new(frame(vec![10, 20, 30], 1, 1, PixelFormat::Bgr8));
        let m = buffer.working_matrix();
        assert_eq!(m[[0, 0, 0]], 30);
        assert_eq!(m[[0, 0, 1]], 20);
        assert_eq!(m[[0, 0, 2]], 10);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let buffer = FrameBuffer::new(frame(vec![1, 2, 3, 99, 4, 5, 6, 99], 2, 1, PixelFormat::Rgba8));
        let m = buffer.working_matrix();
        assert_eq!(m.shape(), &[1, 2, 3]);
        assert_eq!(m[[0, 1, 0]], 4);
        assert_eq!(m[[0, 1, 2]], 6);
    }

    #[test]
    fn test_nv21_neutral_chroma_is_gray() {
        // 2x2 Y plane at 126, one VU pair at 128 -> mid gray
        let buffer = FrameBuffer::new(frame(vec![126, 126, 126, 126, 128, 128], 2, 2, PixelFormat::Nv21));
        let m = buffer.working_matrix();
        assert_eq!(m.shape(), &[2, 2, 3]);
        for c in 0..3 {
            assert_eq!(m[[1, 1, c]], 128);
        }
    }

    #[test]
    fn test_nv21_limits_clamp() {
        let black = FrameBuffer::new(frame(vec![16, 16, 16, 16, 128, 128], 2, 2, PixelFormat::Nv21));
        assert_eq!(black.working_matrix()[[0, 0, 0]], 0);

        let white = FrameBuffer::new(frame(vec![255, 255, 255, 255, 128, 128], 2, 2, PixelFormat::Nv21));
        assert_eq!(white.working_matrix()[[0, 0, 1]], 255);
    }

    #[test]
    fn test_nv21_strong_red_chroma() {
        // V (first byte of the pair) high -> red dominates
        let buffer = FrameBuffer::new(frame(vec![82, 82, 82, 82, 240, 90], 2, 2, PixelFormat::Nv21));
        let m = buffer.working_matrix();
        assert!(m[[0, 0, 0]] > m[[0, 0, 1]]);
        assert!(m[[0, 0, 0]] > m[[0, 0, 2]]);
    }
}
