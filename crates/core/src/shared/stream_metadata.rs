use std::time::Duration;

use crate::shared::frame::PixelFormat;

/// What a camera stream delivers, as reported when it is opened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub fps: f64,
    /// Clockwise rotation, in degrees, that turns the sensor image upright.
    pub sensor_rotation: u32,
    /// Known length of a recorded stream; `None` for a live camera.
    pub frame_count: Option<usize>,
}

impl StreamMetadata {
    pub fn is_live(&self) -> bool {
        self.frame_count.is_none()
    }

    /// Time between consecutive frames. Zero when the rate is unknown.
    pub fn frame_interval(&self) -> Duration {
        if self.fps.is_finite() && self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        }
    }

    /// Frame dimensions once `sensor_rotation` is applied.
    pub fn upright_size(&self) -> (u32, u32) {
        if self.sensor_rotation % 180 == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Frames delivered per admission window of `min_interval`; roughly one
    /// of these is analyzed and the rest are dropped at the gate.
    pub fn frames_per_window(&self, min_interval: Duration) -> f64 {
        (min_interval.as_secs_f64() * self.fps).max(1.0)
    }
}
