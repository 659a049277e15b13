use std::time::Duration;

/// Side length of the square, single-channel tensor fed to the classifier.
pub const FACE_REGION_SIZE: usize = 48;

pub const EMOTION_CLASS_COUNT: usize = 7;

/// Minimum time between two admitted frames.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Results at or below this confidence (percent) are treated as noise.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f32 = 30.0;

/// How long `stop_detection` waits for the in-flight frame before forcing release.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Identical error messages inside this window are published once.
pub const DEFAULT_ERROR_REPEAT_WINDOW: Duration = Duration::from_millis(2000);

/// Allowed deviation of a softmax distribution from 100 percent.
pub const SOFTMAX_TOLERANCE: f32 = 0.01;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
