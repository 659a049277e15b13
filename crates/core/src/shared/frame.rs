use std::time::Instant;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("{format:?} frame of {width}x{height} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Pixel layout of a camera frame as delivered by the capture device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
    /// Full-resolution Y plane followed by interleaved V/U at quarter resolution.
    Nv21,
}

impl PixelFormat {
    pub fn expected_len(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelFormat::Gray8 => w * h,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => w * h * 3,
            PixelFormat::Rgba8 => w * h * 4,
            PixelFormat::Nv21 => w * h + w.div_ceil(2) * h.div_ceil(2) * 2,
        }
    }
}

/// A single camera frame: raw bytes plus the metadata needed to interpret them.
///
/// Dimensions and byte length are checked on construction, so every
/// downstream stage can index the buffer without re-validating it.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    index: usize,
    captured_at: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        index: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = format.expected_len(width, height);
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                format,
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            index,
            captured_at: Instant::now(),
        })
    }

    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}
