use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::{Frame, PixelFormat};
use crate::shared::stream_metadata::StreamMetadata;

/// Replays a directory of still images (or a single image) as a camera stream.
///
/// Files are ordered by name; frame `i` is the `i`-th file. Decoding is lazy,
/// one image per [`next_frame`](FrameSource::next_frame), so long sequences
/// never sit in memory at once. Frames are delivered as RGB.
pub struct ImageSequenceSource {
    metadata: StreamMetadata,
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    /// Opens `path` to be replayed at `fps` as if from a sensor mounted at
    /// `sensor_rotation` degrees.
    pub fn open(
        path: &Path,
        fps: f64,
        sensor_rotation: u32,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else if is_image(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("Not an image or image directory: {}", path.display()).into());
        };

        let first = paths
            .first()
            .ok_or_else(|| format!("No images found in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)?;
        log::debug!("Opened {} image(s) from {}", paths.len(), path.display());

        Ok(Self {
            metadata: StreamMetadata {
                width,
                height,
                pixel_format: PixelFormat::Rgb8,
                fps,
                sensor_rotation,
                frame_count: Some(paths.len()),
            },
            paths,
            cursor: 0,
        })
    }

    /// Paths of the sequence, indexed by frame index.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn decode(path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
    let img = image::open(path)?.to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, PixelFormat::Rgb8, index)?)
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let frame = decode(path, self.cursor)?;
        self.cursor += 1;
        Ok(Some(frame))
    }
}
