use ndarray::{s, Array2, Array3, ArrayView3};
use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::FACE_REGION_SIZE;

use super::area_resampler::resize_area;
use super::face_region::FaceRegion;

#[derive(Error, Debug, PartialEq)]
pub enum RegionError {
    #[error("degenerate box {0:?}")]
    Degenerate(BoundingBox),
    #[error("box {bbox:?} lies outside the {frame_width}x{frame_height} frame")]
    OutsideFrame {
        bbox: BoundingBox,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("unsupported channel count {0}, expected 1 or 3")]
    UnsupportedChannels(usize),
}

/// ITU-R BT.601 luma weights, the ones used for RGB to gray conversion.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Turns detector boxes into classifier-ready face regions.
///
/// Each box is clipped to the frame, cropped, converted to luminance,
/// area-resized to a fixed square and scaled from `0..=255` to `[0, 1]`.
/// A bad box only costs its own face; the rest of the batch continues.
pub struct RegionExtractor {
    size: usize,
}

impl RegionExtractor {
    pub fn new() -> Self {
        Self {
            size: FACE_REGION_SIZE,
        }
    }

    /// Extracts one region per acceptable box, preserving input order.
    pub fn extract(&self, matrix: &Array3<u8>, boxes: &[BoundingBox]) -> Vec<FaceRegion> {
        boxes
            .iter()
            .filter_map(|b| match self.extract_one(matrix.view(), b) {
                Ok(region) => Some(region),
                Err(e) => {
                    log::warn!("Skipping face region: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn extract_one(
        &self,
        matrix: ArrayView3<'_, u8>,
        bbox: &BoundingBox,
    ) -> Result<FaceRegion, RegionError> {
        let (frame_h, frame_w, channels) = matrix.dim();
        if bbox.width <= 0 || bbox.height <= 0 {
            return Err(RegionError::Degenerate(*bbox));
        }
        let clipped = bbox
            .clip(frame_w as u32, frame_h as u32)
            .ok_or(RegionError::OutsideFrame {
                bbox: *bbox,
                frame_width: frame_w as u32,
                frame_height: frame_h as u32,
            })?;

        let top = clipped.top as usize;
        let left = clipped.left as usize;
        let bottom = top + clipped.height as usize;
        let right = left + clipped.width as usize;
        let crop = matrix.slice(s![top..bottom, left..right, ..]);

        let gray = to_luminance(crop, channels)?;
        let resized = resize_area(gray.view(), self.size, self.size);
        let normalized = resized.mapv(|v| (v / 255.0).clamp(0.0, 1.0));

        Ok(FaceRegion::new(normalized, clipped))
    }
}

impl Default for RegionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn to_luminance(crop: ArrayView3<'_, u8>, channels: usize) -> Result<Array2<f32>, RegionError> {
    let (h, w, _) = crop.dim();
    match channels {
        1 => Ok(Array2::from_shape_fn((h, w), |(y, x)| crop[[y, x, 0]] as f32)),
        3 => Ok(Array2::from_shape_fn((h, w), |(y, x)| {
            LUMA_R * crop[[y, x, 0]] as f32
                + LUMA_G * crop[[y, x, 1]] as f32
                + LUMA_B * crop[[y, x, 2]] as f32
        })),
        n => Err(RegionError::UnsupportedChannels(n)),
    }
}
