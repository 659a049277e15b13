use ndarray::{Array2, Array4, ArrayView2};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::FACE_REGION_SIZE;

/// A cropped, single-channel, `[0, 1]`-normalized face sample.
///
/// Immutable once created. Regions produced by
/// [`RegionExtractor`](super::region_extractor::RegionExtractor) are always
/// `FACE_REGION_SIZE` square; [`FaceRegion::is_valid`] guards the rest.
#[derive(Clone, Debug)]
pub struct FaceRegion {
    pixels: Array2<f32>,
    source: BoundingBox,
}

impl FaceRegion {
    pub fn new(pixels: Array2<f32>, source: BoundingBox) -> Self {
        Self { pixels, source }
    }

    pub fn pixels(&self) -> ArrayView2<'_, f32> {
        self.pixels.view()
    }

    /// The clipped box this region was cut from.
    pub fn source_box(&self) -> BoundingBox {
        self.source
    }

    /// True when the region has classifier shape and every pixel is a finite
    /// value in `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        self.pixels.dim() == (FACE_REGION_SIZE, FACE_REGION_SIZE)
            && self
                .pixels
                .iter()
                .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// NHWC tensor `[1, H, W, 1]`, the layout the emotion models expect.
    pub fn to_nhwc_tensor(&self) -> Array4<f32> {
        let (h, w) = self.pixels.dim();
        Array4::from_shape_fn((1, h, w, 1), |(_, y, x, _)| self.pixels[[y, x]])
    }
}
