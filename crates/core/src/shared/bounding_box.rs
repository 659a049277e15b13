use serde::{Deserialize, Serialize};

/// Axis-aligned face box in frame pixel coordinates.
///
/// Boxes come from an external detector and are untrusted: they may be
/// negative, oversized, or lie entirely outside the frame. Call
/// [`BoundingBox::clip`] before indexing pixels with one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// Intersects the box with `[0, frame_width) x [0, frame_height)`.
    ///
    /// Returns `None` when nothing of positive area remains, which covers
    /// degenerate boxes and boxes entirely outside the frame.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        let x1 = (self.left as i64).max(0);
        let y1 = (self.top as i64).max(0);
        let x2 = self.right().min(frame_width as i64);
        let y2 = self.bottom().min(frame_height as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        // All four values are now inside the frame, which fits in i32.
        Some(BoundingBox {
            left: x1 as i32,
            top: y1 as i32,
            width: (x2 - x1) as i32,
            height: (y2 - y1) as i32,
        })
    }
}
