use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CompositeError, RenderResult};

pub const BYTES_PER_PIXEL: usize = 4; // RGBA8

/// Placement of a sub-image inside the full mosaic, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// One rank's rendered sub-image for one logical frame. Owned by the rank
/// that produced it until it is handed to the compositing step.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub owner: usize,
    pub sequence: u64,
    pub color: Vec<u8>,
    depth: Option<Vec<f32>>,
    pub viewport: Viewport,
    pub reduction_factor: u32,
    pub timestamp: DateTime<Utc>,
}

impl RenderFrame {
    /// Wraps a raw pixel buffer. Depth presence is declared here and stays
    /// immutable for the frame's life. Buffers whose length does not match
    /// the viewport are rejected with `SizeMismatch`.
    pub fn new(
        owner: usize,
        sequence: u64,
        color: Vec<u8>,
        depth: Option<Vec<f32>>,
        viewport: Viewport,
        reduction_factor: u32,
    ) -> RenderResult<Self> {
        let expected = viewport.pixel_count() * BYTES_PER_PIXEL;
        if color.len() != expected {
            return Err(CompositeError::SizeMismatch {
                expected,
                actual: color.len(),
            });
        }
        if let Some(z) = &depth {
            if z.len() != viewport.pixel_count() {
                return Err(CompositeError::SizeMismatch {
                    expected: viewport.pixel_count(),
                    actual: z.len(),
                });
            }
        }
        Ok(Self {
            owner,
            sequence,
            color,
            depth,
            viewport,
            reduction_factor: reduction_factor.max(1),
            timestamp: Utc::now(),
        })
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn depth(&self) -> Option<&[f32]> {
        self.depth.as_deref()
    }

    pub fn into_planes(self) -> (Vec<u8>, Option<Vec<f32>>) {
        (self.color, self.depth)
    }
}

/// The merged image for one frame, laid out canonically for the tile/display
/// mosaic. Replaced every render cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub depth: Option<Vec<f32>>,
    pub sequence: u64,
}

impl CompositeResult {
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        depth: Option<Vec<f32>>,
        sequence: u64,
    ) -> RenderResult<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(CompositeError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            depth,
            sequence,
        })
    }

    /// Debug/archive dump of the frame as a PNG file.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> RenderResult<()> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or(CompositeError::SizeMismatch {
                expected: self.width as usize * self.height as usize * BYTES_PER_PIXEL,
                actual: self.pixels.len(),
            })?;
        img.save(path)
            .map_err(|e| CompositeError::InvalidLayout(format!("png write failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_color_buffer() {
        let vp = Viewport::new(0, 0, 4, 4);
        let err = RenderFrame::new(0, 1, vec![0u8; 10], None, vp, 1).unwrap_err();
        assert!(matches!(
            err,
            CompositeError::SizeMismatch {
                expected: 64,
                actual: 10
            }
        ));
    }

    #[test]
    fn frame_rejects_mismatched_depth_plane() {
        let vp = Viewport::new(0, 0, 2, 2);
        let err =
            RenderFrame::new(0, 1, vec![0u8; 16], Some(vec![0.5; 3]), vp, 1).unwrap_err();
        assert!(matches!(err, CompositeError::SizeMismatch { .. }));
    }

    #[test]
    fn frame_accepts_matching_planes_and_clamps_reduction() {
        let vp = Viewport::new(0, 0, 2, 2);
        let frame = RenderFrame::new(3, 7, vec![0u8; 16], Some(vec![1.0; 4]), vp, 0).unwrap();
        assert_eq!(frame.owner, 3);
        assert_eq!(frame.sequence, 7);
        assert!(frame.has_depth());
        assert_eq!(frame.reduction_factor, 1);
    }

    #[test]
    fn composite_result_validates_dimensions() {
        assert!(CompositeResult::new(2, 2, vec![0u8; 16], None, 0).is_ok());
        assert!(CompositeResult::new(2, 2, vec![0u8; 15], None, 0).is_err());
    }
}
