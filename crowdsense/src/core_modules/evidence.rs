// THEORY:
// When an alert fires, the alerting boundary wants a picture to go with it. For a
// group alert that picture is the group's bounding box with a little breathing room;
// for everything else, or when the group has no resolvable box, it is the whole frame.
//
// This module only decides *which pixels* make up the evidence and cuts them out of
// an in-memory RGBA frame. Writing them anywhere is the caller's business.

use crate::core_modules::detection::BoundingBox;
use image::RgbaImage;
use image::imageops;

/// Padding (pixels) added around a group box before clipping.
pub const DEFAULT_PADDING: u32 = 10;

/// A clipped rectangle inside a frame, in `image` crate coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_full_frame(&self, width: u32, height: u32) -> bool {
        *self == Self::full_frame(width, height)
    }
}

/// Pads `bbox` by `padding` on every side and clips it to the frame. A missing box, or
/// one that ends up empty after clipping, falls back to the full frame.
pub fn crop_region(
    bbox: Option<BoundingBox>,
    frame_width: u32,
    frame_height: u32,
    padding: u32,
) -> CropRegion {
    let Some(b) = bbox else {
        return CropRegion::full_frame(frame_width, frame_height);
    };

    let pad = padding as i64;
    let x1 = (b.x1 as i64 - pad).clamp(0, frame_width as i64);
    let y1 = (b.y1 as i64 - pad).clamp(0, frame_height as i64);
    let x2 = (b.x2 as i64 + pad).clamp(0, frame_width as i64);
    let y2 = (b.y2 as i64 + pad).clamp(0, frame_height as i64);

    if x2 <= x1 || y2 <= y1 {
        return CropRegion::full_frame(frame_width, frame_height);
    }

    CropRegion {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    }
}

/// Cuts the evidence region for `bbox` out of `frame`.
pub fn crop(frame: &RgbaImage, bbox: Option<BoundingBox>, padding: u32) -> RgbaImage {
    let region = crop_region(bbox, frame.width(), frame.height(), padding);
    imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image()
}
