use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

use super::editor::Polygon;
use crate::FrameSize;

/// Top-left corner of a crop in original-frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiOffset {
    pub x: u32,
    pub y: u32,
}

/// ROI metadata sent alongside a cropped upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiDescriptor {
    pub original_size: FrameSize,
    pub roi: Polygon,
    pub offset: RoiOffset,
    pub width: u32,
    pub height: u32,
}

/// A rectangular crop plus what a consumer needs to map results back.
#[derive(Clone, Debug)]
pub struct CroppedRegion {
    pub image: RgbImage,
    pub offset: RoiOffset,
    pub width: u32,
    pub height: u32,
}

impl CroppedRegion {
    pub fn descriptor(&self, original_size: FrameSize, zone: &Polygon) -> RoiDescriptor {
        RoiDescriptor {
            original_size,
            roi: *zone,
            offset: self.offset,
            width: self.width,
            height: self.height,
        }
    }
}

/// Bounding-box crop of a committed red zone.
pub struct RoiExtractor;

impl RoiExtractor {
    /// Crop `frame` to the zone's bounding box.
    ///
    /// Returns `None` when the clamped box has no area; callers then send the
    /// full frame instead.
    pub fn extract(frame: &RgbImage, zone: &Polygon) -> Option<CroppedRegion> {
        let (x, y, width, height) = Self::clamped_box(frame.width(), frame.height(), zone)?;
        let image = imageops::crop_imm(frame, x, y, width, height).to_image();
        Some(CroppedRegion {
            image,
            offset: RoiOffset { x, y },
            width,
            height,
        })
    }

    /// Clamped crop box as `(x, y, width, height)`, or `None` if degenerate.
    pub fn clamped_box(
        frame_width: u32,
        frame_height: u32,
        zone: &Polygon,
    ) -> Option<(u32, u32, u32, u32)> {
        let (min_x, min_y, max_x, max_y) = zone.bounds();
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }

        let min_x = (min_x.floor() as i64).max(0);
        let min_y = (min_y.floor() as i64).max(0);
        let max_x = (max_x.ceil() as i64).min(frame_width as i64);
        let max_y = (max_y.ceil() as i64).min(frame_height as i64);

        let width = max_x - min_x;
        let height = max_y - min_y;
        if width <= 0 || height <= 0 {
            return None;
        }
        Some((min_x as u32, min_y as u32, width as u32, height as u32))
    }
}
