//! Per-tick drawing of the frame, the red zone, and detection boxes.
//!
//! Drawing goes through the `Canvas` trait so the overlay order and geometry can
//! be checked without rasterizing. `ImageCanvas` is the raster implementation,
//! built on `imageproc` primitives.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_polygon_mut, draw_text_mut, Blend,
};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;
use std::path::Path;

use crate::detect::{Detection, MASK, NO_HARDHAT, NO_MASK, NO_SAFETY_VEST};
use crate::zone::Polygon;
use crate::{FrameSize, Point};

pub const ZONE_FILL: Rgba<u8> = Rgba([255, 0, 0, 77]);
pub const ZONE_STROKE: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const ZONE_STROKE_WIDTH: f32 = 2.0;
pub const VERTEX_RADIUS: f32 = 5.0;
pub const BOX_STROKE_WIDTH: f32 = 2.0;
pub const LABEL_HEIGHT: f32 = 20.0;
pub const LABEL_PADDING: f32 = 5.0;
pub const LABEL_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const LABEL_FONT_PX: f32 = 12.0;

/// Advance per glyph when no font is loaded.
const FALLBACK_GLYPH_ADVANCE: f32 = 7.0;

/// Box/chip colour for a detection class.
pub fn class_color(class: &str) -> Rgba<u8> {
    match class {
        NO_HARDHAT => Rgba([0xFF, 0xA5, 0x00, 255]),
        NO_MASK => Rgba([0xFF, 0xFF, 0x00, 255]),
        NO_SAFETY_VEST => Rgba([0xFF, 0x00, 0x00, 255]),
        MASK => Rgba([0x00, 0xFF, 0xFF, 255]),
        _ => Rgba([0x00, 0xFF, 0x00, 255]),
    }
}

/// 2D drawing surface in canvas pixel space.
pub trait Canvas {
    fn size(&self) -> FrameSize;
    /// Paint `frame` over the whole surface.
    fn draw_frame(&mut self, frame: &image::RgbImage);
    fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>);
    fn stroke_polyline(&mut self, points: &[Point], color: Rgba<u8>, width: f32);
    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>);
    fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>, width: f32);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>);
    fn measure_text(&self, text: &str) -> f32;
    /// Draw `text` with its baseline at `y`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>);
}

/// Raster canvas. Translucent fills are alpha-blended.
pub struct ImageCanvas {
    surface: Blend<RgbaImage>,
    font: Option<FontVec>,
    scale: PxScale,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: Blend(RgbaImage::new(width.max(1), height.max(1))),
            font: None,
            scale: PxScale::from(LABEL_FONT_PX),
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn load_font(path: &Path) -> Result<FontVec> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        FontVec::try_from_vec(bytes).with_context(|| format!("parse font {}", path.display()))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Match the surface to the frame size, clearing it when it changes.
    pub fn resize(&mut self, size: FrameSize) {
        let current = self.surface.0.dimensions();
        let wanted = (size.width.max(1), size.height.max(1));
        if current != wanted {
            self.surface = Blend(RgbaImage::new(wanted.0, wanted.1));
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.surface.0
    }

    /// Flattened RGB copy, for JPEG/PNG output.
    pub fn to_rgb(&self) -> image::RgbImage {
        image::DynamicImage::ImageRgba8(self.surface.0.clone()).to_rgb8()
    }
}

fn to_rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    Rect::at(x.round() as i32, y.round() as i32)
        .of_size((w.round().max(1.0)) as u32, (h.round().max(1.0)) as u32)
}

impl Canvas for ImageCanvas {
    fn size(&self) -> FrameSize {
        let (width, height) = self.surface.0.dimensions();
        FrameSize { width, height }
    }

    fn draw_frame(&mut self, frame: &image::RgbImage) {
        let (w, h) = self.surface.0.dimensions();
        for (x, y, px) in frame.enumerate_pixels() {
            if x < w && y < h {
                let [r, g, b] = px.0;
                self.surface.0.put_pixel(x, y, Rgba([r, g, b, 255]));
            }
        }
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>) {
        let mut poly: Vec<PixelPoint<i32>> = points
            .iter()
            .map(|p| PixelPoint::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        poly.dedup();
        // imageproc rejects an explicitly closed ring
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() < 3 {
            return;
        }
        draw_polygon_mut(&mut self.surface, &poly, color);
    }

    fn stroke_polyline(&mut self, points: &[Point], color: Rgba<u8>, width: f32) {
        let half = (width / 2.0).max(0.5);
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (dx, dy) = (b.x - a.x, b.y - a.y);
            let len = (dx * dx + dy * dy).sqrt();
            if len == 0.0 {
                continue;
            }
            // Offset parallel segments across the stroke width.
            let (nx, ny) = (-dy / len, dx / len);
            let passes = width.round().max(1.0) as i32;
            for i in 0..passes {
                let t = -half + 0.5 + i as f32;
                draw_line_segment_mut(
                    &mut self.surface,
                    (a.x + nx * t, a.y + ny * t),
                    (b.x + nx * t, b.y + ny * t),
                    color,
                );
            }
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>) {
        draw_filled_circle_mut(
            &mut self.surface,
            (center.x.round() as i32, center.y.round() as i32),
            radius.round() as i32,
            color,
        );
    }

    fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>, width: f32) {
        let passes = width.round().max(1.0) as i32;
        for i in 0..passes {
            let inset = i as f32 - (passes - 1) as f32 / 2.0;
            draw_hollow_rect_mut(
                &mut self.surface,
                to_rect(x + inset, y + inset, w - 2.0 * inset, h - 2.0 * inset),
                color,
            );
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        draw_filled_rect_mut(&mut self.surface, to_rect(x, y, w, h), color);
    }

    fn measure_text(&self, text: &str) -> f32 {
        match &self.font {
            Some(font) => {
                let scaled = font.as_scaled(self.scale);
                text.chars()
                    .map(|c| scaled.h_advance(scaled.glyph_id(c)))
                    .sum()
            }
            None => text.chars().count() as f32 * FALLBACK_GLYPH_ADVANCE,
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        // draw_text_mut positions the top of the line; convert from baseline.
        let ascent = font.as_scaled(self.scale).ascent();
        draw_text_mut(
            &mut self.surface,
            color,
            x.round() as i32,
            (y - ascent).round() as i32,
            self.scale,
            font,
            text,
        );
    }
}

/// Draws one composed frame: image, zone, detections.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetectionOverlay;

impl DetectionOverlay {
    pub fn new() -> Self {
        Self
    }

    pub fn draw<C: Canvas>(
        &self,
        canvas: &mut C,
        frame: &image::RgbImage,
        committed: Option<&Polygon>,
        in_progress: &[Point],
        detections: &[Detection],
    ) {
        canvas.draw_frame(frame);
        self.draw_zone(canvas, committed, in_progress);
        for detection in detections {
            self.draw_detection(canvas, detection);
        }
    }

    pub fn draw_zone<C: Canvas>(
        &self,
        canvas: &mut C,
        committed: Option<&Polygon>,
        in_progress: &[Point],
    ) {
        if let Some(zone) = committed {
            canvas.fill_polygon(zone.vertices(), ZONE_FILL);
            for vertex in zone.vertices() {
                canvas.fill_circle(*vertex, VERTEX_RADIUS, ZONE_STROKE);
            }
        } else if !in_progress.is_empty() {
            canvas.stroke_polyline(in_progress, ZONE_STROKE, ZONE_STROKE_WIDTH);
            for vertex in in_progress {
                canvas.fill_circle(*vertex, VERTEX_RADIUS, ZONE_STROKE);
            }
        }
    }

    pub fn draw_detection<C: Canvas>(&self, canvas: &mut C, detection: &Detection) {
        let color = class_color(&detection.class);
        let [x1, y1, _, _] = detection.bbox;
        canvas.stroke_rect(
            x1,
            y1,
            detection.width(),
            detection.height(),
            color,
            BOX_STROKE_WIDTH,
        );

        let label = detection.label();
        let text_width = canvas.measure_text(&label);
        canvas.fill_rect(
            x1,
            y1 - LABEL_HEIGHT,
            text_width + 2.0 * LABEL_PADDING,
            LABEL_HEIGHT,
            color,
        );
        canvas.fill_text(&label, x1 + LABEL_PADDING, y1 - LABEL_PADDING, LABEL_TEXT);
    }
}
