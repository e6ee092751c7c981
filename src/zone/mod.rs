//! Red zone definition and region-of-interest extraction.
//!
//! - `PolygonEditor`: builds the 4-vertex zone from clicks on a paused frame.
//! - `RoiExtractor`: crops the zone's bounding box out of a full frame.
//!
//! The crop is always the axis-aligned bounding box of the zone, never a
//! polygon mask. Pixels outside the zone but inside its box reach the detector.

mod editor;
mod roi;

pub use editor::{Polygon, PolygonEditor, ZoneState, ZONE_VERTICES};
pub use roi::{CroppedRegion, RoiDescriptor, RoiExtractor, RoiOffset};
