use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::Point;

/// Number of vertices in a red zone.
pub const ZONE_VERTICES: usize = 4;

/// A committed red zone: exactly four vertices in click order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon([Point; ZONE_VERTICES]);

impl Polygon {
    pub fn new(vertices: [Point; ZONE_VERTICES]) -> Self {
        Self(vertices)
    }

    /// Build from a slice; anything but four points is rejected.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        let vertices: [Point; ZONE_VERTICES] = points.try_into().map_err(|_| {
            anyhow!(
                "red zone needs exactly {} vertices, got {}",
                ZONE_VERTICES,
                points.len()
            )
        })?;
        Ok(Self(vertices))
    }

    pub fn vertices(&self) -> &[Point; ZONE_VERTICES] {
        &self.0
    }

    /// Unclamped axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.0.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }
}

/// Observable editor state.
#[derive(Clone, Debug, PartialEq)]
pub enum ZoneState {
    Empty,
    /// 1 to 3 in-progress vertices.
    Drawing(Vec<Point>),
    Committed(Polygon),
}

impl ZoneState {
    pub fn is_committed(&self) -> bool {
        matches!(self, ZoneState::Committed(_))
    }
}

/// Click-driven red zone editor.
///
/// Holds at most one committed polygon and one in-progress vertex list; the two
/// never coexist.
#[derive(Clone, Debug, Default)]
pub struct PolygonEditor {
    committed: Option<Polygon>,
    in_progress: Vec<Point>,
}

impl PolygonEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor seeded with an already committed zone.
    pub fn with_zone(zone: Polygon) -> Self {
        Self {
            committed: Some(zone),
            in_progress: Vec::new(),
        }
    }

    /// Register a click. Ignored unless the session is paused.
    pub fn register_click(&mut self, paused: bool, point: Point) -> ZoneState {
        if !paused {
            return self.state();
        }

        if self.committed.is_some() && self.in_progress.is_empty() {
            log::info!("red zone discarded; starting a new definition");
            self.committed = None;
        }

        if self.in_progress.len() < ZONE_VERTICES {
            self.in_progress.push(point);
        }

        if self.in_progress.len() == ZONE_VERTICES {
            let points = std::mem::take(&mut self.in_progress);
            if let Ok(polygon) = Polygon::from_points(&points) {
                log::info!("red zone committed: {:?}", polygon.vertices());
                self.committed = Some(polygon);
            }
        }

        self.state()
    }

    /// Force the editor back to `Empty`.
    pub fn reset(&mut self) {
        self.committed = None;
        self.in_progress.clear();
    }

    /// Drop an unfinished edit. A committed zone survives.
    pub fn discard_in_progress(&mut self) {
        self.in_progress.clear();
    }

    pub fn committed(&self) -> Option<&Polygon> {
        self.committed.as_ref()
    }

    pub fn in_progress(&self) -> &[Point] {
        &self.in_progress
    }

    pub fn is_defined(&self) -> bool {
        self.committed.is_some()
    }

    pub fn state(&self) -> ZoneState {
        match (&self.committed, self.in_progress.is_empty()) {
            (Some(polygon), true) => ZoneState::Committed(*polygon),
            (_, false) => ZoneState::Drawing(self.in_progress.clone()),
            (None, true) => ZoneState::Empty,
        }
    }
}
