use serde::{Deserialize, Serialize};

use crate::zone::RoiOffset;

pub const PERSON: &str = "Person";
pub const NO_HARDHAT: &str = "NO-Hardhat";
pub const NO_MASK: &str = "NO-Mask";
pub const NO_SAFETY_VEST: &str = "NO-Safety Vest";
pub const MASK: &str = "Mask";

/// Classes that denote missing safety equipment.
pub const VIOLATION_CLASSES: &[&str] = &[NO_HARDHAT, NO_MASK, NO_SAFETY_VEST];

pub fn is_violation_class(class: &str) -> bool {
    VIOLATION_CLASSES.contains(&class)
}

/// One labeled box returned by the detection service.
///
/// `bbox` is `[x1, y1, x2, y2]` in the coordinate space of the image that was
/// sent (crop-local for ROI uploads).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(class: &str, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            class: class.to_string(),
            confidence,
            bbox,
        }
    }

    /// Shift a crop-local box back onto the full frame.
    pub fn translated(mut self, offset: RoiOffset) -> Self {
        let (dx, dy) = (offset.x as f32, offset.y as f32);
        self.bbox = [
            self.bbox[0] + dx,
            self.bbox[1] + dy,
            self.bbox[2] + dx,
            self.bbox[3] + dy,
        ];
        self
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    /// Chip text: class name and whole-percent confidence.
    pub fn label(&self) -> String {
        // halves round up, not to even
        format!("{} {}%", self.class, (self.confidence * 100.0).round() as i64)
    }
}

/// Successful `/detect` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_count: Option<u32>,
}

impl DetectResponse {
    pub fn count_class(&self, class: &str) -> u32 {
        self.detections.iter().filter(|d| d.class == class).count() as u32
    }

    /// Server-reported violation count, falling back to counting classes.
    pub fn violations(&self) -> u32 {
        self.violation_count.unwrap_or_else(|| {
            self.detections
                .iter()
                .filter(|d| is_violation_class(&d.class))
                .count() as u32
        })
    }
}

/// Per-class counts over the current detection set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub persons: u32,
    pub no_hardhats: u32,
    pub no_masks: u32,
    pub no_vests: u32,
    pub has_mask: u32,
    pub violations: u32,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut summary = Self::default();
        for det in detections {
            match det.class.as_str() {
                PERSON => summary.persons += 1,
                NO_HARDHAT => summary.no_hardhats += 1,
                NO_MASK => summary.no_masks += 1,
                NO_SAFETY_VEST => summary.no_vests += 1,
                MASK => summary.has_mask += 1,
                _ => {}
            }
        }
        summary.violations = summary.no_hardhats + summary.no_masks + summary.no_vests;
        summary
    }
}

/// One entry of the detector's violation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub timestamp: String,
    #[serde(default)]
    pub violations: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ViolationRecord {
    /// Comma-separated class names, as shown in the history panel.
    pub fn classes(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.class.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_rounds_confidence_to_whole_percent() {
        assert_eq!(Detection::new(PERSON, 0.876, [0.0; 4]).label(), "Person 88%");
        assert_eq!(Detection::new(NO_MASK, 0.5, [0.0; 4]).label(), "NO-Mask 50%");
        assert_eq!(Detection::new(PERSON, 0.125, [0.0; 4]).label(), "Person 13%");
        assert_eq!(Detection::new(PERSON, 0.375, [0.0; 4]).label(), "Person 38%");
    }

    #[test]
    fn translated_shifts_both_corners() {
        let det = Detection::new(PERSON, 0.9, [1.0, 2.0, 11.0, 22.0]);
        let moved = det.translated(RoiOffset { x: 10, y: 10 });
        assert_eq!(moved.bbox, [11.0, 12.0, 21.0, 32.0]);
        assert_eq!(moved.width(), 10.0);
        assert_eq!(moved.height(), 20.0);
    }

    #[test]
    fn summary_counts_classes() {
        let detections = vec![
            Detection::new(PERSON, 0.9, [0.0; 4]),
            Detection::new(PERSON, 0.8, [0.0; 4]),
            Detection::new(NO_HARDHAT, 0.7, [0.0; 4]),
            Detection::new(NO_SAFETY_VEST, 0.6, [0.0; 4]),
            Detection::new(MASK, 0.6, [0.0; 4]),
            Detection::new("machinery", 0.6, [0.0; 4]),
        ];
        let summary = DetectionSummary::from_detections(&detections);
        assert_eq!(summary.persons, 2);
        assert_eq!(summary.no_hardhats, 1);
        assert_eq!(summary.no_vests, 1);
        assert_eq!(summary.has_mask, 1);
        assert_eq!(summary.violations, 2);
    }

    #[test]
    fn violations_prefer_server_count() {
        let mut response = DetectResponse {
            detections: vec![Detection::new(NO_MASK, 0.9, [0.0; 4])],
            violation_count: None,
        };
        assert_eq!(response.violations(), 1);
        response.violation_count = Some(3);
        assert_eq!(response.violations(), 3);
    }

    #[test]
    fn response_parses_without_optional_fields() {
        let response: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(response.detections.is_empty());
        assert_eq!(response.violation_count, None);

        let response: DetectResponse = serde_json::from_str(
            r#"{"detections":[{"class":"Person","confidence":0.91,"bbox":[1,2,3,4]}],"violation_count":0}"#,
        )
        .unwrap();
        assert_eq!(response.detections[0].class, PERSON);
        assert_eq!(response.violation_count, Some(0));
    }
}
