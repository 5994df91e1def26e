use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

/// Axis-aligned box in normalized 0..1 coordinates.
///
/// Serialized as `[xmin, ymin, xmax, ymax]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn center(&self) -> Point2D {
        Point2D::new(
            (f64::from(self.xmin) + f64::from(self.xmax)) / 2.0,
            (f64::from(self.ymin) + f64::from(self.ymax)) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        (f64::from(self.xmax) - f64::from(self.xmin)).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (f64::from(self.ymax) - f64::from(self.ymin)).max(0.0)
    }

    /// Share of the frame covered by this box, as a percentage.
    pub fn area_percentage(&self) -> f64 {
        self.width() * self.height() * 100.0
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(raw: [f32; 4]) -> Self {
        Self::new(raw[0], raw[1], raw[2], raw[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax]
    }
}

/// One object reported by the detector for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Label equality plus a strictly-greater confidence check.
    pub fn matches(&self, class: &str, min_confidence: f32) -> bool {
        self.label == class && self.confidence > min_confidence
    }
}
