//! Metadata written next to each kept clip.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::tracking::finalize::round_to;

/// Direction fields contributed by the directional policy.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectionFields {
    pub direction: u32,
    pub named_direction: String,
    /// `None` serializes as `null`: direction known, no confident label.
    pub label: Option<String>,
}

/// One finalized sighting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventRecord {
    pub filename: String,
    #[serde(rename = "hef_model")]
    pub model: String,
    pub class: String,
    pub initial_confidence: f64,
    pub timestamp: String,
    pub max_instances: usize,
    pub average_instances: f64,
    pub event_seconds: f64,
    pub video_truncated: bool,
    pub reviewed: bool,
    #[serde(flatten)]
    pub direction: Option<DirectionFields>,
    /// `{class}_percent` entries and other policy-provided fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EventRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: &str,
        class: &str,
        initial_confidence: f32,
        timestamp: &str,
        max_instances: usize,
        average_instances: f64,
        event_seconds: f64,
        video_truncated: bool,
    ) -> Self {
        Self {
            filename: String::new(),
            model: model.to_string(),
            class: class.to_string(),
            initial_confidence: round_to(f64::from(initial_confidence), 2),
            timestamp: timestamp.to_string(),
            max_instances,
            average_instances,
            event_seconds: round_to(event_seconds, 1),
            video_truncated,
            reviewed: false,
            direction: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn direction_degrees(&self) -> Option<u32> {
        self.direction.as_ref().map(|d| d.direction)
    }

    pub fn label(&self) -> Option<&str> {
        self.direction.as_ref().and_then(|d| d.label.as_deref())
    }

    /// Record a presence share under `{class}_percent`, one decimal.
    pub fn set_class_percent(&mut self, class: &str, percent: f64) {
        self.extra.insert(
            format!("{}_percent", class),
            serde_json::Value::from(round_to(percent, 1)),
        );
    }

    pub fn class_percent(&self, class: &str) -> Option<f64> {
        self.extra
            .get(&format!("{}_percent", class))
            .and_then(serde_json::Value::as_f64)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Metadata for a moving-object clip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovementRecord {
    pub filename: String,
    #[serde(rename = "hef_model")]
    pub model: String,
    pub class: String,
    pub timestamp: String,
    pub reviewed: bool,
    pub confidence: f64,
    pub area_percentage: f64,
    pub movement_magnitude: f64,
    pub movement_percent: f64,
    #[serde(rename = "truck_width")]
    pub object_width: f64,
    pub detection_time: String,
    #[serde(rename = "pushsafer_sent")]
    pub notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_filename: Option<String>,
    pub video_frame_count: u64,
    pub video_duration: f64,
    pub video_truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EventRecord {
        EventRecord::new(
            "yolov8s",
            "dog",
            0.8765,
            "20250601_120000_000",
            2,
            1.9,
            12.345,
            false,
        )
    }

    #[test]
    fn rounds_confidence_and_duration() {
        let rec = record();
        assert_eq!(rec.initial_confidence, 0.88);
        assert_eq!(rec.event_seconds, 12.3);
        assert!(!rec.reviewed);
    }

    #[test]
    fn base_record_has_no_direction_keys() {
        let json = record().to_json().unwrap();
        assert!(json.get("direction").is_none());
        assert!(json.get("label").is_none());
        assert_eq!(json["reviewed"], serde_json::Value::Bool(false));
        assert_eq!(json["class"], "dog");
        assert_eq!(json["hef_model"], "yolov8s");
        assert!(json.get("model").is_none());
    }

    #[test]
    fn direction_and_percent_fields_are_flat() {
        let mut rec = record();
        rec.direction = Some(DirectionFields {
            direction: 87,
            named_direction: "OUT".into(),
            label: None,
        });
        rec.set_class_percent("dog", 81.25);

        let json = rec.to_json().unwrap();
        assert_eq!(json["direction"], 87);
        assert_eq!(json["named_direction"], "OUT");
        assert!(json["label"].is_null());
        assert_eq!(json["dog_percent"], 81.3);
        assert_eq!(rec.class_percent("dog"), Some(81.3));
        assert_eq!(rec.direction_degrees(), Some(87));
    }
}
