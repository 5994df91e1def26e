//! Derived fields computed when a session closes.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

pub const OTHER_DIRECTION: &str = "OTHER";

/// Half-open angular range `[from, to)` in whole degrees mapped to a name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionBucket {
    pub name: String,
    pub from: u32,
    pub to: u32,
}

impl DirectionBucket {
    pub fn new(name: impl Into<String>, from: u32, to: u32) -> Self {
        Self {
            name: name.into(),
            from,
            to,
        }
    }

    pub fn contains(&self, degrees: u32) -> bool {
        degrees >= self.from && degrees < self.to
    }
}

/// "OUT" for [25,100), "BACK" for [205,280).
pub fn default_direction_buckets() -> Vec<DirectionBucket> {
    vec![
        DirectionBucket::new("OUT", 25, 100),
        DirectionBucket::new("BACK", 205, 280),
    ]
}

/// Whole-degree heading of the mean velocity, truncated toward zero.
pub fn direction_degrees(velocity: Point2D) -> u32 {
    velocity.direction() as u32
}

pub fn named_direction(degrees: u32, buckets: &[DirectionBucket]) -> &str {
    buckets
        .iter()
        .find(|bucket| bucket.contains(degrees))
        .map(|bucket| bucket.name.as_str())
        .unwrap_or(OTHER_DIRECTION)
}

/// `{prefix}_{named}` when enough instances were seen and the heading falls
/// in a named bucket.
pub fn estimate_label(
    named: &str,
    average_instances: f64,
    min_instances: u32,
    prefix: &str,
) -> Option<String> {
    if named == OTHER_DIRECTION {
        return None;
    }
    if rounded_count(average_instances) < i64::from(min_instances) {
        return None;
    }
    Some(format!("{}_{}", prefix, named))
}

/// Seconds the class was actually on screen, discounting the gone window.
pub fn visible_seconds(event_seconds: f64, gone_seconds: f64, class_percent: f64) -> f64 {
    (event_seconds - gone_seconds) * (class_percent / 100.0)
}

/// Round half to even, matching how counts are rounded in artifact names.
pub fn rounded_count(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// `{timestamp}_{class}_x{count}[_{direction}]`
pub fn event_identity(
    timestamp: &str,
    class: &str,
    average_instances: f64,
    direction: Option<u32>,
) -> String {
    let count = rounded_count(average_instances);
    match direction {
        Some(degrees) => format!("{}_{}_x{}_{}", timestamp, class, count, degrees),
        None => format!("{}_{}_x{}", timestamp, class, count),
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
