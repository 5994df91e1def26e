//! Movement tracking for a large secondary object (e.g. a truck).
//!
//! Runs on every frame regardless of the primary session. The largest
//! qualifying box is followed; it counts as moving once its horizontal
//! displacement from where it was first seen exceeds a share of its own
//! width, which keeps the threshold independent of distance to the camera.

use chrono::NaiveDateTime;

use crate::detect::Detection;
use crate::geometry::Point2D;

#[derive(Clone, Debug, PartialEq)]
pub struct MovementSettings {
    pub class: String,
    pub min_confidence: f32,
    pub min_area_percentage: f64,
    pub movement_threshold_percent: f64,
    pub detection_frames: u32,
    pub alert_cooldown_frames: u32,
    pub image_cooldown_frames: u32,
}

/// Emitted when a moving object is confirmed and the alert cooldown is clear.
#[derive(Clone, Debug, PartialEq)]
pub struct MovementAlert {
    pub class: String,
    pub confidence: f32,
    pub area_percentage: f64,
    pub movement_magnitude: f64,
    pub movement_percent: f64,
    pub object_width: f64,
    pub detected_at: NaiveDateTime,
    /// The image cooldown was clear and a frame was available.
    pub capture_image: bool,
}

#[derive(Debug)]
pub struct MovementTracker {
    settings: MovementSettings,
    detection_counter: u32,
    initial_centroid: Option<Point2D>,
    current_centroid: Option<Point2D>,
    is_moving: bool,
    alert_countdown: u32,
    image_countdown: u32,
}

impl MovementTracker {
    pub fn new(settings: MovementSettings) -> Self {
        Self {
            settings,
            detection_counter: 0,
            initial_centroid: None,
            current_centroid: None,
            is_moving: false,
            alert_countdown: 0,
            image_countdown: 0,
        }
    }

    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    pub fn detection_counter(&self) -> u32 {
        self.detection_counter
    }

    pub fn initial_centroid(&self) -> Option<Point2D> {
        self.initial_centroid
    }

    /// Process one frame. Cooldowns tick down on every call.
    pub fn observe(
        &mut self,
        detections: &[Detection],
        now: NaiveDateTime,
        frame_available: bool,
    ) -> Option<MovementAlert> {
        let alert = self.evaluate(detections, now, frame_available);
        self.alert_countdown = self.alert_countdown.saturating_sub(1);
        self.image_countdown = self.image_countdown.saturating_sub(1);
        alert
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        now: NaiveDateTime,
        frame_available: bool,
    ) -> Option<MovementAlert> {
        let largest = detections
            .iter()
            .filter(|d| d.matches(&self.settings.class, self.settings.min_confidence))
            .map(|d| (d, d.bbox.area_percentage()))
            .fold(None::<(&Detection, f64)>, |best, (d, area)| match best {
                Some((_, best_area)) if best_area >= area => best,
                _ => Some((d, area)),
            });

        let Some((detection, area)) = largest.filter(|(_, area)| *area >= self.settings.min_area_percentage)
        else {
            self.lose_track();
            return None;
        };

        self.detection_counter += 1;
        let centroid = detection.bbox.center();
        self.current_centroid = Some(centroid);
        let width = detection.bbox.width();
        let initial = *self.initial_centroid.get_or_insert_with(|| {
            log::debug!("{} first seen at {}", self.settings.class, centroid);
            centroid
        });

        if self.detection_counter < self.settings.detection_frames {
            return None;
        }

        let movement = (centroid - initial).x.abs();
        let threshold = width * self.settings.movement_threshold_percent / 100.0;
        if movement <= threshold {
            return None;
        }
        self.is_moving = true;

        if self.alert_countdown > 0 {
            return None;
        }
        self.alert_countdown = self.settings.alert_cooldown_frames;

        let movement_percent = if width > 0.0 {
            movement / width * 100.0
        } else {
            0.0
        };
        let capture_image = frame_available && self.image_countdown == 0;
        if capture_image {
            self.image_countdown = self.settings.image_cooldown_frames;
        }

        log::warn!(
            "moving {} detected: area {:.1}%, horizontal movement {:.4} ({:.1}% of width), confidence {:.2}",
            self.settings.class,
            area,
            movement,
            movement_percent,
            detection.confidence
        );

        Some(MovementAlert {
            class: self.settings.class.clone(),
            confidence: detection.confidence,
            area_percentage: area,
            movement_magnitude: movement,
            movement_percent,
            object_width: width,
            detected_at: now,
            capture_image,
        })
    }

    fn lose_track(&mut self) {
        self.detection_counter = 0;
        self.is_moving = false;
        self.initial_centroid = None;
        self.current_centroid = None;
    }
}
