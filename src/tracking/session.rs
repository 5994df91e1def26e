use chrono::NaiveDateTime;
use std::path::PathBuf;

use crate::detect::Detection;
use crate::frame::{Frame, FrameView};
use crate::geometry::Point2D;

/// Format of the event start marker used in artifact names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// State of the clip recorded for the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoClip {
    pub started_at: NaiveDateTime,
    /// Where the recorder was opened.
    pub path: PathBuf,
    pub frames_written: u64,
    pub truncated: bool,
    pub closed: bool,
    /// Final recorder output, known once the clip is closed.
    pub output: Option<PathBuf>,
}

impl VideoClip {
    pub fn new(started_at: NaiveDateTime, path: PathBuf) -> Self {
        Self {
            started_at,
            path,
            frames_written: 0,
            truncated: false,
            closed: false,
            output: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Mutable state of one watched class.
///
/// Created once and reused. `reset` returns the per-event accumulators to
/// their empty state; the hysteresis counters survive resets because they
/// describe the detection stream, not the event.
#[derive(Debug, Default)]
pub struct TrackingSession {
    pub(crate) consecutive_detect_count: u32,
    pub(crate) consecutive_absent_count: u32,
    is_tracking: bool,
    start_time: Option<NaiveDateTime>,
    active_timestamp: Option<String>,
    max_instances: usize,
    detection_count_history: Vec<usize>,
    avg_velocity: Point2D,
    previous_centroid: Option<Point2D>,
    current_centroid: Option<Point2D>,
    best_frame: Option<Frame>,
    initial_max_confidence: f32,
    video: Option<VideoClip>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    pub fn consecutive_detect_count(&self) -> u32 {
        self.consecutive_detect_count
    }

    pub fn consecutive_absent_count(&self) -> u32 {
        self.consecutive_absent_count
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    /// Start marker formatted as `YYYYmmdd_HHMMSS_mmm`.
    pub fn active_timestamp(&self) -> Option<&str> {
        self.active_timestamp.as_deref()
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    pub fn detection_count_history(&self) -> &[usize] {
        &self.detection_count_history
    }

    /// Running mean of centroid displacement, over frames with detections.
    pub fn avg_velocity(&self) -> Point2D {
        self.avg_velocity
    }

    pub fn previous_centroid(&self) -> Option<Point2D> {
        self.previous_centroid
    }

    pub fn current_centroid(&self) -> Option<Point2D> {
        self.current_centroid
    }

    pub fn best_frame(&self) -> Option<&Frame> {
        self.best_frame.as_ref()
    }

    pub fn initial_max_confidence(&self) -> f32 {
        self.initial_max_confidence
    }

    pub fn video(&self) -> Option<&VideoClip> {
        self.video.as_ref()
    }

    pub(crate) fn video_mut(&mut self) -> Option<&mut VideoClip> {
        self.video.as_mut()
    }

    pub(crate) fn attach_video(&mut self, clip: VideoClip) {
        self.video = Some(clip);
    }

    pub(crate) fn take_video(&mut self) -> Option<VideoClip> {
        self.video.take()
    }

    pub(crate) fn take_best_frame(&mut self) -> Option<Frame> {
        self.best_frame.take()
    }

    /// Seconds since the session started, measured on the frame clock.
    pub fn elapsed_seconds(&self, now: NaiveDateTime) -> f64 {
        match self.start_time {
            Some(start) => (now - start).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// Peak sustained instance count, see [`average_instance_count`].
    pub fn average_instances(&self, frame_rate: u32) -> f64 {
        average_instance_count(&self.detection_count_history, frame_rate as usize)
    }

    pub(crate) fn start(&mut self, now: NaiveDateTime, initial_max_confidence: f32) {
        self.is_tracking = true;
        self.start_time = Some(now);
        self.active_timestamp = Some(now.format(TIMESTAMP_FORMAT).to_string());
        self.initial_max_confidence = initial_max_confidence;
    }

    /// Fold one tracking frame into the running statistics.
    pub(crate) fn accumulate(&mut self, qualifying: &[&Detection], frame: Option<FrameView<'_>>) {
        let count = qualifying.len();
        if count > 0 {
            self.detection_count_history.push(count);
            if count > self.max_instances {
                self.max_instances = count;
                if let Some(view) = frame {
                    self.best_frame = Some(view.snapshot());
                }
            }
        }

        self.previous_centroid = self.current_centroid;
        self.current_centroid = Point2D::mean(qualifying.iter().map(|det| det.bbox.center()));

        // Divides by the active frame count, not the number of deltas.
        if let (Some(current), Some(previous)) = (self.current_centroid, self.previous_centroid) {
            let delta = current - previous;
            let n = self.detection_count_history.len() as f64;
            self.avg_velocity = self.avg_velocity + (delta - self.avg_velocity) / n;
        }
    }

    /// Clear every per-event accumulator.
    pub(crate) fn reset(&mut self) {
        self.is_tracking = false;
        self.start_time = None;
        self.active_timestamp = None;
        self.max_instances = 0;
        self.detection_count_history.clear();
        self.avg_velocity = Point2D::ORIGIN;
        self.previous_centroid = None;
        self.current_centroid = None;
        self.best_frame = None;
        self.initial_max_confidence = 0.0;
        self.video = None;
    }
}

/// Peak of the moving average over `history` with a one-second window.
///
/// Shorter histories fall back to the plain mean; an empty history is 0.
pub fn average_instance_count(history: &[usize], window: usize) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    if window == 0 || history.len() < window {
        let sum: usize = history.iter().sum();
        return sum as f64 / history.len() as f64;
    }

    let mut running: usize = history[..window].iter().sum();
    let mut peak = running;
    for i in window..history.len() {
        running = running + history[i] - history[i - window];
        peak = peak.max(running);
    }
    peak as f64 / window as f64
}
