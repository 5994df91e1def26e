use anyhow::Result;
use chrono::NaiveDateTime;

use crate::frame::Frame;

use super::result::Detection;

/// One frame's worth of detector output.
#[derive(Debug, Clone)]
pub struct DetectedFrame {
    /// Capture time as reported by the pipeline.
    pub captured_at: NaiveDateTime,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    /// Pixels, when frame capture is enabled upstream.
    pub image: Option<Frame>,
}

/// Producer of per-frame detections.
///
/// The inference pipeline itself sits behind this trait. The watcher only
/// sees labels, confidences and normalized boxes.
pub trait DetectionSource {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<DetectedFrame>>;

    /// Frames handed out so far.
    fn frames_read(&self) -> u64;
}
