use super::session::TrackingSession;

/// Outcome of feeding one frame to the debouncer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// No state change.
    Hold,
    /// IDLE -> TRACKING on this frame.
    Start,
    /// TRACKING -> IDLE on this frame.
    Stop,
}

/// Hysteresis gate between idle and tracking.
///
/// Counters reset sharply to zero when the frame outcome flips.
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    detect_threshold: u32,
    gone_frames: u32,
}

impl Debouncer {
    pub fn new(detect_threshold: u32, gone_seconds: f64, frame_rate: u32) -> Self {
        // Tolerate float noise such as 0.1 * 30 = 3.0000000000000004.
        let gone_frames = (gone_seconds * f64::from(frame_rate) - 1e-9).ceil().max(0.0) as u32;
        Self {
            detect_threshold: detect_threshold.max(1),
            gone_frames,
        }
    }

    pub fn detect_threshold(&self) -> u32 {
        self.detect_threshold
    }

    /// Consecutive absent frames that end a session.
    pub fn gone_frames(&self) -> u32 {
        self.gone_frames
    }

    /// Update the session's counters for one frame and report the transition.
    ///
    /// The caller is responsible for acting on `Start`/`Stop`; the session's
    /// tracking flag is not touched here.
    pub fn observe(&self, session: &mut TrackingSession, present: bool) -> Transition {
        if present {
            session.consecutive_detect_count = session.consecutive_detect_count.saturating_add(1);
            session.consecutive_absent_count = 0;
            if session.consecutive_detect_count >= self.detect_threshold && !session.is_tracking() {
                return Transition::Start;
            }
        } else {
            session.consecutive_absent_count = session.consecutive_absent_count.saturating_add(1);
            session.consecutive_detect_count = 0;
            if session.consecutive_absent_count >= self.gone_frames && session.is_tracking() {
                return Transition::Stop;
            }
        }
        Transition::Hold
    }
}
