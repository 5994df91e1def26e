use super::{SessionPolicy, SessionView, Verdict};
use crate::record::EventRecord;
use crate::tracking::finalize::visible_seconds;

/// Discards events whose class was on screen for less than a minimum time.
///
/// The debounce tail counts as tracking even though the subject is gone,
/// so the gone window is subtracted before scaling by the class's presence
/// share.
pub struct VisibilityAbortPolicy {
    class: String,
    min_visible_seconds: f64,
    gone_seconds: f64,
}

impl VisibilityAbortPolicy {
    pub fn new(class: impl Into<String>, min_visible_seconds: f64, gone_seconds: f64) -> Self {
        Self {
            class: class.into(),
            min_visible_seconds,
            gone_seconds,
        }
    }
}

impl SessionPolicy for VisibilityAbortPolicy {
    fn name(&self) -> &'static str {
        "visibility-abort"
    }

    fn on_stop(&mut self, view: &SessionView<'_>, record: &mut EventRecord) -> Verdict {
        let percent = view.monitor.percent(&self.class);
        let visible = visible_seconds(view.elapsed_seconds, self.gone_seconds, percent);
        if visible < self.min_visible_seconds {
            log::info!(
                "aborting {} event: {} visible {:.1}s of {:.1}s ({:.1}%), need {:.1}s",
                record.class,
                self.class,
                visible,
                view.elapsed_seconds,
                percent,
                self.min_visible_seconds
            );
            return Verdict::Abort;
        }
        Verdict::Keep
    }
}
