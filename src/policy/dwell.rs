use super::{SessionPolicy, SessionView};
use crate::tasks::{submit_or_log, Task, TaskSink};

/// Sends one notification per session once the subject has been tracked
/// for `dwell_seconds`. Repeat suppression across sessions is the
/// notifier's cooldown.
pub struct DwellNotifyPolicy {
    dwell_seconds: f64,
    notified: bool,
}

impl DwellNotifyPolicy {
    pub fn new(dwell_seconds: f64) -> Self {
        Self {
            dwell_seconds,
            notified: false,
        }
    }
}

impl SessionPolicy for DwellNotifyPolicy {
    fn name(&self) -> &'static str {
        "dwell-notify"
    }

    fn on_tick(&mut self, view: &SessionView<'_>, tasks: &dyn TaskSink) {
        if self.notified || view.elapsed_seconds < self.dwell_seconds {
            return;
        }
        self.notified = true;
        let started = view
            .session
            .active_timestamp()
            .unwrap_or_default()
            .to_string();
        submit_or_log(
            tasks,
            Task::Notify {
                title: format!("{} detected", view.class),
                message: format!(
                    "{} has been in view for {:.0} seconds (since {})",
                    view.class, view.elapsed_seconds, started
                ),
                raised_at: view.now,
            },
        );
    }

    fn on_reset(&mut self) {
        self.notified = false;
    }
}
