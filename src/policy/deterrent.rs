use chrono::NaiveDateTime;

use super::{SessionPolicy, SessionView};
use crate::tasks::{submit_or_log, Task, TaskSink};

/// Fires the deterrent once per session after the subject has stayed for
/// `delay_seconds`, and at most once per `rate_limit_seconds` overall.
pub struct DeterrentPolicy {
    delay_seconds: f64,
    rate_limit_seconds: f64,
    triggered: bool,
    last_triggered_at: Option<NaiveDateTime>,
}

impl DeterrentPolicy {
    pub fn new(delay_seconds: f64, rate_limit_seconds: f64) -> Self {
        Self {
            delay_seconds,
            rate_limit_seconds,
            triggered: false,
            last_triggered_at: None,
        }
    }

    fn rate_limited(&self, now: NaiveDateTime) -> bool {
        match self.last_triggered_at {
            Some(last) => {
                ((now - last).num_milliseconds() as f64 / 1000.0) < self.rate_limit_seconds
            }
            None => false,
        }
    }
}

impl SessionPolicy for DeterrentPolicy {
    fn name(&self) -> &'static str {
        "deterrent"
    }

    fn on_tick(&mut self, view: &SessionView<'_>, tasks: &dyn TaskSink) {
        if self.triggered || view.elapsed_seconds < self.delay_seconds {
            return;
        }
        if self.rate_limited(view.now) {
            return;
        }
        self.triggered = true;
        self.last_triggered_at = Some(view.now);
        log::info!(
            "{} present for {:.1}s, triggering deterrent",
            view.class,
            view.elapsed_seconds
        );
        submit_or_log(
            tasks,
            Task::Deter {
                reason: format!("{} present for {:.0}s", view.class, view.elapsed_seconds),
            },
        );
    }

    fn on_reset(&mut self) {
        self.triggered = false;
    }
}
