//! Per-deployment behaviour layered on the core session lifecycle.
//!
//! The watcher calls every configured policy at fixed points: once when a
//! session starts, once per tracking frame, and once when it stops. At stop
//! a policy may add fields to the record and vote to discard the event.
//! Policies are composed at construction, in config order.

mod announce;
mod deterrent;
mod directional;
mod dwell;
mod visibility;

pub use announce::StartAnnouncePolicy;
pub use deterrent::DeterrentPolicy;
pub use directional::DirectionalLabelPolicy;
pub use dwell::DwellNotifyPolicy;
pub use visibility::VisibilityAbortPolicy;

use chrono::NaiveDateTime;

use crate::config::WatcherConfig;
use crate::record::EventRecord;
use crate::tasks::TaskSink;
use crate::tracking::{SecondaryClassMonitor, TrackingSession};

/// Read-only snapshot handed to policy hooks.
#[derive(Clone, Copy)]
pub struct SessionView<'a> {
    pub class: &'a str,
    pub session: &'a TrackingSession,
    pub monitor: &'a SecondaryClassMonitor,
    pub now: NaiveDateTime,
    /// Frame-clock seconds since the session started.
    pub elapsed_seconds: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Abort,
}

pub trait SessionPolicy: Send {
    fn name(&self) -> &'static str;

    fn on_start(&mut self, _view: &SessionView<'_>, _tasks: &dyn TaskSink) {}

    fn on_tick(&mut self, _view: &SessionView<'_>, _tasks: &dyn TaskSink) {}

    /// Decorate the record and vote. Any `Abort` discards the event.
    fn on_stop(&mut self, _view: &SessionView<'_>, _record: &mut EventRecord) -> Verdict {
        Verdict::Keep
    }

    /// Called after a kept event has been persisted.
    fn on_finalized(&mut self, _record: &EventRecord, _tasks: &dyn TaskSink) {}

    /// Session state has been cleared, kept or not.
    fn on_reset(&mut self) {}
}

/// Build the policy stack described by `cfg`.
pub fn from_config(cfg: &WatcherConfig) -> Vec<Box<dyn SessionPolicy>> {
    let mut policies: Vec<Box<dyn SessionPolicy>> = Vec::new();
    if cfg.announce_on_start {
        policies.push(Box::new(StartAnnouncePolicy));
    }
    if let Some(directional) = &cfg.directional {
        policies.push(Box::new(DirectionalLabelPolicy::new(directional.clone())));
    }
    if let Some(abort) = &cfg.abort {
        policies.push(Box::new(VisibilityAbortPolicy::new(
            abort.class.clone(),
            abort.min_visible_seconds,
            cfg.gone_seconds,
        )));
    }
    if let Some(deterrent) = &cfg.deterrent {
        policies.push(Box::new(DeterrentPolicy::new(
            deterrent.delay_seconds,
            deterrent.rate_limit_seconds,
        )));
    }
    if let Some(dwell) = cfg.notify.as_ref().and_then(|n| n.dwell_seconds) {
        policies.push(Box::new(DwellNotifyPolicy::new(dwell)));
    }
    policies
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatcherConfig;

    #[test]
    fn default_config_has_no_policies() {
        assert!(from_config(&WatcherConfig::default()).is_empty());
    }

    #[test]
    fn sections_enable_policies() {
        let mut cfg = WatcherConfig::default();
        cfg.announce_on_start = true;
        cfg.abort = Some(crate::config::AbortSettings {
            class: "dog".into(),
            min_visible_seconds: 2.0,
        });
        let names: Vec<_> = from_config(&cfg).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["start-announce", "visibility-abort"]);
    }
}
