use super::{SessionPolicy, SessionView, Verdict};
use crate::config::DirectionalSettings;
use crate::record::{DirectionFields, EventRecord};
use crate::tasks::{submit_or_log, Task, TaskSink};
use crate::tracking::finalize::{direction_degrees, estimate_label, named_direction};

/// Classifies the event by the heading of its mean velocity.
///
/// The label is only emitted when the heading falls in a named bucket and
/// enough instances were seen at the busiest moment; otherwise it is `null`.
pub struct DirectionalLabelPolicy {
    settings: DirectionalSettings,
}

impl DirectionalLabelPolicy {
    pub fn new(settings: DirectionalSettings) -> Self {
        Self { settings }
    }
}

impl SessionPolicy for DirectionalLabelPolicy {
    fn name(&self) -> &'static str {
        "directional-label"
    }

    fn on_stop(&mut self, view: &SessionView<'_>, record: &mut EventRecord) -> Verdict {
        let velocity = view.session.avg_velocity();
        let degrees = direction_degrees(velocity);
        let named = named_direction(degrees, &self.settings.buckets).to_string();
        let label = estimate_label(
            &named,
            record.average_instances,
            self.settings.min_instances,
            &self.settings.label_prefix,
        );
        log::info!(
            "{} moved {} at {} degrees ({}), label {:?}",
            view.class,
            velocity,
            degrees,
            named,
            label
        );
        record.direction = Some(DirectionFields {
            direction: degrees,
            named_direction: named,
            label,
        });
        Verdict::Keep
    }

    fn on_finalized(&mut self, record: &EventRecord, tasks: &dyn TaskSink) {
        if !self.settings.announce_label {
            return;
        }
        if let Some(label) = record.label() {
            submit_or_log(
                tasks,
                Task::Announce {
                    phrase: label.replace('_', " "),
                },
            );
        }
    }
}
