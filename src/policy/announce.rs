use super::{SessionPolicy, SessionView};
use crate::tasks::{submit_or_log, Task, TaskSink};

/// Speaks "Its a {CLASS}" when a session starts.
#[derive(Debug, Default)]
pub struct StartAnnouncePolicy;

impl SessionPolicy for StartAnnouncePolicy {
    fn name(&self) -> &'static str {
        "start-announce"
    }

    fn on_start(&mut self, view: &SessionView<'_>, tasks: &dyn TaskSink) {
        submit_or_log(
            tasks,
            Task::Announce {
                phrase: format!("Its a {}", view.class.to_uppercase()),
            },
        );
    }
}
