//! Per-frame controller tying the tracking core to its collaborators.
//!
//! `Watcher` owns the session, debouncer and secondary monitor for one
//! tracked class and is driven by one call per frame. All side effects go
//! through the recorder, event store and task sink it was built with;
//! failures there are logged and never change tracking state.

mod vehicle;

pub use vehicle::VehicleChannel;

use chrono::NaiveDateTime;
use std::path::PathBuf;

use crate::config::WatcherConfig;
use crate::detect::{DetectedFrame, Detection};
use crate::frame::FrameView;
use crate::mask::RegionMask;
use crate::policy::{self, SessionPolicy, SessionView, Verdict};
use crate::record::EventRecord;
use crate::recorder::Recorder;
use crate::storage::{ArtifactKey, EventStore};
use crate::tasks::{submit_or_log, Task, TaskSink};
use crate::tracking::finalize::{event_identity, round_to};
use crate::tracking::{
    Debouncer, MovementAlert, MovementTracker, SecondaryClassMonitor, TrackingSession, Transition,
    VideoClip,
};

/// Detector output for one frame, borrowed for the duration of the call.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub captured_at: NaiveDateTime,
    pub width: u32,
    pub height: u32,
    pub detections: &'a [Detection],
    pub frame: Option<FrameView<'a>>,
}

impl<'a> FrameInput<'a> {
    pub fn new(captured_at: NaiveDateTime, width: u32, height: u32, detections: &'a [Detection]) -> Self {
        Self {
            captured_at,
            width,
            height,
            detections,
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: FrameView<'a>) -> Self {
        self.frame = Some(frame);
        self
    }
}

impl<'a> From<&'a DetectedFrame> for FrameInput<'a> {
    fn from(frame: &'a DetectedFrame) -> Self {
        Self {
            captured_at: frame.captured_at,
            width: frame.width,
            height: frame.height,
            detections: &frame.detections,
            frame: frame.image.as_ref().map(|image| image.view()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Kept and persisted.
    Finalized(EventRecord),
    /// Discarded by a policy; nothing persisted.
    Aborted(EventRecord),
}

impl SessionOutcome {
    pub fn record(&self) -> &EventRecord {
        match self {
            SessionOutcome::Finalized(record) | SessionOutcome::Aborted(record) => record,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionOutcome::Aborted(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub transition: Transition,
    /// Tracking state after this frame.
    pub tracking: bool,
    pub outcome: Option<SessionOutcome>,
    pub vehicle_alert: Option<MovementAlert>,
}

impl FrameReport {
    fn ignored() -> Self {
        Self {
            transition: Transition::Hold,
            tracking: false,
            outcome: None,
            vehicle_alert: None,
        }
    }
}

pub struct Watcher {
    class: String,
    model_name: String,
    match_confidence: f32,
    frame_rate: u32,
    video_max_seconds: f64,
    save_video: bool,
    save_images: bool,
    debouncer: Debouncer,
    session: TrackingSession,
    monitor: SecondaryClassMonitor,
    mask: RegionMask,
    policies: Vec<Box<dyn SessionPolicy>>,
    store: Box<dyn EventStore>,
    recorder: Box<dyn Recorder>,
    tasks: Box<dyn TaskSink>,
    vehicle: Option<VehicleChannel>,
    frames_processed: u64,
    events_finalized: u64,
    events_aborted: u64,
    ended: bool,
}

impl Watcher {
    /// Build a watcher with the mask, policies and movement channel that
    /// `cfg` describes.
    pub fn from_config(
        cfg: &WatcherConfig,
        store: Box<dyn EventStore>,
        recorder: Box<dyn Recorder>,
        tasks: Box<dyn TaskSink>,
    ) -> Self {
        let mask = match &cfg.mask_path {
            Some(path) => RegionMask::load(path),
            None => RegionMask::disabled(),
        };
        let vehicle = cfg.secondary_tracking.as_ref().map(|settings| {
            let notify = cfg.notify.as_ref().is_some_and(|n| n.notify_vehicles);
            VehicleChannel::new(settings, &cfg.model_name, cfg.frame_rate, notify)
        });
        Self {
            class: cfg.class_to_track.clone(),
            model_name: cfg.model_name.clone(),
            match_confidence: cfg.match_confidence,
            frame_rate: cfg.frame_rate,
            video_max_seconds: cfg.video_max_seconds,
            save_video: cfg.save_video,
            save_images: cfg.save_images,
            debouncer: Debouncer::new(cfg.detect_threshold, cfg.gone_seconds, cfg.frame_rate),
            session: TrackingSession::new(),
            monitor: SecondaryClassMonitor::new(cfg.monitored_classes(), cfg.match_confidence),
            mask,
            policies: policy::from_config(cfg),
            store,
            recorder,
            tasks,
            vehicle,
            frames_processed: 0,
            events_finalized: 0,
            events_aborted: 0,
            ended: false,
        }
    }

    pub fn with_mask(mut self, mask: RegionMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn SessionPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Give the movement channel its own recorder. Without one it writes
    /// images and metadata only.
    pub fn with_vehicle_recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        match self.vehicle.as_mut() {
            Some(vehicle) => vehicle.set_recorder(recorder),
            None => log::debug!("no secondary tracking configured, ignoring movement recorder"),
        }
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn monitor(&self) -> &SecondaryClassMonitor {
        &self.monitor
    }

    pub fn mask(&self) -> &RegionMask {
        &self.mask
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_tracking()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn events_finalized(&self) -> u64 {
        self.events_finalized
    }

    pub fn events_aborted(&self) -> u64 {
        self.events_aborted
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn vehicle(&self) -> Option<&VehicleChannel> {
        self.vehicle.as_ref()
    }

    pub fn vehicle_tracker(&self) -> Option<&MovementTracker> {
        self.vehicle.as_ref().map(VehicleChannel::tracker)
    }

    /// Run one frame through debounce, accumulation, the secondary monitor
    /// and the movement channel, in that order.
    ///
    /// Frames after [`Watcher::end_of_stream`] are ignored.
    pub fn process_frame(&mut self, input: &FrameInput<'_>) -> FrameReport {
        if self.ended {
            log::debug!("frame at {} after end of stream ignored", input.captured_at);
            return FrameReport::ignored();
        }
        self.frames_processed += 1;
        let now = input.captured_at;

        let qualifying: Vec<&Detection> = input
            .detections
            .iter()
            .filter(|det| det.matches(&self.class, self.match_confidence))
            .collect();
        let present = !qualifying.is_empty()
            && (!self.mask.is_enabled()
                || qualifying
                    .iter()
                    .any(|det| self.mask.contains(det.bbox.center())));
        let counted: &[&Detection] = if present { &qualifying } else { &[] };

        let transition = self.debouncer.observe(&mut self.session, present);
        let mut outcome = None;
        match transition {
            Transition::Start => self.start_session(input, counted),
            Transition::Stop => {
                log::info!(
                    "{} gone for {} frames",
                    self.class,
                    self.session.consecutive_absent_count()
                );
                outcome = self.stop_session(now);
            }
            Transition::Hold => {}
        }

        if self.session.is_tracking() {
            self.monitor.observe(input.detections);
            self.session.accumulate(counted, input.frame);
            if let Some(frame) = input.frame {
                self.capture_video(now, frame);
            }
            let view = session_view(&self.class, &self.session, &self.monitor, now);
            for policy in self.policies.iter_mut() {
                policy.on_tick(&view, self.tasks.as_ref());
            }
        }

        let vehicle_alert = match self.vehicle.as_mut() {
            Some(vehicle) => vehicle.observe(input, self.store.as_mut(), self.tasks.as_ref()),
            None => None,
        };

        FrameReport {
            transition,
            tracking: self.session.is_tracking(),
            outcome,
            vehicle_alert,
        }
    }

    /// Force-stop any open session through the normal stop path.
    ///
    /// Only the first call has an effect; later frames are ignored.
    pub fn end_of_stream(&mut self, now: NaiveDateTime) -> Option<SessionOutcome> {
        if self.ended {
            return None;
        }
        self.ended = true;
        let outcome = if self.session.is_tracking() {
            log::info!("end of stream while tracking {}, finalizing", self.class);
            self.stop_session(now)
        } else {
            None
        };
        if let Some(vehicle) = self.vehicle.as_mut() {
            vehicle.end_of_stream(self.store.as_mut(), self.tasks.as_ref());
        }
        log::info!(
            "watcher stopped after {} frames ({} events kept, {} aborted)",
            self.frames_processed,
            self.events_finalized,
            self.events_aborted
        );
        outcome
    }

    fn start_session(&mut self, input: &FrameInput<'_>, counted: &[&Detection]) {
        let now = input.captured_at;
        let confidence = counted
            .iter()
            .map(|det| det.confidence)
            .fold(0.0_f32, f32::max);
        self.session.start(now, confidence);
        self.monitor.reset();
        log::info!(
            "{} detected at {} (confidence {:.2}, {} instances)",
            self.class.to_uppercase(),
            now,
            confidence,
            counted.len()
        );

        if self.save_video {
            match input.frame {
                Some(frame) => self.open_video(now, frame.width(), frame.height()),
                None => log::debug!("no frame at session start, not recording"),
            }
        }

        let view = session_view(&self.class, &self.session, &self.monitor, now);
        for policy in self.policies.iter_mut() {
            policy.on_start(&view, self.tasks.as_ref());
        }
    }

    fn open_video(&mut self, now: NaiveDateTime, width: u32, height: u32) {
        let stem = format!(
            "{}_{}",
            self.session.active_timestamp().unwrap_or_default(),
            self.class
        );
        let key = ArtifactKey::new(now, stem);
        let opened = self.store.staging_video_path(&key).and_then(|path| {
            self.recorder
                .open(&path, width, height, self.frame_rate)
                .map(|()| path)
        });
        match opened {
            Ok(path) => {
                log::debug!("recording {} to {}", self.class, path.display());
                self.session.attach_video(VideoClip::new(now, path));
            }
            Err(err) => log::warn!("failed to start recording: {:#}", err),
        }
    }

    fn capture_video(&mut self, now: NaiveDateTime, frame: FrameView<'_>) {
        let Some(clip) = self.session.video_mut() else {
            return;
        };
        if clip.closed {
            return;
        }
        let elapsed = (now - clip.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed >= self.video_max_seconds {
            log::info!(
                "video reached {:.0}s, closing early ({} frames)",
                self.video_max_seconds,
                clip.frames_written
            );
            clip.truncated = true;
            close_clip(self.recorder.as_mut(), clip);
            return;
        }
        match self.recorder.write(&frame) {
            Ok(()) => clip.frames_written += 1,
            Err(err) => {
                log::warn!("recording write failed, truncating: {:#}", err);
                clip.truncated = true;
                close_clip(self.recorder.as_mut(), clip);
            }
        }
    }

    fn stop_session(&mut self, now: NaiveDateTime) -> Option<SessionOutcome> {
        if let Some(clip) = self.session.video_mut() {
            if !clip.closed {
                close_clip(self.recorder.as_mut(), clip);
            }
        }

        let elapsed = self.session.elapsed_seconds(now);
        let average = self.session.average_instances(self.frame_rate);
        let started_at = self.session.start_time().unwrap_or(now);
        let timestamp = self
            .session
            .active_timestamp()
            .unwrap_or_default()
            .to_string();
        let truncated = self.session.video().is_some_and(|clip| clip.truncated);

        let mut record = EventRecord::new(
            &self.model_name,
            &self.class,
            self.session.initial_max_confidence(),
            &timestamp,
            self.session.max_instances(),
            round_to(average, 2),
            elapsed,
            truncated,
        );
        for (class, percent) in self.monitor.percentages() {
            record.set_class_percent(&class, percent);
        }

        let view = session_view(&self.class, &self.session, &self.monitor, now);
        let mut verdict = Verdict::Keep;
        for policy in self.policies.iter_mut() {
            if policy.on_stop(&view, &mut record) == Verdict::Abort {
                log::debug!("{} voted to abort", policy.name());
                verdict = Verdict::Abort;
            }
        }

        let identity = event_identity(&timestamp, &self.class, average, record.direction_degrees());
        record.filename = identity.clone();
        let key = ArtifactKey::new(started_at, identity);

        let staged: Option<PathBuf> = self
            .session
            .take_video()
            .map(|clip| clip.output.unwrap_or(clip.path));

        log::info!(
            "{} gone after {:.1}s: max {}, average {:.2}",
            self.class.to_uppercase(),
            elapsed,
            record.max_instances,
            average
        );

        let outcome = match verdict {
            Verdict::Abort => {
                if let Err(err) = self.store.discard(&key, staged.as_deref()) {
                    log::warn!("failed to discard {}: {:#}", key.stem, err);
                }
                self.events_aborted += 1;
                SessionOutcome::Aborted(record)
            }
            Verdict::Keep => {
                self.persist(&key, staged, &record);
                for policy in self.policies.iter_mut() {
                    policy.on_finalized(&record, self.tasks.as_ref());
                }
                self.events_finalized += 1;
                SessionOutcome::Finalized(record)
            }
        };

        self.session.reset();
        self.monitor.reset();
        for policy in self.policies.iter_mut() {
            policy.on_reset();
        }
        Some(outcome)
    }

    fn persist(&mut self, key: &ArtifactKey, staged: Option<PathBuf>, record: &EventRecord) {
        if let Some(staged) = staged {
            match self.store.promote_video(&staged, key) {
                Ok(path) => submit_or_log(self.tasks.as_ref(), Task::Transcode { source: path }),
                Err(err) => log::warn!("failed to keep video for {}: {:#}", key.stem, err),
            }
        }
        if self.save_images {
            if let Some(frame) = self.session.take_best_frame() {
                if let Err(err) = self.store.save_image(key, &frame) {
                    log::warn!("failed to save image for {}: {:#}", key.stem, err);
                }
            }
        }
        let saved = record
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.save_metadata(key, &json));
        if let Err(err) = saved {
            log::error!("failed to save metadata for {}: {:#}", key.stem, err);
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("class", &self.class)
            .field("tracking", &self.session.is_tracking())
            .field("frames_processed", &self.frames_processed)
            .field("policies", &self.policy_names())
            .field("vehicle", &self.vehicle)
            .finish()
    }
}

fn session_view<'a>(
    class: &'a str,
    session: &'a TrackingSession,
    monitor: &'a SecondaryClassMonitor,
    now: NaiveDateTime,
) -> SessionView<'a> {
    SessionView {
        class,
        session,
        monitor,
        now,
        elapsed_seconds: session.elapsed_seconds(now),
    }
}

/// Close the recorder for `clip`. Called once per opened clip.
fn close_clip(recorder: &mut dyn Recorder, clip: &mut VideoClip) {
    match recorder.close() {
        Ok(path) => clip.output = Some(path),
        Err(err) => log::warn!("failed to close recording {}: {:#}", clip.path.display(), err),
    }
    clip.closed = true;
}
