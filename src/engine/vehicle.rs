use anyhow::anyhow;
use chrono::NaiveDateTime;

use super::FrameInput;
use crate::config::SecondaryTrackingSettings;
use crate::frame::FrameView;
use crate::record::MovementRecord;
use crate::recorder::Recorder;
use crate::storage::{ArtifactKey, EventStore, IMAGE_EXT, VIDEO_FINAL_EXT};
use crate::tasks::{submit_or_log, Task, TaskSink};
use crate::tracking::finalize::round_to;
use crate::tracking::session::TIMESTAMP_FORMAT;
use crate::tracking::{MovementAlert, MovementTracker};

/// Clip opened by a movement alert.
struct MovementClip {
    key: ArtifactKey,
    alert: MovementAlert,
    frames_written: u64,
    image_filename: Option<String>,
    notified: bool,
}

/// Artifacts for the secondary movement tracker.
///
/// An alert saves an image (subject to the image cooldown), queues a
/// notification, and opens a short clip when none is open. The clip is
/// written every frame until it reaches its maximum length or the stream
/// ends; its metadata is written when it closes. Alerts that arrive while a
/// clip is open get image and metadata only.
pub struct VehicleChannel {
    tracker: MovementTracker,
    model_name: String,
    frame_rate: u32,
    video_max_seconds: f64,
    notify: bool,
    recorder: Option<Box<dyn Recorder>>,
    clip: Option<MovementClip>,
    clips_written: u64,
}

impl VehicleChannel {
    pub fn new(
        settings: &SecondaryTrackingSettings,
        model_name: &str,
        frame_rate: u32,
        notify: bool,
    ) -> Self {
        Self {
            tracker: MovementTracker::new(settings.movement_settings(frame_rate)),
            model_name: model_name.to_string(),
            frame_rate,
            video_max_seconds: settings.video_max_seconds,
            notify,
            recorder: None,
            clip: None,
            clips_written: 0,
        }
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorder = Some(recorder);
    }

    pub fn tracker(&self) -> &MovementTracker {
        &self.tracker
    }

    pub fn is_recording(&self) -> bool {
        self.clip.is_some()
    }

    pub fn clips_written(&self) -> u64 {
        self.clips_written
    }

    pub(crate) fn observe(
        &mut self,
        input: &FrameInput<'_>,
        store: &mut dyn EventStore,
        tasks: &dyn TaskSink,
    ) -> Option<MovementAlert> {
        let alert = self
            .tracker
            .observe(input.detections, input.captured_at, input.frame.is_some());
        if let Some(alert) = &alert {
            self.on_alert(alert, input.frame, store, tasks);
        }
        if let Some(frame) = input.frame {
            self.capture(input.captured_at, frame, store, tasks);
        }
        alert
    }

    pub(crate) fn end_of_stream(&mut self, store: &mut dyn EventStore, tasks: &dyn TaskSink) {
        if self.clip.is_some() {
            self.finish_clip(false, store, tasks);
        }
    }

    fn on_alert(
        &mut self,
        alert: &MovementAlert,
        frame: Option<FrameView<'_>>,
        store: &mut dyn EventStore,
        tasks: &dyn TaskSink,
    ) {
        let stem = format!(
            "{}_moving_{}",
            alert.detected_at.format(TIMESTAMP_FORMAT),
            alert.class
        );
        let key = ArtifactKey::new(alert.detected_at, stem);

        let image_filename = match frame.filter(|_| alert.capture_image) {
            Some(view) => match store.save_image(&key, &view.snapshot()) {
                Ok(_) => Some(key.file_name(IMAGE_EXT)),
                Err(err) => {
                    log::warn!("failed to save {} image: {:#}", alert.class, err);
                    None
                }
            },
            None => None,
        };

        if self.notify {
            submit_or_log(
                tasks,
                Task::Notify {
                    title: format!("Moving {} detected", alert.class),
                    message: format!(
                        "{} moved {:.0}% of its width ({:.0}% of frame) at {}",
                        alert.class,
                        alert.movement_percent,
                        alert.area_percentage,
                        alert.detected_at.format("%H:%M:%S")
                    ),
                    raised_at: alert.detected_at,
                },
            );
        }

        let clip = MovementClip {
            key,
            alert: alert.clone(),
            frames_written: 0,
            image_filename,
            notified: self.notify,
        };

        if self.clip.is_none() {
            if let (Some(view), Some(recorder)) = (frame, self.recorder.as_mut()) {
                let opened = store.staging_video_path(&clip.key).and_then(|path| {
                    recorder.open(&path, view.width(), view.height(), self.frame_rate)
                });
                match opened {
                    Ok(()) => {
                        log::info!("recording moving {} as {}", alert.class, clip.key.stem);
                        self.clip = Some(clip);
                        return;
                    }
                    Err(err) => log::warn!("failed to start {} recording: {:#}", alert.class, err),
                }
            }
        }
        self.write_metadata(&clip, None, false, store);
    }

    fn capture(
        &mut self,
        now: NaiveDateTime,
        frame: FrameView<'_>,
        store: &mut dyn EventStore,
        tasks: &dyn TaskSink,
    ) {
        let (Some(clip), Some(recorder)) = (self.clip.as_mut(), self.recorder.as_mut()) else {
            return;
        };
        let elapsed = (now - clip.alert.detected_at).num_milliseconds() as f64 / 1000.0;
        if elapsed >= self.video_max_seconds {
            self.finish_clip(true, store, tasks);
            return;
        }
        match recorder.write(&frame) {
            Ok(()) => clip.frames_written += 1,
            Err(err) => {
                log::warn!("movement recording write failed: {:#}", err);
                self.finish_clip(true, store, tasks);
            }
        }
    }

    fn finish_clip(&mut self, truncated: bool, store: &mut dyn EventStore, tasks: &dyn TaskSink) {
        let Some(clip) = self.clip.take() else {
            return;
        };
        let closed = match self.recorder.as_mut() {
            Some(recorder) => recorder.close(),
            None => Err(anyhow!("no movement recorder")),
        };
        let video_filename = match closed.and_then(|path| store.promote_video(&path, &clip.key)) {
            Ok(path) => {
                submit_or_log(tasks, Task::Transcode { source: path });
                Some(clip.key.file_name(VIDEO_FINAL_EXT))
            }
            Err(err) => {
                log::warn!("movement recording {} lost: {:#}", clip.key.stem, err);
                None
            }
        };
        self.clips_written += 1;
        self.write_metadata(&clip, video_filename, truncated, store);
    }

    fn write_metadata(
        &self,
        clip: &MovementClip,
        video_filename: Option<String>,
        truncated: bool,
        store: &mut dyn EventStore,
    ) {
        let alert = &clip.alert;
        let frames = if video_filename.is_some() {
            clip.frames_written
        } else {
            0
        };
        let record = MovementRecord {
            filename: clip.key.stem.clone(),
            model: self.model_name.clone(),
            class: alert.class.clone(),
            timestamp: alert.detected_at.format(TIMESTAMP_FORMAT).to_string(),
            reviewed: false,
            confidence: round_to(f64::from(alert.confidence), 2),
            area_percentage: round_to(alert.area_percentage, 1),
            movement_magnitude: round_to(alert.movement_magnitude, 4),
            movement_percent: round_to(alert.movement_percent, 1),
            object_width: round_to(alert.object_width, 4),
            detection_time: alert.detected_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            notified: clip.notified,
            image_filename: clip.image_filename.clone(),
            video_filename,
            video_frame_count: frames,
            video_duration: round_to(frames as f64 / f64::from(self.frame_rate.max(1)), 1),
            video_truncated: truncated,
        };
        let saved = serde_json::to_value(&record)
            .map_err(anyhow::Error::from)
            .and_then(|json| store.save_metadata(&clip.key, &json));
        if let Err(err) = saved {
            log::warn!("failed to save metadata for {}: {:#}", clip.key.stem, err);
        }
    }
}

impl std::fmt::Debug for VehicleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleChannel")
            .field("class", &self.tracker.settings().class)
            .field("recording", &self.clip.as_ref().map(|c| c.key.stem.as_str()))
            .field("clips_written", &self.clips_written)
            .finish()
    }
}
