use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use image::{GrayImage, Luma};

use sighting_kernel::config::{AbortSettings, DeterrentSettings, DirectionalSettings, NotifySettings};
use sighting_kernel::tracking::default_direction_buckets;
use sighting_kernel::{
    BoundingBox, CollectingSink, Detection, Frame, FrameInput, FrameReport, FrameView,
    InMemoryEventStore, Recorder, RegionMask, SessionOutcome, Task, Transition, Watcher,
    WatcherConfig,
};

const FPS: u32 = 30;

#[derive(Debug, Default)]
struct RecorderLog {
    opened: Vec<PathBuf>,
    writes: u64,
    closes: u64,
    open: Option<PathBuf>,
}

#[derive(Clone, Default)]
struct FakeRecorder(Arc<Mutex<RecorderLog>>);

impl FakeRecorder {
    fn log(&self) -> std::sync::MutexGuard<'_, RecorderLog> {
        self.0.lock().unwrap()
    }
}

impl Recorder for FakeRecorder {
    fn open(&mut self, path: &Path, _width: u32, _height: u32, fps: u32) -> Result<()> {
        let mut log = self.log();
        if log.open.is_some() {
            return Err(anyhow!("already open"));
        }
        assert_eq!(fps, FPS);
        log.opened.push(path.to_path_buf());
        log.open = Some(path.to_path_buf());
        Ok(())
    }

    fn write(&mut self, _frame: &FrameView<'_>) -> Result<()> {
        let mut log = self.log();
        if log.open.is_none() {
            return Err(anyhow!("write without open"));
        }
        log.writes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<PathBuf> {
        let mut log = self.log();
        let path = log.open.take().ok_or_else(|| anyhow!("close without open"))?;
        log.closes += 1;
        Ok(path)
    }
}

struct Harness {
    watcher: Watcher,
    store: InMemoryEventStore,
    recorder: FakeRecorder,
    sink: CollectingSink,
    image: Frame,
}

impl Harness {
    fn new(cfg: &WatcherConfig) -> Self {
        let store = InMemoryEventStore::new();
        let recorder = FakeRecorder::default();
        let sink = CollectingSink::new();
        let watcher = Watcher::from_config(
            cfg,
            Box::new(store.clone()),
            Box::new(recorder.clone()),
            Box::new(sink.clone()),
        );
        Self {
            watcher,
            store,
            recorder,
            sink,
            image: Frame::filled(8, 6, [40, 80, 120]),
        }
    }

    fn frame(&mut self, n: u32, detections: &[Detection]) -> FrameReport {
        let input = FrameInput::new(at(n), 8, 6, detections).with_frame(self.image.view());
        self.watcher.process_frame(&input)
    }

    fn blind_frame(&mut self, n: u32, detections: &[Detection]) -> FrameReport {
        self.watcher
            .process_frame(&FrameInput::new(at(n), 8, 6, detections))
    }
}

fn at(frame: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        + Duration::milliseconds(i64::from(frame) * 1000 / i64::from(FPS))
}

fn dog_at(x: f32, y: f32) -> Detection {
    Detection::new("dog", 0.9, BoundingBox::new(x - 0.05, y - 0.05, x + 0.05, y + 0.05))
}

fn config() -> WatcherConfig {
    let mut cfg = WatcherConfig::default();
    cfg.class_to_track = "dog".into();
    cfg.match_confidence = 0.5;
    cfg.frame_rate = FPS;
    cfg
}

fn directional(announce_label: bool) -> DirectionalSettings {
    DirectionalSettings {
        label_prefix: "dogs".into(),
        min_instances: 2,
        buckets: default_direction_buckets(),
        announce_label,
    }
}

fn finalized(outcome: Option<SessionOutcome>) -> sighting_kernel::EventRecord {
    match outcome {
        Some(SessionOutcome::Finalized(record)) => record,
        other => panic!("expected a finalized event, got {:?}", other),
    }
}

#[test]
fn threshold_minus_one_frames_never_start() {
    let mut cfg = config();
    cfg.detect_threshold = 4;
    let mut h = Harness::new(&cfg);
    for n in 0..3 {
        assert_eq!(h.frame(n, &[dog_at(0.5, 0.5)]).transition, Transition::Hold);
    }
    h.frame(3, &[]);
    assert!(!h.watcher.is_tracking());
    for n in 4..7 {
        h.frame(n, &[dog_at(0.5, 0.5)]);
    }
    assert!(!h.watcher.is_tracking());
    assert_eq!(h.frame(7, &[dog_at(0.5, 0.5)]).transition, Transition::Start);
    assert_eq!(h.recorder.log().opened.len(), 1);
}

#[test]
fn single_detection_resets_gone_window() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    cfg.gone_seconds = 1.0;
    let mut h = Harness::new(&cfg);
    h.frame(0, &[dog_at(0.5, 0.5)]);
    let mut n = 1;
    for _ in 0..3 {
        for _ in 0..29 {
            assert!(h.frame(n, &[]).tracking);
            n += 1;
        }
        h.frame(n, &[dog_at(0.5, 0.5)]);
        n += 1;
    }
    assert!(h.watcher.is_tracking());
    for _ in 0..29 {
        h.frame(n, &[]);
        n += 1;
    }
    let report = h.frame(n, &[]);
    assert_eq!(report.transition, Transition::Stop);
    assert!(!report.tracking);
    assert!(report.outcome.is_some());
}

#[test]
fn two_instances_moving_right() {
    let mut cfg = config();
    cfg.detect_threshold = 3;
    cfg.directional = Some(directional(false));
    let mut h = Harness::new(&cfg);

    let xs = [0.3_f32, 0.45, 0.6, 0.75, 0.9];
    for (n, x) in xs.iter().enumerate() {
        let pair = [dog_at(x - 0.05, 0.5), dog_at(x + 0.05, 0.5)];
        let report = h.frame(n as u32, &pair);
        if n == 2 {
            assert_eq!(report.transition, Transition::Start);
            assert_eq!(h.watcher.session().max_instances(), 2);
        }
    }
    assert_eq!(h.watcher.session().detection_count_history(), &[2, 2, 2]);

    let record = finalized(h.watcher.end_of_stream(at(4)));
    assert_eq!(record.max_instances, 2);
    assert_eq!(record.average_instances, 2.0);
    assert_eq!(record.direction_degrees(), Some(0));
    assert!(record.label().is_none());
    assert_eq!(record.filename, "20250601_120000_066_dog_x2_0");
    assert_eq!(record.initial_confidence, 0.9);

    let stored = h.store.snapshot();
    let metadata = &stored.metadata[&PathBuf::from("20250601/20250601_120000_066_dog_x2_0.json")];
    assert_eq!(metadata["named_direction"], "OTHER");
    assert!(metadata["label"].is_null());
    assert_eq!(metadata["reviewed"], false);
    assert_eq!(
        stored.videos,
        vec![PathBuf::from("20250601/20250601_120000_066_dog_x2_0.m4v")]
    );
    assert_eq!(
        stored.images.get(&PathBuf::from("20250601/20250601_120000_066_dog_x2_0.jpg")),
        Some(&(8, 6))
    );

    let log = h.recorder.log();
    assert_eq!(
        log.opened,
        vec![PathBuf::from("20250601/20250601_120000_066_dog.m4v")]
    );
    assert_eq!(log.writes, 3);
    assert_eq!(log.closes, 1);
    assert_eq!(
        h.sink.tasks(),
        vec![Task::Transcode {
            source: PathBuf::from("20250601/20250601_120000_066_dog_x2_0.m4v")
        }]
    );
}

#[test]
fn downward_pair_is_labelled_out_and_announced() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    cfg.directional = Some(directional(true));
    let mut h = Harness::new(&cfg);

    for n in 0..10u32 {
        let y = 0.2 + 0.05 * n as f32;
        h.blind_frame(n, &[dog_at(0.45, y), dog_at(0.55, y)]);
    }
    let record = finalized(h.watcher.end_of_stream(at(9)));
    assert_eq!(record.direction_degrees(), Some(90));
    assert_eq!(record.label(), Some("dogs_OUT"));
    assert!(record.filename.ends_with("_dog_x2_90"));
    assert_eq!(
        h.sink.tasks(),
        vec![Task::Announce {
            phrase: "dogs OUT".into()
        }]
    );
}

#[test]
fn end_of_stream_finalizes_exactly_once() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    let mut h = Harness::new(&cfg);

    for n in 0..60 {
        h.frame(n, &[dog_at(0.5, 0.5)]);
    }
    assert!(h.watcher.is_tracking());

    let record = finalized(h.watcher.end_of_stream(at(59)));
    assert_eq!(record.event_seconds, 2.0);
    assert!(!record.video_truncated);
    assert!(!h.watcher.is_tracking());

    let report = h.frame(60, &[dog_at(0.5, 0.5)]);
    assert_eq!(report.transition, Transition::Hold);
    assert!(!report.tracking);
    assert_eq!(h.watcher.frames_processed(), 60);
    assert!(h.watcher.end_of_stream(at(61)).is_none());

    let log = h.recorder.log();
    assert_eq!(log.writes, 60);
    assert_eq!(log.closes, 1);
    assert_eq!(h.store.snapshot().metadata.len(), 1);
    assert_eq!(h.watcher.events_finalized(), 1);
}

#[test]
fn video_is_truncated_at_max_length() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    cfg.video_max_seconds = 1.0;
    let mut h = Harness::new(&cfg);

    for n in 0..45 {
        h.frame(n, &[dog_at(0.5, 0.5)]);
        if n == 30 {
            assert_eq!(h.recorder.log().closes, 1);
        }
    }
    assert!(h.watcher.is_tracking());
    let record = finalized(h.watcher.end_of_stream(at(44)));
    assert!(record.video_truncated);

    let log = h.recorder.log();
    assert_eq!(log.writes, 30);
    assert_eq!(log.closes, 1);
}

fn abort_config() -> WatcherConfig {
    let mut cfg = config();
    cfg.detect_threshold = 4;
    cfg.gone_seconds = 3.0;
    cfg.video_max_seconds = 60.0;
    cfg.abort = Some(AbortSettings {
        class: "dog".into(),
        min_visible_seconds: 2.0,
    });
    cfg
}

#[test]
fn brief_sighting_is_aborted_and_discarded() {
    let mut h = Harness::new(&abort_config());
    let mut outcome = None;
    for n in 0..120 {
        let dets = if n < 30 { vec![dog_at(0.5, 0.5)] } else { vec![] };
        let report = h.frame(n, &dets);
        if n == 3 {
            assert_eq!(report.transition, Transition::Start);
        }
        if report.outcome.is_some() {
            assert_eq!(n, 119);
            outcome = report.outcome;
        }
    }
    match outcome {
        Some(SessionOutcome::Aborted(record)) => {
            assert!(record.class_percent("dog").unwrap() < 30.0);
        }
        other => panic!("expected abort, got {:?}", other),
    }

    let stored = h.store.snapshot();
    assert!(stored.metadata.is_empty());
    assert!(stored.videos.is_empty());
    assert!(stored.images.is_empty());
    assert_eq!(stored.discarded.len(), 1);
    assert_eq!(h.recorder.log().closes, 1);
    assert_eq!(h.watcher.events_aborted(), 1);
    assert!(h.sink.tasks().is_empty());
}

#[test]
fn sustained_sighting_is_kept() {
    let mut h = Harness::new(&abort_config());
    let mut outcome = None;
    for n in 0..690 {
        let dets = if n < 600 { vec![dog_at(0.5, 0.5)] } else { vec![] };
        let report = h.frame(n, &dets);
        if report.outcome.is_some() {
            outcome = report.outcome;
        }
    }
    let record = finalized(outcome);
    assert!(record.class_percent("dog").unwrap() > 80.0);
    assert_eq!(h.store.snapshot().metadata.len(), 1);
    assert_eq!(h.watcher.events_finalized(), 1);
    assert!(!h.watcher.is_tracking());
}

#[test]
fn mask_gates_session_start() {
    let mut cfg = config();
    cfg.detect_threshold = 2;
    let left_half = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([255]) } else { Luma([0]) });
    let mut h = Harness::new(&cfg);
    h.watcher = Watcher::from_config(
        &cfg,
        Box::new(h.store.clone()),
        Box::new(h.recorder.clone()),
        Box::new(h.sink.clone()),
    )
    .with_mask(RegionMask::from_luma(left_half));

    for n in 0..10 {
        h.frame(n, &[dog_at(0.75, 0.5)]);
    }
    assert!(!h.watcher.is_tracking());
    assert_eq!(h.watcher.session().consecutive_absent_count(), 10);

    // One box inside the mask is enough.
    h.frame(10, &[dog_at(0.75, 0.5), dog_at(0.25, 0.5)]);
    let report = h.frame(11, &[dog_at(0.75, 0.5), dog_at(0.25, 0.5)]);
    assert_eq!(report.transition, Transition::Start);
    assert_eq!(h.watcher.session().max_instances(), 2);
}

#[test]
fn secondary_classes_are_reported_as_percentages() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    cfg.secondary_classes = vec!["cat".into()];
    let mut h = Harness::new(&cfg);
    let cat = Detection::new("cat", 0.8, BoundingBox::new(0.1, 0.1, 0.2, 0.2));
    for n in 0..4 {
        let mut dets = vec![dog_at(0.5, 0.5)];
        if n == 0 {
            dets.push(cat.clone());
        }
        h.blind_frame(n, &dets);
    }
    let record = finalized(h.watcher.end_of_stream(at(3)));
    assert_eq!(record.class_percent("cat"), Some(25.0));
    let json = record.to_json().unwrap();
    assert_eq!(json["cat_percent"], 25.0);
}

#[test]
fn side_effects_are_queued_not_run() {
    let mut cfg = config();
    cfg.detect_threshold = 1;
    cfg.announce_on_start = true;
    cfg.deterrent = Some(DeterrentSettings {
        delay_seconds: 1.0,
        rate_limit_seconds: 60.0,
        duration_secs: 10,
        linktap: None,
    });
    cfg.notify = Some(NotifySettings {
        dwell_seconds: Some(2.0),
        cooldown_seconds: 300,
        pushsafer_key: None,
        pushsafer_device: None,
        notify_vehicles: false,
    });
    let mut h = Harness::new(&cfg);
    for n in 0..90 {
        h.blind_frame(n, &[dog_at(0.5, 0.5)]);
    }
    let kinds: Vec<_> = h.sink.tasks().iter().map(Task::kind).collect();
    assert_eq!(kinds, vec!["announce", "deter", "notify"]);
    assert_eq!(
        h.sink.tasks()[0],
        Task::Announce {
            phrase: "Its a DOG".into()
        }
    );
}
