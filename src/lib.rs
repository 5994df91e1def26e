//! Sighting Kernel
//!
//! Turns a stream of per-frame object detections into debounced sighting
//! events, each persisted as a clip, a representative image and a metadata
//! record for later review.
//!
//! # Architecture
//!
//! One frame is processed completely before the next:
//!
//! 1. **Filter**: detections of the tracked class above the confidence threshold.
//! 2. **Mask gate**: at least one box center inside the region mask, if any.
//! 3. **Debounce**: hysteresis between idle and tracking on consecutive-frame counts.
//! 4. **Accumulate**: instance counts, velocity, best frame and the clip while tracking.
//! 5. **Monitor**: presence of auxiliary classes while tracking.
//! 6. **Movement**: an independent large-object tracker on every frame.
//!
//! On stop, policies decorate the record and may abort the event. Kept
//! events are handed to the event store; post-processing and alerts run on
//! a background task queue.
//!
//! # Module Structure
//!
//! - `tracking`: session state, debouncer, monitor, finalize math, movement tracker
//! - `engine`: the per-frame `Watcher`
//! - `policy`: variant behaviour composed onto the session lifecycle
//! - `detect`, `frame`, `mask`, `geometry`: inputs and their value types
//! - `record`, `storage`, `recorder`, `tasks`, `notify`: outputs and side effects
//! - `config`, `catalog`: configuration and downstream clip selection
//! - `daylight`: sunrise and sunset gating for daytime-only runs

pub mod catalog;
pub mod config;
pub mod daylight;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod notify;
pub mod policy;
pub mod record;
pub mod recorder;
pub mod storage;
pub mod tasks;
pub mod tracking;

pub use config::WatcherConfig;
pub use daylight::DaylightGate;
pub use detect::{
    BoundingBox, DetectedFrame, Detection, DetectionSource, FrameReader, ReaderEvent, ReplaySource,
};
pub use engine::{FrameInput, FrameReport, SessionOutcome, Watcher};
pub use frame::{Frame, FrameView};
pub use geometry::Point2D;
pub use mask::RegionMask;
pub use policy::{SessionPolicy, SessionView, Verdict};
pub use record::{EventRecord, MovementRecord};
pub use recorder::{FfmpegRecorder, Recorder, Transcoder};
pub use storage::{ArtifactKey, EventStore, FilesystemEventStore, InMemoryEventStore};
pub use tasks::{CollectingSink, Task, TaskHandlers, TaskQueue, TaskSink};
pub use tracking::{Debouncer, SecondaryClassMonitor, TrackingSession, Transition};
