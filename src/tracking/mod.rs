//! Detection debouncing and event statistics.
//!
//! - `debounce`: hysteresis between idle and tracking
//! - `session`: per-event accumulators (counts, velocity, best frame)
//! - `monitor`: auxiliary class presence during a session
//! - `finalize`: direction, labels, visibility and identity at close
//! - `vehicle`: independent large-object movement tracking

pub mod debounce;
pub mod finalize;
pub mod monitor;
pub mod session;
pub mod vehicle;

pub use debounce::{Debouncer, Transition};
pub use finalize::{default_direction_buckets, DirectionBucket};
pub use monitor::SecondaryClassMonitor;
pub use session::{average_instance_count, TrackingSession, VideoClip};
pub use vehicle::{MovementAlert, MovementSettings, MovementTracker};
