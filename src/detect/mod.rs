mod reader;
mod replay;
mod result;
mod source;

pub use reader::{FrameReader, ReaderEvent, StopHandle};
pub use replay::ReplaySource;
pub use result::{BoundingBox, Detection};
pub use source::{DetectedFrame, DetectionSource};
