//! Detection replay from JSON lines.
//!
//! Each non-empty line is one frame:
//!
//! ```json
//! {"captured_at": "2025-06-01T08:00:00.033", "width": 640, "height": 480,
//!  "image": "frames/000001.jpg",
//!  "detections": [{"label": "dog", "confidence": 0.82, "bbox": [0.1, 0.2, 0.3, 0.5]}]}
//! ```
//!
//! `captured_at` and `image` are optional. Missing timestamps are synthesized
//! from the replay origin and the frame rate. Image paths are resolved against
//! the replay's base directory.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use std::io::BufRead;
use std::path::PathBuf;

use crate::frame::Frame;

use super::result::Detection;
use super::source::{DetectedFrame, DetectionSource};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Deserialize)]
struct ReplayLine {
    captured_at: Option<String>,
    width: u32,
    height: u32,
    image: Option<PathBuf>,
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct ReplaySource<R> {
    name: String,
    reader: R,
    base_dir: Option<PathBuf>,
    origin: NaiveDateTime,
    frame_rate: u32,
    frames_read: u64,
    line_no: u64,
    skipped: u64,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(name: impl Into<String>, reader: R, origin: NaiveDateTime, frame_rate: u32) -> Self {
        Self {
            name: name.into(),
            reader,
            base_dir: None,
            origin,
            frame_rate: frame_rate.max(1),
            frames_read: 0,
            line_no: 0,
            skipped: 0,
        }
    }

    /// Resolve relative `image` paths against this directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Lines dropped because they could not be parsed.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    fn synthesized_timestamp(&self) -> NaiveDateTime {
        let millis = (self.frames_read as i64 * 1000) / i64::from(self.frame_rate);
        self.origin + Duration::milliseconds(millis)
    }

    fn load_image(&self, path: PathBuf) -> Option<Frame> {
        let resolved = match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        };
        match image::open(&resolved) {
            Ok(img) => Some(Frame::from_image(img.to_rgb8())),
            Err(e) => {
                log::warn!("replay {}: image {} unreadable: {}", self.name, resolved.display(), e);
                None
            }
        }
    }
}

impl<R: BufRead> DetectionSource for ReplaySource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<DetectedFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = match serde_json::from_str(line.trim()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.skipped += 1;
                    log::warn!("replay {} line {}: skipped: {}", self.name, self.line_no, e);
                    continue;
                }
            };

            let captured_at = match parsed.captured_at.as_deref().map(parse_timestamp) {
                Some(Some(ts)) => ts,
                Some(None) => {
                    log::warn!(
                        "replay {} line {}: unparseable captured_at, using frame clock",
                        self.name,
                        self.line_no
                    );
                    self.synthesized_timestamp()
                }
                None => self.synthesized_timestamp(),
            };
            let image = parsed.image.and_then(|path| self.load_image(path));
            self.frames_read += 1;

            return Ok(Some(DetectedFrame {
                captured_at,
                width: parsed.width,
                height: parsed.height,
                detections: parsed.detections,
                image,
            }));
        }
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    fn origin() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn reads_frames_and_synthesizes_timestamps() {
        let input = concat!(
            r#"{"width":640,"height":480,"detections":[{"label":"dog","confidence":0.9,"bbox":[0.1,0.1,0.2,0.2]}]}"#,
            "\n\n",
            r#"{"width":640,"height":480}"#,
            "\n"
        );
        let mut source = ReplaySource::new("test", Cursor::new(input), origin(), 10);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.captured_at, origin());
        assert_eq!(first.detections.len(), 1);
        assert!(first.image.is_none());

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.captured_at, origin() + Duration::milliseconds(100));
        assert!(second.detections.is_empty());

        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn skips_malformed_lines() {
        let input = "not json\n{\"width\":4,\"height\":4,\"captured_at\":\"2025-06-01T09:30:00.250\"}\n";
        let mut source = ReplaySource::new("test", Cursor::new(input), origin(), 30);

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(
            frame.captured_at,
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_milli_opt(9, 30, 0, 250)
                .unwrap()
        );
        assert_eq!(source.skipped_lines(), 1);
    }
}
