//! Clip recording and post-processing through an external `ffmpeg`.
//!
//! Recording pipes raw RGB frames into an ffmpeg child that writes an MPEG-4
//! `.m4v`. Once a clip is kept, `Transcoder` re-encodes it to H.264 `.mp4`
//! on the background task queue.

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::frame::FrameView;

/// Sink for the frames of one clip.
///
/// Callers guarantee `write` only happens between `open` and `close`, and
/// that every successful `open` is matched by exactly one `close`.
pub trait Recorder: Send {
    fn open(&mut self, path: &Path, width: u32, height: u32, fps: u32) -> Result<()>;

    fn write(&mut self, frame: &FrameView<'_>) -> Result<()>;

    /// Finish the clip and return the path of the written file.
    fn close(&mut self) -> Result<PathBuf>;
}

struct ActiveEncode {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

pub struct FfmpegRecorder {
    ffmpeg: PathBuf,
    active: Option<ActiveEncode>,
}

impl FfmpegRecorder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            active: None,
        }
    }
}

impl Recorder for FfmpegRecorder {
    fn open(&mut self, path: &Path, width: u32, height: u32, fps: u32) -> Result<()> {
        if self.active.is_some() {
            return Err(anyhow!("recorder already open"));
        }
        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(fps.max(1).to_string())
            .args(["-i", "-", "-an", "-codec:v", "mpeg4", "-q:v", "5", "-f", "mp4"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.ffmpeg.display()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        log::debug!("recording {}x{}@{} to {}", width, height, fps, path.display());
        self.active = Some(ActiveEncode {
            child,
            stdin: Some(stdin),
            path: path.to_path_buf(),
            width,
            height,
            frames: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &FrameView<'_>) -> Result<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("recorder not open"))?;
        if frame.width() != active.width || frame.height() != active.height {
            return Err(anyhow!(
                "frame is {}x{}, recording is {}x{}",
                frame.width(),
                frame.height(),
                active.width,
                active.height
            ));
        }
        let stdin = active
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg stdin closed"))?;
        stdin
            .write_all(frame.pixels())
            .context("write frame to ffmpeg")?;
        active.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<PathBuf> {
        let mut active = self
            .active
            .take()
            .ok_or_else(|| anyhow!("recorder not open"))?;
        drop(active.stdin.take());
        let status = active.child.wait().context("wait for ffmpeg")?;
        if !status.success() {
            return Err(anyhow!(
                "ffmpeg exited with {} while writing {}",
                status,
                active.path.display()
            ));
        }
        log::debug!(
            "recording closed: {} ({} frames)",
            active.path.display(),
            active.frames
        );
        Ok(active.path)
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            drop(active.stdin.take());
            let _ = active.child.kill();
            let _ = active.child.wait();
        }
    }
}

/// Background H.264 conversion of closed clips.
#[derive(Clone, Debug)]
pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Convert `source` to `.mp4` next to it and remove the source.
    ///
    /// On failure the source is kept and any partial output removed.
    pub fn transcode(&self, source: &Path) -> Result<PathBuf> {
        let final_path = source.with_extension("mp4");
        let temp_path = PathBuf::from(format!("{}.temp.mp4", source.display()));

        let output = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-codec:v", "libx264", "-preset", "fast", "-movflags", "faststart"])
            .arg(&temp_path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to start {}", self.ffmpeg.display()))?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&temp_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "transcode of {} failed ({}): {}",
                source.display(),
                output.status,
                stderr.trim()
            ));
        }

        std::fs::rename(&temp_path, &final_path).with_context(|| {
            format!("failed to move {} into place", temp_path.display())
        })?;
        std::fs::remove_file(source)
            .with_context(|| format!("failed to remove {}", source.display()))?;
        log::info!(
            "converted {} to H264 as {}",
            source.display(),
            final_path.display()
        );
        Ok(final_path)
    }
}
