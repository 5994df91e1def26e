//! Frame ownership for the per-frame callback.
//!
//! - `Frame`: owned RGB8 pixel buffer. Used for retained snapshots (best frame).
//! - `FrameView`: borrowed view handed to the watcher for exactly one
//!   `process_frame` call. Anything that must outlive the call is copied with
//!   `FrameView::snapshot`.

use anyhow::{anyhow, Result};

const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame: owned pixels
// ----------------------------------------------------------------------------

/// Owned, tightly packed RGB8 frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = expected_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Uniform frame, mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(expected_len(width, height))
            .collect();
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_image(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            data: &self.data,
            width: self.width,
            height: self.height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// FrameView: per-call borrowed frame
// ----------------------------------------------------------------------------

/// Borrowed frame valid for a single callback.
///
/// The lifetime ties the view to the caller's buffer, so the watcher cannot
/// hold on to it across frames. `snapshot` is the only way to retain pixels.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self> {
        let expected = expected_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "frame view is {} bytes, expected {} for {}x{} rgb",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.data
    }

    /// Copy the pixels out into an owned frame.
    pub fn snapshot(&self) -> Frame {
        Frame {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
