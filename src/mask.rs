//! Region mask gating for the tracked class.
//!
//! A mask is a grayscale image the same aspect as the camera frame. Pixels
//! brighter than mid-gray mark the region where detections may start or
//! sustain tracking. Lookups take normalized coordinates, so the mask image
//! does not need to match the stream resolution.

use image::GrayImage;
use std::path::Path;

use crate::geometry::Point2D;

const INSIDE_THRESHOLD: u8 = 127;

#[derive(Clone, Debug, Default)]
pub struct RegionMask {
    grid: Option<GrayImage>,
}

impl RegionMask {
    /// Mask that admits every point.
    pub fn disabled() -> Self {
        Self { grid: None }
    }

    pub fn from_luma(grid: GrayImage) -> Self {
        if grid.width() == 0 || grid.height() == 0 {
            log::warn!("region mask is empty; masking disabled");
            return Self::disabled();
        }
        Self { grid: Some(grid) }
    }

    /// Load a mask image. A missing or undecodable file disables masking.
    pub fn load(path: &Path) -> Self {
        match image::open(path) {
            Ok(img) => {
                let grid = img.to_luma8();
                log::info!(
                    "region mask loaded from {} ({}x{})",
                    path.display(),
                    grid.width(),
                    grid.height()
                );
                Self::from_luma(grid)
            }
            Err(e) => {
                log::warn!(
                    "region mask {} unavailable ({}); masking disabled",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.grid.is_some()
    }

    /// Whether a normalized point falls inside the masked region.
    pub fn contains(&self, point: Point2D) -> bool {
        let Some(grid) = &self.grid else {
            return true;
        };
        if !(0.0..=1.0).contains(&point.x) || !(0.0..=1.0).contains(&point.y) {
            return false;
        }
        let px = scale(point.x, grid.width());
        let py = scale(point.y, grid.height());
        grid.get_pixel(px, py)[0] > INSIDE_THRESHOLD
    }
}

fn scale(value: f64, extent: u32) -> u32 {
    let max = extent.saturating_sub(1);
    ((value * f64::from(extent)) as u32).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn left_half_mask() -> RegionMask {
        let grid = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([255]) } else { Luma([0]) });
        RegionMask::from_luma(grid)
    }

    #[test]
    fn disabled_mask_admits_everything() {
        let mask = RegionMask::disabled();
        assert!(!mask.is_enabled());
        assert!(mask.contains(Point2D::new(5.0, -3.0)));
    }

    #[test]
    fn lookups_use_normalized_coordinates() {
        let mask = left_half_mask();
        assert!(mask.contains(Point2D::new(0.2, 0.5)));
        assert!(!mask.contains(Point2D::new(0.8, 0.5)));
        assert!(!mask.contains(Point2D::new(1.0, 1.0)));
        assert!(mask.contains(Point2D::new(0.0, 1.0)));
    }

    #[test]
    fn out_of_frame_points_are_outside() {
        let mask = left_half_mask();
        assert!(!mask.contains(Point2D::new(-0.1, 0.5)));
        assert!(!mask.contains(Point2D::new(0.2, 1.5)));
    }

    #[test]
    fn missing_file_disables_masking() {
        let mask = RegionMask::load(Path::new("/nonexistent/mask.png"));
        assert!(!mask.is_enabled());
        assert!(mask.contains(Point2D::new(0.9, 0.9)));
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        GrayImage::from_fn(4, 4, |_, y| if y < 2 { Luma([200]) } else { Luma([10]) })
            .save(&path)
            .unwrap();

        let mask = RegionMask::load(&path);
        assert!(mask.is_enabled());
        assert!(mask.contains(Point2D::new(0.5, 0.1)));
        assert!(!mask.contains(Point2D::new(0.5, 0.9)));
    }
}
