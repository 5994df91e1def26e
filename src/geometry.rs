//! Planar vector math for centroids and velocities.
//!
//! Points live in normalized image coordinates: `x` grows to the right,
//! `y` grows downward, both nominally within `[0, 1]`.

use serde::Serialize;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ORIGIN: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Angle from the positive x axis in degrees, in `[0, 360)`.
    ///
    /// The zero vector reports 0.
    pub fn direction(&self) -> f64 {
        let mut degrees = self.y.atan2(self.x).to_degrees();
        if degrees < 0.0 {
            degrees += 360.0;
        }
        // -0.0000001 + 360 rounds to 360.0 in f64.
        if degrees >= 360.0 {
            degrees -= 360.0;
        }
        degrees
    }

    /// Mean of a set of points, or `None` when the set is empty.
    pub fn mean<I>(points: I) -> Option<Point2D>
    where
        I: IntoIterator<Item = Point2D>,
    {
        let mut sum = Point2D::ORIGIN;
        let mut count = 0usize;
        for point in points {
            sum = sum + point;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(sum / count as f64)
    }
}

impl Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, rhs: f64) -> Point2D {
        Point2D::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Point2D {
    type Output = Point2D;

    fn div(self, rhs: f64) -> Point2D {
        Point2D::new(self.x / rhs, self.y / rhs)
    }
}

impl fmt::Display for Point2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_wraps_negative_angles() {
        assert_eq!(Point2D::new(1.0, 0.0).direction(), 0.0);
        assert!((Point2D::new(0.0, 1.0).direction() - 90.0).abs() < 1e-9);
        assert!((Point2D::new(0.0, -1.0).direction() - 270.0).abs() < 1e-9);

        let west = Point2D::new(-1.0, 0.0).direction();
        assert!((0.0..360.0).contains(&west));
        assert!((west - 180.0).abs() < 1e-9);
    }

    #[test]
    fn direction_of_zero_vector_is_zero() {
        assert_eq!(Point2D::ORIGIN.direction(), 0.0);
    }

    #[test]
    fn tiny_negative_angle_stays_below_360() {
        let almost_east = Point2D::new(1.0, -1e-18);
        let angle = almost_east.direction();
        assert!((0.0..360.0).contains(&angle));
    }

    #[test]
    fn subtraction_and_magnitude() {
        let delta = Point2D::new(0.9, 0.5) - Point2D::new(0.6, 0.1);
        assert!((delta.magnitude() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mean_of_points() {
        let mean = Point2D::mean([Point2D::new(0.2, 0.4), Point2D::new(0.4, 0.6)]).unwrap();
        assert!((mean.x - 0.3).abs() < 1e-9);
        assert!((mean.y - 0.5).abs() < 1e-9);
        assert!(Point2D::mean(Vec::new()).is_none());
    }
}
