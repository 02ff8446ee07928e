//! Database-unit geometry.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A point in database units.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    #[inline]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn zero() -> Self {
        Self { x: 0, y: 0 }
    }
}

impl From<(i64, i64)> for Point {
    fn from(value: (i64, i64)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned rectangle with `p0` at the lower left corner.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rect {
    p0: Point,
    p1: Point,
}

impl Rect {
    /// Creates the rectangle spanned by two opposite corners, in any order.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    #[inline]
    pub fn from_coords(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[inline]
    pub fn p0(&self) -> Point {
        self.p0
    }

    #[inline]
    pub fn p1(&self) -> Point {
        self.p1
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// Whether `pt` lies inside or on the boundary of the rectangle.
    #[inline]
    pub fn contains(&self, pt: Point) -> bool {
        self.p0.x <= pt.x && pt.x <= self.p1.x && self.p0.y <= pt.y && pt.y <= self.p1.y
    }
}

/// Placement orientation of an instance.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    R0,
    R90,
    R180,
    R270,
    MY,
    MYR90,
    MX,
    MXR90,
}

impl Orientation {
    pub(crate) const ALL: [Orientation; 8] = [
        Self::R0,
        Self::R90,
        Self::R180,
        Self::R270,
        Self::MY,
        Self::MYR90,
        Self::MX,
        Self::MXR90,
    ];

    #[inline]
    pub(crate) fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_normalizes_corners() {
        let r = Rect::from_coords(10, 20, 0, 5);
        assert_eq!(r.p0(), Point::new(0, 5));
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 15);
        assert!(r.contains(Point::new(10, 20)));
        assert!(!r.contains(Point::new(11, 20)));
    }

    #[test]
    fn orientation_codes() {
        for o in Orientation::ALL {
            assert_eq!(Orientation::from_code(o.code()), Some(o));
        }
        assert_eq!(Orientation::from_code(8), None);
    }
}
