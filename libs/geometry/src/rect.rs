//! Axis-aligned rectangles.

use serde::{Deserialize, Serialize};

use crate::bbox::Bbox;
use crate::point::Point;
use crate::transform::{Transform, Transformation};

/// An axis-aligned rectangle, specified by lower-left and upper-right corners.
///
/// Zero-area rectangles are valid and contain exactly their boundary points.
#[derive(
    Debug, Default, Copy, Clone, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Rect {
    /// The lower-left corner.
    p0: Point,
    /// The upper-right corner.
    p1: Point,
}

impl Rect {
    /// Creates a new rectangle from the given opposite corner points.
    ///
    /// The corners are sorted, so any pair of opposite corners may be given.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let rect = Rect::new(Point::new(30, 20), Point::new(15, 40));
    /// assert_eq!(rect, Rect::from_sides(15, 20, 30, 40));
    /// ```
    #[inline]
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a rectangle from all 4 sides (left, bottom, right, top).
    ///
    /// # Panics
    ///
    /// This method panics if `left > right` or if `bot > top`.
    #[inline]
    pub fn from_sides(left: i64, bot: i64, right: i64, top: i64) -> Self {
        assert!(
            left <= right,
            "Rect::from_sides requires that left ({}) <= right ({})",
            left,
            right
        );
        assert!(
            bot <= top,
            "Rect::from_sides requires that bot ({}) <= top ({})",
            bot,
            top
        );
        Self {
            p0: Point::new(left, bot),
            p1: Point::new(right, top),
        }
    }

    /// Creates a rectangle from all 4 sides, returning `None` if the
    /// sides describe an empty box.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// assert_eq!(Rect::from_sides_option(10, 20, 0, 40), None);
    /// ```
    #[inline]
    pub fn from_sides_option(left: i64, bot: i64, right: i64, top: i64) -> Option<Self> {
        if left > right || bot > top {
            None
        } else {
            Some(Self::from_sides(left, bot, right, top))
        }
    }

    /// Creates a zero-area rectangle containing the given point.
    #[inline]
    pub const fn from_point(p: Point) -> Self {
        Self { p0: p, p1: p }
    }

    /// Creates a rectangle of the given width and height centered on `center`.
    ///
    /// Odd dimensions are rounded down on the lower/left side.
    pub fn from_center(center: Point, width: i64, height: i64) -> Self {
        let (hw, hh) = (width.abs() / 2, height.abs() / 2);
        Self::from_sides(
            center.x - hw,
            center.y - hh,
            center.x - hw + width.abs(),
            center.y - hh + height.abs(),
        )
    }

    /// The left edge coordinate.
    #[inline]
    pub const fn left(&self) -> i64 {
        self.p0.x
    }

    /// The bottom edge coordinate.
    #[inline]
    pub const fn bot(&self) -> i64 {
        self.p0.y
    }

    /// The right edge coordinate.
    #[inline]
    pub const fn right(&self) -> i64 {
        self.p1.x
    }

    /// The top edge coordinate.
    #[inline]
    pub const fn top(&self) -> i64 {
        self.p1.y
    }

    /// The lower-left corner.
    #[inline]
    pub const fn lower_left(&self) -> Point {
        self.p0
    }

    /// The upper-right corner.
    #[inline]
    pub const fn upper_right(&self) -> Point {
        self.p1
    }

    /// The horizontal extent of the rectangle.
    #[inline]
    pub const fn width(&self) -> i64 {
        self.p1.x - self.p0.x
    }

    /// The vertical extent of the rectangle.
    #[inline]
    pub const fn height(&self) -> i64 {
        self.p1.y - self.p0.y
    }

    /// The area of the rectangle.
    #[inline]
    pub const fn area(&self) -> i64 {
        self.width() * self.height()
    }

    /// The center of the rectangle, rounded down to integer coordinates.
    #[inline]
    pub const fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }

    /// Returns `true` if `other` lies entirely within `self`.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let outer = Rect::from_sides(0, 0, 100, 100);
    /// assert!(outer.contains(&Rect::from_sides(0, 10, 100, 20)));
    /// assert!(!outer.contains(&Rect::from_sides(-1, 10, 100, 20)));
    /// ```
    #[inline]
    pub fn contains(&self, other: &Rect) -> bool {
        self.p0.x <= other.p0.x
            && self.p0.y <= other.p0.y
            && other.p1.x <= self.p1.x
            && other.p1.y <= self.p1.y
    }

    /// Returns `true` if `p` lies inside or on the boundary of `self`.
    #[inline]
    pub fn contains_point(&self, p: Point) -> bool {
        self.p0.x <= p.x && p.x <= self.p1.x && self.p0.y <= p.y && p.y <= self.p1.y
    }

    /// Returns `true` if the two rectangles share at least one point.
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }

    /// The overlap of two rectangles, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        Rect::from_sides_option(
            self.left().max(other.left()),
            self.bot().max(other.bot()),
            self.right().min(other.right()),
            self.top().min(other.top()),
        )
    }

    /// The smallest rectangle containing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }

    /// Returns `true` if `other` reaches one of the extremal coordinates of `self`.
    ///
    /// A bounding box that is constrained by a region may shrink when that
    /// region is removed, so such a box must be recomputed.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let bbox = Rect::from_sides(0, 0, 100, 100);
    /// assert!(bbox.is_constrained_by(&Rect::from_sides(90, 40, 100, 60)));
    /// assert!(!bbox.is_constrained_by(&Rect::from_sides(10, 10, 20, 20)));
    /// ```
    #[inline]
    pub fn is_constrained_by(&self, other: &Rect) -> bool {
        self.left() == other.left()
            || self.bot() == other.bot()
            || self.right() == other.right()
            || self.top() == other.top()
    }

    /// Returns this rectangle translated by `(dx, dy)`.
    #[inline]
    pub fn translated(&self, dx: i64, dy: i64) -> Self {
        Self {
            p0: self.p0.translated(dx, dy),
            p1: self.p1.translated(dx, dy),
        }
    }

    /// Returns this rectangle grown by `amount` on every side.
    ///
    /// Negative amounts shrink the rectangle, returning `None` if it collapses.
    pub fn inflated(&self, amount: i64) -> Option<Self> {
        Rect::from_sides_option(
            self.left() - amount,
            self.bot() - amount,
            self.right() + amount,
            self.top() + amount,
        )
    }
}

impl Bbox for Rect {
    #[inline]
    fn bbox(&self) -> Option<Rect> {
        Some(*self)
    }
}

impl Transform for Rect {
    fn transform(self, trans: Transformation) -> Self {
        Rect::new(trans.apply(self.p0), trans.apply(self.p1))
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} {} {}]",
            self.left(),
            self.bot(),
            self.right(),
            self.top()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::NamedOrientation;

    #[test]
    fn union_covers_both() {
        let a = Rect::from_sides(0, 0, 10, 10);
        let b = Rect::from_sides(-5, 3, 4, 20);
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u, Rect::from_sides(-5, 0, 10, 20));
    }

    #[test]
    fn intersection_of_disjoint_rects_is_empty() {
        let a = Rect::from_sides(0, 0, 10, 10);
        let b = Rect::from_sides(11, 0, 20, 10);
        assert_eq!(a.intersection(&b), None);
        assert!(!a.intersects(&b));
        let c = Rect::from_sides(10, 10, 20, 20);
        assert_eq!(
            a.intersection(&c),
            Some(Rect::from_point(Point::new(10, 10)))
        );
    }

    #[test]
    fn transformed_rect_is_normalized() {
        let r = Rect::from_sides(0, 0, 10, 20);
        let t = Transformation::from_offset_and_orientation(
            Point::new(100, 0),
            NamedOrientation::R90,
        );
        assert_eq!(r.transform(t), Rect::from_sides(80, 0, 100, 10));
    }

    #[test]
    fn centered_rect_keeps_dimensions() {
        let r = Rect::from_center(Point::new(0, 0), 5, 4);
        assert_eq!(r.width(), 5);
        assert_eq!(r.height(), 4);
        assert_eq!(r.area(), 20);
    }
}
