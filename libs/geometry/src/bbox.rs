//! Axis-aligned rectangular bounding boxes.

use impl_trait_for_tuples::impl_for_tuples;

use crate::rect::Rect;

/// A geometric shape that has a bounding box.
///
/// # Examples
///
/// ```
/// # use geometry::prelude::*;
/// let rect = Rect::from_sides(0, 0, 100, 200);
/// assert_eq!(rect.bbox(), Some(Rect::from_sides(0, 0, 100, 200)));
/// ```
pub trait Bbox {
    /// Computes the axis-aligned rectangular bounding box.
    ///
    /// If empty, this method should return `None`.
    fn bbox(&self) -> Option<Rect>;
}

impl<T> Bbox for &T
where
    T: Bbox,
{
    fn bbox(&self) -> Option<Rect> {
        T::bbox(*self)
    }
}

#[impl_for_tuples(16)]
impl Bbox for TupleIdentifier {
    #[allow(clippy::let_and_return)]
    fn bbox(&self) -> Option<Rect> {
        let mut bbox = None;
        for_tuples!( #( bbox = bbox.bounding_union(&TupleIdentifier.bbox()); )* );
        bbox
    }
}

impl<T: Bbox> Bbox for Vec<T> {
    fn bbox(&self) -> Option<Rect> {
        let mut bbox = None;
        for item in self {
            bbox = bbox.bounding_union(&item.bbox());
        }
        bbox
    }
}

impl Bbox for Option<Rect> {
    fn bbox(&self) -> Option<Rect> {
        *self
    }
}

/// Computes the smallest box enclosing two possibly-empty boxes.
pub trait BoundingUnion<T> {
    /// The result of the union.
    type Output;

    /// Returns the union of `self` and `other`.
    fn bounding_union(&self, other: &T) -> Self::Output;
}

impl BoundingUnion<Option<Rect>> for Option<Rect> {
    type Output = Option<Rect>;

    fn bounding_union(&self, other: &Option<Rect>) -> Self::Output {
        match (self, other) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (Some(a), None) | (None, Some(a)) => Some(*a),
            (None, None) => None,
        }
    }
}

impl BoundingUnion<Rect> for Option<Rect> {
    type Output = Rect;

    fn bounding_union(&self, other: &Rect) -> Self::Output {
        match self {
            Some(a) => a.union(other),
            None => *other,
        }
    }
}
