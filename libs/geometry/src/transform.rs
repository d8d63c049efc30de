//! Transformation types and traits.

use serde::{Deserialize, Serialize};

use crate::orientation::{NamedOrientation, Orientation};
use crate::point::Point;

/// A transformation representing a Manhattan translation, rotation, and/or reflection of geometry.
///
/// Points are first multiplied by the orientation matrix, then translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transformation {
    /// The transformation matrix.
    pub(crate) mat: TransformationMatrix,
    /// The x-y translation applied after the transformation.
    pub(crate) b: Point,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

/// A unitary 2x2 integer matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformationMatrix(pub(crate) [[i8; 2]; 2]);

impl TransformationMatrix {
    /// Returns the identity matrix.
    pub fn identity() -> Self {
        Self([[1, 0], [0, 1]])
    }

    /// Returns the inverse of this matrix.
    ///
    /// Manhattan matrices are orthogonal, so the inverse is the transpose.
    pub fn inverse(&self) -> Self {
        let m = self.0;
        Self([[m[0][0], m[1][0]], [m[0][1], m[1][1]]])
    }
}

impl Default for TransformationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

fn matmul_i8(a: &[[i8; 2]; 2], b: &[[i8; 2]; 2]) -> [[i8; 2]; 2] {
    let mut out = [[0; 2]; 2];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}

impl std::ops::Mul<TransformationMatrix> for TransformationMatrix {
    type Output = Self;
    fn mul(self, rhs: TransformationMatrix) -> Self::Output {
        Self(matmul_i8(&self.0, &rhs.0))
    }
}

impl std::ops::Mul<Point> for TransformationMatrix {
    type Output = Point;
    fn mul(self, rhs: Point) -> Self::Output {
        let m = self.0;
        Point::new(
            m[0][0] as i64 * rhs.x + m[0][1] as i64 * rhs.y,
            m[1][0] as i64 * rhs.x + m[1][1] as i64 * rhs.y,
        )
    }
}

impl Transformation {
    /// Returns the identity transform, leaving any transformed object unmodified.
    pub fn identity() -> Self {
        Self {
            mat: TransformationMatrix::identity(),
            b: Point::zero(),
        }
    }

    /// Returns a translation by `(x,y)`.
    pub fn translate(x: i64, y: i64) -> Self {
        Self {
            mat: TransformationMatrix::identity(),
            b: Point::new(x, y),
        }
    }

    /// Creates a transform from only an offset.
    pub fn from_offset(offset: Point) -> Self {
        Self {
            mat: TransformationMatrix::identity(),
            b: offset,
        }
    }

    /// Creates a transform from an offset and [`Orientation`].
    pub fn from_offset_and_orientation(offset: Point, orientation: impl Into<Orientation>) -> Self {
        Self {
            mat: orientation.into().0,
            b: offset,
        }
    }

    /// Create a new [`Transformation`] that is the cascade of `parent` and `child`.
    ///
    /// "Parents" and "children" refer to typical layout-instance hierarchies,
    /// in which each layer of instance has a nested set of transformations relative to its top-level parent.
    ///
    /// Note this operation *is not* commutative.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let parent = Transformation::from_offset_and_orientation(
    ///     Point::new(1, 1),
    ///     NamedOrientation::ReflectVert,
    /// );
    /// let child = Transformation::translate(1, 1);
    /// let cascaded = Transformation::cascade(parent, child);
    /// assert_eq!(cascaded.apply(Point::new(1, 1)), Point::new(3, -1));
    /// ```
    pub fn cascade(parent: Transformation, child: Transformation) -> Transformation {
        let mut b = parent.mat * child.b;
        b += parent.b;
        let mat = parent.mat * child.mat;
        Self { mat, b }
    }

    /// The point representing the translation of this transformation.
    #[inline]
    pub fn offset_point(&self) -> Point {
        self.b
    }

    /// Returns an [`Orientation`] corresponding to this transformation.
    #[inline]
    pub fn orientation(&self) -> Orientation {
        Orientation(self.mat)
    }

    /// Returns the named orientation of this transformation.
    #[inline]
    pub fn named_orientation(&self) -> NamedOrientation {
        self.orientation().name()
    }

    /// Returns `true` if this transformation is the identity.
    #[inline]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Returns this transformation with its offset shifted by `(dx, dy)`.
    pub fn translated(&self, dx: i64, dy: i64) -> Self {
        Self {
            mat: self.mat,
            b: self.b.translated(dx, dy),
        }
    }

    /// Applies this transformation to a point.
    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        self.mat * p + self.b
    }

    /// Returns the inverse [`Transformation`] of `self`.
    ///
    /// ```
    /// # use geometry::prelude::*;
    /// let trans = Transformation::from_offset_and_orientation(
    ///     Point::new(5, 10),
    ///     NamedOrientation::R90,
    /// );
    /// assert_eq!(
    ///     Transformation::cascade(trans.inv(), trans),
    ///     Transformation::identity()
    /// );
    /// ```
    pub fn inv(&self) -> Transformation {
        let inv = self.mat.inverse();
        let invb = inv * self.b;
        Self { mat: inv, b: -invb }
    }
}

impl From<NamedOrientation> for Transformation {
    fn from(value: NamedOrientation) -> Self {
        Self::from_offset_and_orientation(Point::zero(), value)
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{:?} {}>", self.named_orientation(), self.b)
    }
}

/// A trait for specifying how an object is changed by a [`Transformation`].
pub trait Transform: Sized {
    /// Applies the matrix-vector [`Transformation`] `trans` to this object.
    fn transform(self, trans: Transformation) -> Self;
}

impl<T: Transform> Transform for Option<T> {
    fn transform(self, trans: Transformation) -> Self {
        self.map(|t| t.transform(trans))
    }
}
