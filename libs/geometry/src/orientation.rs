//! Manhattan orientations of instances.

use serde::{Deserialize, Serialize};

use crate::transform::TransformationMatrix;

/// A named orientation.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NamedOrientation {
    /// No rotations or reflections.
    #[default]
    R0,
    /// Rotate 90 degrees counter-clockwise.
    R90,
    /// Rotate 180 degrees counter-clockwise.
    R180,
    /// Rotate 270 degrees counter-clockwise.
    R270,
    /// Reflect vertically (ie. about the x-axis).
    ReflectVert,
    /// Reflect horizontally (ie. about the y-axis).
    ReflectHoriz,
    /// Flip across the line y = x.
    FlipYx,
    /// Flip across the line y = -x.
    FlipMinusYx,
}

impl NamedOrientation {
    /// Returns a slice of all 8 Manhattan orientations.
    pub fn all() -> [Self; 8] {
        use NamedOrientation::*;
        [
            R0,
            R90,
            R180,
            R270,
            ReflectVert,
            ReflectHoriz,
            FlipYx,
            FlipMinusYx,
        ]
    }

    /// Converts this named orientation into an [`Orientation`].
    #[inline]
    pub fn into_orientation(self) -> Orientation {
        Orientation::from(self)
    }

    pub(crate) fn matrix(self) -> [[i8; 2]; 2] {
        use NamedOrientation::*;
        match self {
            R0 => [[1, 0], [0, 1]],
            R90 => [[0, -1], [1, 0]],
            R180 => [[-1, 0], [0, -1]],
            R270 => [[0, 1], [-1, 0]],
            ReflectVert => [[1, 0], [0, -1]],
            ReflectHoriz => [[-1, 0], [0, 1]],
            FlipYx => [[0, 1], [1, 0]],
            FlipMinusYx => [[0, -1], [-1, 0]],
        }
    }
}

/// An orientation of a geometric object.
///
/// Captures reflection and rotation, but not position.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Orientation(pub(crate) TransformationMatrix);

impl Orientation {
    /// Returns the identity orientation.
    #[inline]
    pub fn identity() -> Self {
        Self(TransformationMatrix::identity())
    }

    /// Returns the named orientation equivalent to this orientation.
    pub fn name(&self) -> NamedOrientation {
        NamedOrientation::all()
            .into_iter()
            .find(|n| n.matrix() == self.0 .0)
            .unwrap_or_default()
    }

    /// Applies `o` after this orientation.
    pub fn apply(self, o: impl Into<Orientation>) -> Self {
        Self(o.into().0 * self.0)
    }
}

impl From<NamedOrientation> for Orientation {
    fn from(value: NamedOrientation) -> Self {
        Self(TransformationMatrix(value.matrix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_orientations_round_trip_through_matrices() {
        for name in NamedOrientation::all() {
            assert_eq!(name.into_orientation().name(), name);
        }
    }

    #[test]
    fn two_quarter_turns_make_a_half_turn() {
        let o = Orientation::from(NamedOrientation::R90).apply(NamedOrientation::R90);
        assert_eq!(o.name(), NamedOrientation::R180);
    }
}
