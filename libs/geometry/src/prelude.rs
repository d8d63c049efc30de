//! An import prelude that re-exports commonly used items.

pub use crate::bbox::{Bbox, BoundingUnion};
pub use crate::orientation::{NamedOrientation, Orientation};
pub use crate::point::Point;
pub use crate::rect::Rect;
pub use crate::transform::{Transform, Transformation};
