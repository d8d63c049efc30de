//! 2-D Manhattan geometry used by the hierarchical cell database.
//!
//! All coordinates are database units stored as `i64`.
//! An empty box is represented by `Option<Rect>::None`; every [`Rect`]
//! that exists contains at least one point.
//!
//! # Examples
//!
//! ```
//! # use geometry::prelude::*;
//! let rect = Rect::from_sides(10, 20, 30, 40);
//! let trans = Transformation::translate(5, 5);
//! assert_eq!(rect.transform(trans), Rect::from_sides(15, 25, 35, 45));
//! ```
#![warn(missing_docs)]

extern crate self as geometry;

pub mod bbox;
pub mod orientation;
pub mod point;
pub mod prelude;
pub mod rect;
pub mod transform;
