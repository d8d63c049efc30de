//! An in-memory hierarchical cell database.
//!
//! Designs are hierarchies of reusable [`Cell`]s placed by [`Instance`]s and
//! connected by [`Net`]s. Every entity lives in an arena owned by a single
//! [`Database`]; handles such as [`CellId`] are cheap `Copy` keys.
//!
//! The database keeps three kinds of derived state consistent under mutation:
//!
//! * cached bounding boxes, pushed up the instance hierarchy by
//!   `fit`/`unfit` so an ancestor's cache is either valid or empty;
//! * hash-consed instantiation [`Path`]s, so equal instance chains share one
//!   canonical [`SharedPathId`];
//! * spatial indices ([`quadtree::QuadTree`]) holding the placed geometry of
//!   every materialized cell.
//!
//! Bulk rewrites ([`Database::flatten_nets`], [`Database::uniquify`],
//! [`Database::create_routing_pad_rings`]) run inside an update session so
//! observers see a single change.
//!
//! # Examples
//!
//! ```
//! # use celldb::*;
//! # use geometry::prelude::*;
//! let mut db = Database::new();
//! let lib = db.create_library(None, "work").unwrap();
//! let inv = db.create_cell(Some(lib), "INV").unwrap();
//! let top = db.create_cell(Some(lib), "TOP").unwrap();
//! let i1 = db
//!     .create_instance(top, "i1", inv, Transformation::identity(), PlacementStatus::Placed)
//!     .unwrap();
//! assert_eq!(db.instance_by_name(top, "i1"), Some(i1));
//! assert!(db.is_unique(inv));
//! ```
#![warn(missing_docs)]

pub mod cell;
pub mod component;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flatten;
pub mod hypernet;
pub mod instance;
pub mod intrusive;
pub mod layer;
pub mod library;
pub mod name;
pub mod net;
pub mod observer;
pub mod occurrence;
pub mod path;
pub mod quadtree;
pub mod session;
pub mod storage;
pub mod uniquify;

#[cfg(test)]
pub(crate) mod tests;

use slotmap::{new_key_type, SlotMap};

pub use cell::{Cell, CellFlags};
pub use component::{Component, ComponentKind, Marker, Rubber};
pub use config::DbConfig;
pub use diagnostics::{Cause, Issue, IssueSet, Severity};
pub use error::{Error, Result};
pub use flatten::FlattenFlags;
pub use hypernet::HyperNet;
pub use instance::{Instance, PlacementStatus};
pub use layer::{Layer, LayerMask};
pub use library::Library;
pub use name::Name;
pub use net::{Net, NetDirection, NetType};
pub use observer::{CellObserver, ObserverFlags};
pub use occurrence::{EntityId, Occurrence};
pub use path::{Path, SharedPath};
pub use storage::{ExtensionSlice, Slice};
pub use uniquify::UniquifyRelation;

use intrusive::IntrusiveMap;
use session::UpdateSession;
use storage::SpatialStorage;

new_key_type! {
    /// A library identifier.
    pub struct LibraryId;
    /// A cell identifier.
    pub struct CellId;
    /// An instance identifier.
    pub struct InstanceId;
    /// A net identifier.
    pub struct NetId;
    /// A component identifier.
    pub struct ComponentId;
    /// A rubber identifier.
    pub struct RubberId;
    /// A marker identifier.
    pub struct MarkerId;
    /// A layer identifier.
    pub struct LayerId;
    /// A layer slice identifier.
    pub struct SliceId;
    /// An extension slice identifier.
    pub struct ExtensionSliceId;
    /// A shared path identifier.
    pub struct SharedPathId;
    /// A uniquification relation identifier.
    pub struct UniquifyRelationId;
    pub(crate) struct StorageId;
}

/// A placed object that can be inserted in a spatial index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GoId {
    /// An instance, indexed in its owner cell's quad-tree.
    Instance(InstanceId),
    /// A layered component, indexed in the slice of its layer.
    Component(ComponentId),
    /// A marker, indexed in its cell's quad-tree.
    Marker(MarkerId),
}

/// The hierarchical database.
///
/// Owns every library, cell, instance, net and component, along with the
/// canonical shared paths and the spatial storage of each cell.
pub struct Database {
    pub(crate) config: DbConfig,
    pub(crate) libraries: SlotMap<LibraryId, Library>,
    pub(crate) root_libraries: IntrusiveMap<Name, LibraryId>,
    pub(crate) cells: SlotMap<CellId, Cell>,
    pub(crate) instances: SlotMap<InstanceId, Instance>,
    pub(crate) nets: SlotMap<NetId, Net>,
    pub(crate) components: SlotMap<ComponentId, Component>,
    pub(crate) rubbers: SlotMap<RubberId, Rubber>,
    pub(crate) markers: SlotMap<MarkerId, Marker>,
    pub(crate) layers: SlotMap<LayerId, Layer>,
    pub(crate) layers_by_name: IntrusiveMap<Name, LayerId>,
    pub(crate) layers_by_mask: IntrusiveMap<LayerMask, LayerId>,
    pub(crate) storages: SlotMap<StorageId, SpatialStorage>,
    pub(crate) slices: SlotMap<SliceId, Slice>,
    pub(crate) extension_slices: SlotMap<ExtensionSliceId, ExtensionSlice>,
    pub(crate) shared_paths: SlotMap<SharedPathId, SharedPath>,
    pub(crate) uniquify_relations: SlotMap<UniquifyRelationId, UniquifyRelation>,
    pub(crate) session: UpdateSession,
    pub(crate) issues: IssueSet,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DbConfig::default())
    }

    /// Creates an empty database with the given configuration.
    pub fn with_config(config: DbConfig) -> Self {
        let buckets = config.intrusive_initial_buckets;
        Self {
            config,
            libraries: SlotMap::with_key(),
            root_libraries: IntrusiveMap::new(buckets),
            cells: SlotMap::with_key(),
            instances: SlotMap::with_key(),
            nets: SlotMap::with_key(),
            components: SlotMap::with_key(),
            rubbers: SlotMap::with_key(),
            markers: SlotMap::with_key(),
            layers: SlotMap::with_key(),
            layers_by_name: IntrusiveMap::new(buckets),
            layers_by_mask: IntrusiveMap::new(buckets),
            storages: SlotMap::with_key(),
            slices: SlotMap::with_key(),
            extension_slices: SlotMap::with_key(),
            shared_paths: SlotMap::with_key(),
            uniquify_relations: SlotMap::with_key(),
            session: UpdateSession::default(),
            issues: IssueSet::default(),
        }
    }

    /// The configuration of this database.
    #[inline]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Diagnostics raised by recoverable conditions since the last
    /// [`Database::take_issues`].
    #[inline]
    pub fn issues(&self) -> &IssueSet {
        &self.issues
    }

    /// Removes and returns the accumulated diagnostics.
    pub fn take_issues(&mut self) -> IssueSet {
        std::mem::take(&mut self.issues)
    }

    pub(crate) fn report(&mut self, cause: Cause, severity: Severity) {
        self.issues.add(Issue::new_and_log(cause, severity));
    }

    #[inline]
    pub(crate) fn buckets(&self) -> usize {
        self.config.intrusive_initial_buckets
    }
}
