//! Cells: the reusable blocks of the hierarchy.

use std::collections::HashSet;
use std::rc::Weak;

use bitflags::bitflags;
use geometry::bbox::BoundingUnion;
use geometry::rect::Rect;
use geometry::transform::Transform;
use indexmap::{IndexMap, IndexSet};
use tracing::{event, Level};

use crate::error::{Error, Result};
use crate::intrusive::{IntrusiveMap, IntrusiveSet};
use crate::name::Name;
use crate::observer::{CellObserver, ObserverFlags};
use crate::occurrence::EntityId;
use crate::storage::SpatialStorage;
use crate::{
    CellId, Database, ExtensionSliceId, InstanceId, LibraryId, MarkerId, NetId, StorageId,
    UniquifyRelationId,
};

bitflags! {
    /// State and role flags of a cell.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CellFlags: u32 {
        /// The cell is a leaf of the netlist hierarchy.
        const TERMINAL          = 1 << 0;
        /// The cell is an I/O pad.
        const PAD               = 1 << 1;
        /// Net flattening stops at instances of this cell.
        const FLATTEN_LEAF      = 1 << 2;
        /// Nets have been flattened; deep-net lookups are valid.
        const FLATTENED_NETS    = 1 << 3;
        /// Every instance of the cell is placed.
        const PLACED            = 1 << 4;
        /// The cell is routed.
        const ROUTED            = 1 << 5;
        /// Placed objects of the cell are in its spatial storage.
        const MATERIALIZED      = 1 << 6;
        /// The cell shares the spatial storage of another cell.
        const MERGED_QUAD_TREE  = 1 << 7;
    }
}

/// A named, reusable design block owned by a library.
#[derive(Debug)]
pub struct Cell {
    pub(crate) name: Name,
    pub(crate) library: LibraryId,
    pub(crate) abutment_box: Option<Rect>,
    /// `None` until computed, and again once invalidated.
    pub(crate) bounding_box: std::cell::Cell<Option<Rect>>,
    pub(crate) instances: IntrusiveMap<Name, InstanceId>,
    pub(crate) slave_instances: IntrusiveSet<InstanceId>,
    pub(crate) nets: IntrusiveMap<Name, NetId>,
    pub(crate) net_aliases: IndexMap<Name, NetId>,
    pub(crate) markers: IntrusiveSet<MarkerId>,
    pub(crate) storage: StorageId,
    pub(crate) extension_slices: IntrusiveMap<Name, ExtensionSliceId>,
    pub(crate) slave_entities: IndexMap<InstanceId, IndexSet<EntityId>>,
    pub(crate) flags: CellFlags,
    pub(crate) observers: Vec<Weak<dyn CellObserver>>,
    pub(crate) uniquify: Option<UniquifyRelationId>,
}

impl Cell {
    /// The cell name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The library owning the cell.
    #[inline]
    pub fn library(&self) -> LibraryId {
        self.library
    }

    /// The design-specified footprint of the cell.
    #[inline]
    pub fn abutment_box(&self) -> Option<Rect> {
        self.abutment_box
    }

    /// The cell flags.
    #[inline]
    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    /// Returns `true` if the cell is a terminal of the netlist hierarchy.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.flags.contains(CellFlags::TERMINAL)
    }

    /// Returns `true` if net flattening stops at this cell.
    #[inline]
    pub fn is_flatten_leaf(&self) -> bool {
        self.flags.contains(CellFlags::FLATTEN_LEAF)
    }

    /// Returns `true` if the cell has no instances.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.instances.is_empty()
    }

    /// Returns `true` if the cell is placed by fewer than two instances.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.slave_instances.len() < 2
    }

    /// The cell's instances.
    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.iter()
    }

    /// Instances elsewhere that place this cell.
    pub fn slave_instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.slave_instances.iter()
    }

    /// The cell's nets.
    pub fn nets(&self) -> impl Iterator<Item = NetId> + '_ {
        self.nets.iter()
    }

    /// The cell's markers.
    pub fn markers(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.iter()
    }

    /// The cell's extension slices.
    pub fn extension_slices(&self) -> impl Iterator<Item = ExtensionSliceId> + '_ {
        self.extension_slices.iter()
    }

    /// The number of instances in the cell.
    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// The number of instances placing this cell.
    #[inline]
    pub fn slave_instance_count(&self) -> usize {
        self.slave_instances.len()
    }

    /// The number of nets in the cell.
    #[inline]
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }
}

impl Database {
    pub(crate) fn check_cell(&self, id: CellId) -> Result<&Cell> {
        self.cells.get(id).ok_or(Error::StaleId("cell"))
    }

    /// Returns the cell with the given ID.
    #[inline]
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Returns the cell with the given ID, or `None` if it was destroyed.
    #[inline]
    pub fn try_cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    /// Creates a cell named `name` in `library`.
    ///
    /// Fails if the library is missing, the name is empty, or the library
    /// already holds a cell with this name.
    pub fn create_cell(&mut self, library: Option<LibraryId>, name: impl Into<Name>) -> Result<CellId> {
        let library = library.ok_or(Error::UnknownLibrary)?;
        let lib = self.libraries.get(library).ok_or(Error::UnknownLibrary)?;
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "cell" });
        }
        if lib.cells.contains_key(&name) {
            return Err(Error::DuplicateCell {
                name,
                library: lib.name,
            });
        }

        let buckets = self.buckets();
        let threshold = self.config.quadtree_split_threshold;
        let storage = self
            .storages
            .insert(SpatialStorage::new(CellId::default(), threshold, buckets));
        let id = self.cells.insert(Cell {
            name,
            library,
            abutment_box: None,
            bounding_box: std::cell::Cell::new(None),
            instances: IntrusiveMap::new(buckets),
            slave_instances: IntrusiveSet::new(buckets),
            nets: IntrusiveMap::new(buckets),
            net_aliases: IndexMap::new(),
            markers: IntrusiveSet::new(buckets),
            storage,
            extension_slices: IntrusiveMap::new(buckets),
            slave_entities: IndexMap::new(),
            flags: CellFlags::MATERIALIZED,
            observers: Vec::new(),
            uniquify: None,
        });
        self.storages[storage].owner = id;
        let _ = self.libraries[library].cells.insert(name, id);
        event!(Level::TRACE, cell = %name, "created cell");
        Ok(id)
    }

    /// Renames a cell, re-keying it in its library.
    pub fn set_cell_name(&mut self, cell: CellId, name: impl Into<Name>) -> Result<()> {
        let name = name.into();
        let c = self.check_cell(cell)?;
        if name == c.name {
            return Ok(());
        }
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "cell" });
        }
        let lib = &self.libraries[c.library];
        if lib.cells.contains_key(&name) {
            return Err(Error::DuplicateCell {
                name,
                library: lib.name,
            });
        }
        let library = c.library;
        self.with_session(|db| {
            db.libraries[library].cells.remove(cell);
            db.cells[cell].name = name;
            let _ = db.libraries[library].cells.insert(name, cell);
            db.touch(cell);
            Ok(())
        })
    }

    /// Sets flags on a cell.
    pub fn set_cell_flags(&mut self, cell: CellId, flags: CellFlags) -> Result<()> {
        self.check_cell(cell)?;
        self.cells[cell].flags.insert(flags);
        Ok(())
    }

    /// Clears flags of a cell.
    pub fn clear_cell_flags(&mut self, cell: CellId, flags: CellFlags) -> Result<()> {
        self.check_cell(cell)?;
        self.cells[cell].flags.remove(flags);
        Ok(())
    }

    /// Marks a cell as a terminal of the netlist hierarchy.
    pub fn set_terminal(&mut self, cell: CellId, terminal: bool) -> Result<()> {
        if terminal {
            self.set_cell_flags(cell, CellFlags::TERMINAL)
        } else {
            self.clear_cell_flags(cell, CellFlags::TERMINAL)
        }
    }

    /// Looks up an instance of `cell` by name.
    pub fn instance_by_name(&self, cell: CellId, name: impl Into<Name>) -> Option<InstanceId> {
        self.cells.get(cell)?.instances.get(&name.into())
    }

    /// Looks up a net of `cell` by name, falling back to net aliases.
    pub fn net_by_name(&self, cell: CellId, name: impl Into<Name>) -> Option<NetId> {
        let c = self.cells.get(cell)?;
        let name = name.into();
        c.nets
            .get(&name)
            .or_else(|| c.net_aliases.get(&name).copied())
    }

    /// Returns `true` if `cell` has no instances.
    pub fn is_leaf(&self, cell: CellId) -> bool {
        self.cells[cell].is_leaf()
    }

    /// Returns `true` if `cell` is placed by fewer than two instances.
    pub fn is_unique(&self, cell: CellId) -> bool {
        self.cells[cell].is_unique()
    }

    /// Returns `true` if `caller` instantiates `cell`, directly or through
    /// any number of hierarchy levels.
    pub fn is_called_by(&self, cell: CellId, caller: CellId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![cell];
        while let Some(c) = stack.pop() {
            for inst in self.cells[c].slave_instances.iter() {
                let owner = self.instances[inst].cell;
                if owner == caller {
                    return true;
                }
                if visited.insert(owner) {
                    stack.push(owner);
                }
            }
        }
        false
    }

    /// The bounding box of `cell`: the union of its abutment box, its
    /// quad-tree and every layer slice.
    ///
    /// The result is cached until `fit`/`unfit` invalidate it.
    pub fn cell_bounding_box(&self, cell: CellId) -> Option<Rect> {
        let c = &self.cells[cell];
        if let Some(bbox) = c.bounding_box.get() {
            return Some(bbox);
        }
        let storage = &self.storages[c.storage];
        let mut bbox = c.abutment_box;
        bbox = bbox.bounding_union(&storage.quadtree.bounding_box());
        for slice in storage.slices.iter() {
            bbox = bbox.bounding_union(&self.slices[slice].quadtree.bounding_box());
        }
        c.bounding_box.set(bbox);
        bbox
    }

    /// The cached bounding box, without computing it.
    pub fn cached_bounding_box(&self, cell: CellId) -> Option<Rect> {
        self.cells[cell].bounding_box.get()
    }

    /// Grows cached bounding boxes to cover `rect`, walking up the hierarchy.
    /// Slave instances it marks stale are refreshed when the session closes.
    pub(crate) fn fit(&mut self, cell: CellId, rect: Option<Rect>) {
        debug_assert!(self.session.depth > 0, "fit outside an update session");
        let Some(rect) = rect else { return };
        let mut queue = vec![(cell, rect)];
        while let Some((cell, rect)) = queue.pop() {
            let c = &self.cells[cell];
            let cached = c.bounding_box.get();
            if cached.is_some_and(|bbox| bbox.contains(&rect)) {
                continue;
            }
            if let Some(bbox) = cached {
                c.bounding_box.set(Some(bbox.union(&rect)));
            }
            for inst in c.slave_instances.iter() {
                if !self.is_instance_materialized(inst) {
                    continue;
                }
                let i = &self.instances[inst];
                self.session.stale_instances.insert(inst);
                if cached.is_some() {
                    queue.push((i.cell, rect.transform(i.transformation)));
                }
            }
        }
    }

    /// Invalidates cached bounding boxes that `rect` may have defined,
    /// walking up the hierarchy.
    pub(crate) fn unfit(&mut self, cell: CellId, rect: Option<Rect>) {
        debug_assert!(self.session.depth > 0, "unfit outside an update session");
        let Some(rect) = rect else { return };
        let mut queue = vec![(cell, rect)];
        while let Some((cell, rect)) = queue.pop() {
            let c = &self.cells[cell];
            let cached = c.bounding_box.get();
            match cached {
                Some(bbox) if !bbox.is_constrained_by(&rect) => continue,
                Some(_) => c.bounding_box.set(None),
                None => {}
            }
            for inst in c.slave_instances.iter() {
                if !self.is_instance_materialized(inst) {
                    continue;
                }
                let i = &self.instances[inst];
                self.session.stale_instances.insert(inst);
                if cached.is_some() {
                    queue.push((i.cell, rect.transform(i.transformation)));
                }
            }
        }
    }

    /// Sets the abutment box of `cell`.
    ///
    /// Masters sharing the cell's quad-tree through an instance get the same
    /// abutment box.
    pub fn set_abutment_box(&mut self, cell: CellId, abutment_box: Option<Rect>) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| {
            db.set_abutment_box_inner(cell, abutment_box);
            Ok(())
        })
    }

    pub(crate) fn set_abutment_box_inner(&mut self, cell: CellId, abutment_box: Option<Rect>) {
        let old = self.cells[cell].abutment_box;
        if old != abutment_box {
            if let Some(old) = old {
                if abutment_box.map_or(true, |new| !new.contains(&old)) {
                    self.unfit(cell, Some(old));
                }
            }
            self.cells[cell].abutment_box = abutment_box;
            self.fit(cell, abutment_box);
            self.touch(cell);
        }
        for inst in self.cells[cell].instances.to_vec() {
            let master = self.instances[inst].master;
            if self.cells[master].flags.contains(CellFlags::MERGED_QUAD_TREE) {
                self.set_abutment_box_inner(master, abutment_box);
            }
        }
    }

    /// Destroys `cell` and everything it owns.
    ///
    /// Slave entities go first, then markers, the instances placing this
    /// cell, its own instances, its nets (after detaching their aliases), its
    /// slices and extension slices. Finally the cell leaves its library.
    pub fn destroy_cell(&mut self, cell: CellId) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| {
            db.destroy_cell_inner(cell);
            Ok(())
        })
    }

    pub(crate) fn destroy_cell_inner(&mut self, cell: CellId) {
        event!(Level::DEBUG, cell = %self.cells[cell].name, "destroying cell");
        self.notify(cell, ObserverFlags::CELL_DESTROYED);
        while let Some(entity) = self.next_slave_entity(cell, None) {
            self.destroy_entity(entity);
            self.remove_slave_entity(cell, entity);
        }
        for marker in self.cells[cell].markers.to_vec() {
            self.destroy_marker_inner(marker);
        }
        for inst in self.cells[cell].slave_instances.to_vec() {
            self.destroy_instance_inner(inst);
        }
        for inst in self.cells[cell].instances.to_vec() {
            self.destroy_instance_inner(inst);
        }
        for net in self.cells[cell].nets.to_vec() {
            self.clear_net_aliases(net);
            self.destroy_net_inner(net);
        }
        self.cells[cell].net_aliases.clear();
        for slice in self.cells[cell].extension_slices.to_vec() {
            self.destroy_extension_slice_inner(slice);
        }
        self.release_storage(cell);
        self.detach_uniquify_relation(cell);

        let library = self.cells[cell].library;
        if let Some(lib) = self.libraries.get_mut(library) {
            lib.cells.remove(cell);
        }
        self.session.touched.shift_remove(&cell);
        self.cells.remove(cell);
    }

    pub(crate) fn add_slave_entity(&mut self, cell: CellId, instance: InstanceId, entity: EntityId) {
        self.cells[cell]
            .slave_entities
            .entry(instance)
            .or_default()
            .insert(entity);
    }

    pub(crate) fn remove_slave_entity(&mut self, cell: CellId, entity: EntityId) {
        let Some(c) = self.cells.get_mut(cell) else {
            return;
        };
        c.slave_entities.retain(|_, entities| {
            entities.shift_remove(&entity);
            !entities.is_empty()
        });
    }

    /// The next slave entity of `cell`, restricted to those depending on `instance`.
    pub(crate) fn next_slave_entity(
        &self,
        cell: CellId,
        instance: Option<InstanceId>,
    ) -> Option<EntityId> {
        let c = self.cells.get(cell)?;
        match instance {
            Some(instance) => c.slave_entities.get(&instance)?.first().copied(),
            None => c.slave_entities.values().find_map(|s| s.first().copied()),
        }
    }

    /// Entities of `cell` that depend on `instance` and die with it.
    pub fn slave_entities(&self, cell: CellId, instance: InstanceId) -> Vec<EntityId> {
        self.cells[cell]
            .slave_entities
            .get(&instance)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn destroy_entity(&mut self, entity: EntityId) {
        match entity {
            EntityId::Net(net) if self.nets.contains_key(net) => self.destroy_net_inner(net),
            EntityId::Component(c) if self.components.contains_key(c) => {
                self.destroy_component_inner(c)
            }
            EntityId::Instance(i) if self.instances.contains_key(i) => {
                self.destroy_instance_inner(i)
            }
            EntityId::Marker(m) if self.markers.contains_key(m) => self.destroy_marker_inner(m),
            EntityId::Rubber(r) if self.rubbers.contains_key(r) => self.destroy_rubber_inner(r),
            _ => {
                // Already gone; drop any registration left behind.
                for cell in self.cells.keys().collect::<Vec<_>>() {
                    self.remove_slave_entity(cell, entity);
                }
            }
        }
    }
}
