//! Spatial storage of cells: the quad-tree, layer slices and extension slices.
//!
//! A cell normally owns its storage. After [`Database::slave_abutment_box`]
//! it shares the storage of a top cell instead, and its placed objects are
//! indexed alongside the top cell's.

use geometry::rect::Rect;
use tracing::{event, span, Level};

use crate::cell::CellFlags;
use crate::diagnostics::{Cause, Severity};
use crate::error::{Error, Result};
use crate::instance::PlacementStatus;
use crate::intrusive::IntrusiveMap;
use crate::layer::LayerMask;
use crate::name::Name;
use crate::quadtree::QuadTree;
use crate::{CellId, Database, ExtensionSliceId, GoId, InstanceId, LayerId, SliceId, StorageId};

/// A quad-tree and the per-layer slices layered on it.
#[derive(Debug)]
pub(crate) struct SpatialStorage {
    /// The cell that allocated the storage.
    pub(crate) owner: CellId,
    pub(crate) quadtree: QuadTree<GoId>,
    pub(crate) slices: IntrusiveMap<LayerMask, SliceId>,
}

impl SpatialStorage {
    pub(crate) fn new(owner: CellId, threshold: usize, buckets: usize) -> Self {
        Self {
            owner,
            quadtree: QuadTree::new(threshold),
            slices: IntrusiveMap::new(buckets),
        }
    }
}

/// The components of one layer placed in a spatial storage.
#[derive(Debug)]
pub struct Slice {
    pub(crate) storage: StorageId,
    pub(crate) layer: LayerId,
    pub(crate) quadtree: QuadTree<GoId>,
}

impl Slice {
    /// The layer of this slice.
    #[inline]
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The bounding box of the slice contents.
    #[inline]
    pub fn bounding_box(&self) -> Option<Rect> {
        self.quadtree.bounding_box()
    }

    /// The number of objects in the slice.
    #[inline]
    pub fn len(&self) -> usize {
        self.quadtree.len()
    }

    /// Returns `true` if the slice holds no objects.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.quadtree.is_empty()
    }
}

/// A named overlay of a cell, holding its own quad-tree.
#[derive(Debug)]
pub struct ExtensionSlice {
    pub(crate) cell: CellId,
    pub(crate) name: Name,
    pub(crate) mask: u64,
    pub(crate) quadtree: QuadTree<GoId>,
}

impl ExtensionSlice {
    /// The cell owning the slice.
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The slice name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The mask bit allocated to this slice.
    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// The bounding box of the slice contents.
    #[inline]
    pub fn bounding_box(&self) -> Option<Rect> {
        self.quadtree.bounding_box()
    }
}

impl Database {
    /// The cell a placed object belongs to.
    pub(crate) fn go_cell(&self, go: GoId) -> Option<CellId> {
        match go {
            GoId::Instance(i) => self.instances.get(i).map(|i| i.cell),
            GoId::Component(c) => self.components.get(c).map(|c| c.cell),
            GoId::Marker(m) => self.markers.get(m).map(|m| m.cell),
        }
    }

    /// The current bounding box of a placed object, in its cell's coordinates.
    pub fn go_bounding_box(&self, go: GoId) -> Option<Rect> {
        match go {
            GoId::Instance(i) => self.instance_bounding_box(i),
            GoId::Component(c) => self.component_bounding_box(c),
            GoId::Marker(m) => self.markers.get(m).map(|m| m.bounding_box()),
        }
    }

    fn go_quadtree(&self, go: GoId) -> Option<&QuadTree<GoId>> {
        let cell = self.go_cell(go)?;
        let storage = &self.storages[self.cells[cell].storage];
        match go {
            GoId::Component(c) => {
                let layer = self.components[c].layer()?;
                let slice = storage.slices.get(&self.layers[layer].mask)?;
                Some(&self.slices[slice].quadtree)
            }
            _ => Some(&storage.quadtree),
        }
    }

    fn go_quadtree_mut(&mut self, go: GoId) -> Option<&mut QuadTree<GoId>> {
        let cell = self.go_cell(go)?;
        let storage = self.cells[cell].storage;
        match go {
            GoId::Component(c) => {
                let layer = self.components[c].layer()?;
                let slice = self.slice_for(storage, layer);
                Some(&mut self.slices[slice].quadtree)
            }
            _ => Some(&mut self.storages[storage].quadtree),
        }
    }

    /// The slice of `layer` in `storage`, created on first use.
    fn slice_for(&mut self, storage: StorageId, layer: LayerId) -> SliceId {
        let mask = self.layers[layer].mask;
        if let Some(slice) = self.storages[storage].slices.get(&mask) {
            return slice;
        }
        let threshold = self.config.quadtree_split_threshold;
        let slice = self.slices.insert(Slice {
            storage,
            layer,
            quadtree: QuadTree::new(threshold),
        });
        let _ = self.storages[storage].slices.insert(mask, slice);
        slice
    }

    /// Returns `true` if the object is in a spatial index.
    pub fn is_go_materialized(&self, go: GoId) -> bool {
        self.go_quadtree(go).is_some_and(|qt| qt.contains(go))
    }

    pub(crate) fn is_instance_materialized(&self, inst: InstanceId) -> bool {
        self.is_go_materialized(GoId::Instance(inst))
    }

    /// Returns `true` if the object belongs in a spatial index right now.
    pub(crate) fn should_materialize(&self, go: GoId) -> bool {
        let Some(cell) = self.go_cell(go) else {
            return false;
        };
        if !self.cells[cell].flags.contains(CellFlags::MATERIALIZED) {
            return false;
        }
        match go {
            GoId::Instance(i) => self.instances[i].status != PlacementStatus::Unplaced,
            GoId::Component(c) => self.components[c].layer().is_some(),
            GoId::Marker(_) => true,
        }
    }

    /// Inserts the object in its spatial index and grows the cached boxes.
    pub(crate) fn materialize_go(&mut self, go: GoId) {
        if self.is_go_materialized(go) {
            return;
        }
        let (Some(cell), Some(bbox)) = (self.go_cell(go), self.go_bounding_box(go)) else {
            return;
        };
        let Some(quadtree) = self.go_quadtree_mut(go) else {
            return;
        };
        quadtree.insert(go, bbox);
        self.fit(cell, Some(bbox));
    }

    /// Removes the object from its spatial index and invalidates the boxes it defined.
    pub(crate) fn unmaterialize_go(&mut self, go: GoId) {
        let Some(cell) = self.go_cell(go) else {
            return;
        };
        let removed = self
            .go_quadtree_mut(go)
            .and_then(|quadtree| quadtree.remove(go));
        if removed.is_some() {
            self.unfit(cell, removed);
        }
    }

    /// Every placed object of `cell`'s spatial storage intersecting `area`.
    pub fn gos_in(&self, cell: CellId, area: Rect) -> Vec<GoId> {
        let storage = &self.storages[self.cells[cell].storage];
        let mut gos = storage.quadtree.items_in(area);
        for slice in storage.slices.iter() {
            gos.extend(self.slices[slice].quadtree.items_in(area));
        }
        gos
    }

    /// The layer slices of `cell`'s spatial storage.
    pub fn cell_slices(&self, cell: CellId) -> Vec<SliceId> {
        self.storages[self.cells[cell].storage].slices.to_vec()
    }

    /// The slice of `layer` in `cell`'s spatial storage, if it holds anything.
    pub fn cell_slice(&self, cell: CellId, layer: LayerId) -> Option<SliceId> {
        let mask = self.layers[layer].mask;
        self.storages[self.cells[cell].storage].slices.get(&mask)
    }

    /// Returns the slice with the given ID.
    #[inline]
    pub fn slice(&self, id: SliceId) -> &Slice {
        &self.slices[id]
    }

    /// Returns `true` if `a` and `b` share one spatial storage.
    pub fn shares_storage(&self, a: CellId, b: CellId) -> bool {
        self.cells[a].storage == self.cells[b].storage
    }

    /// Puts every placed object of `cell` in its spatial storage.
    pub fn materialize(&mut self, cell: CellId) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| {
            db.materialize_inner(cell);
            Ok(())
        })
    }

    pub(crate) fn materialize_inner(&mut self, cell: CellId) {
        self.cells[cell].flags.insert(CellFlags::MATERIALIZED);
        for go in self.cell_gos(cell) {
            if self.should_materialize(go) {
                self.materialize_go(go);
            }
        }
        self.touch(cell);
    }

    /// Takes every placed object of `cell` out of its spatial storage.
    pub fn unmaterialize(&mut self, cell: CellId) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| {
            db.unmaterialize_inner(cell);
            Ok(())
        })
    }

    pub(crate) fn unmaterialize_inner(&mut self, cell: CellId) {
        self.cells[cell].flags.remove(CellFlags::MATERIALIZED);
        for go in self.cell_gos(cell) {
            self.unmaterialize_go(go);
        }
        self.touch(cell);
    }

    /// The objects of `cell` that may be placed in a spatial index.
    fn cell_gos(&self, cell: CellId) -> Vec<GoId> {
        let c = &self.cells[cell];
        let mut gos: Vec<GoId> = c.instances.iter().map(GoId::Instance).collect();
        for net in c.nets.iter() {
            gos.extend(self.nets[net].components.iter().map(GoId::Component));
        }
        gos.extend(c.markers.iter().map(GoId::Marker));
        gos
    }

    /// Points `cell` at the storage of `top`, or at a fresh storage of its own
    /// when `top` is `None`.
    ///
    /// The cell is unmaterialized around the swap and rematerialized if it
    /// was materialized. Fails if objects of the cell are queued in the
    /// current update session.
    pub fn change_quad_tree(&mut self, cell: CellId, top: Option<CellId>) -> Result<()> {
        let name = self.check_cell(cell)?.name;
        if let Some(top) = top {
            self.check_cell(top)?;
        }
        if self.session.has_pending(self, cell) {
            return Err(Error::PendingGeometry(name));
        }
        self.with_session(|db| {
            let materialized = db.cells[cell].flags.contains(CellFlags::MATERIALIZED);
            db.unmaterialize_inner(cell);
            db.swap_storage(cell, top);
            if materialized {
                db.materialize_inner(cell);
            }
            Ok(())
        })
    }

    /// Swaps storages of an unmaterialized cell.
    fn swap_storage(&mut self, cell: CellId, top: Option<CellId>) {
        let merged = self.cells[cell].flags.contains(CellFlags::MERGED_QUAD_TREE);
        if top.is_none() && !merged {
            return;
        }
        let old = self.cells[cell].storage;
        if self.storages[old].owner == cell {
            self.free_storage(old);
        }
        let storage = match top {
            Some(top) => {
                self.cells[cell].flags.insert(CellFlags::MERGED_QUAD_TREE);
                self.cells[top].storage
            }
            None => {
                self.cells[cell].flags.remove(CellFlags::MERGED_QUAD_TREE);
                let threshold = self.config.quadtree_split_threshold;
                let buckets = self.buckets();
                self.storages
                    .insert(SpatialStorage::new(cell, threshold, buckets))
            }
        };
        self.cells[cell].storage = storage;
        self.cells[cell].bounding_box.set(None);
        self.mark_slave_instances_stale(cell);
        self.touch(cell);
    }

    fn free_storage(&mut self, storage: StorageId) {
        if let Some(s) = self.storages.remove(storage) {
            for slice in s.slices.iter() {
                self.slices.remove(slice);
            }
        }
    }

    fn mark_slave_instances_stale(&mut self, cell: CellId) {
        for inst in self.cells[cell].slave_instances.iter() {
            self.session.stale_instances.insert(inst);
        }
    }

    /// Frees the storage of a cell being destroyed. Cells that were sharing
    /// it get a fresh storage of their own.
    pub(crate) fn release_storage(&mut self, cell: CellId) {
        let storage = self.cells[cell].storage;
        if self.storages[storage].owner != cell {
            return;
        }
        let borrowers: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(id, c)| *id != cell && c.storage == storage)
            .map(|(id, _)| id)
            .collect();
        for borrower in borrowers {
            let materialized = self.cells[borrower].flags.contains(CellFlags::MATERIALIZED);
            self.unmaterialize_inner(borrower);
            self.swap_storage(borrower, None);
            if materialized {
                self.materialize_inner(borrower);
            }
        }
        self.free_storage(storage);
    }

    /// Makes `cell` share the spatial storage and abutment box of `top`.
    ///
    /// Placed instances are shifted by the offset between the two abutment
    /// boxes, and masters of instances that already share the cell's storage
    /// follow. A cell that is already slaved, or that is placed more than
    /// once, is left untouched and an error issue is reported.
    pub fn slave_abutment_box(&mut self, cell: CellId, top: CellId) -> Result<()> {
        let c = self.check_cell(cell)?;
        let name = c.name;
        self.check_cell(top)?;
        if c.flags.contains(CellFlags::MERGED_QUAD_TREE) {
            self.report(Cause::AlreadySlaved { cell: name }, Severity::Error);
            return Ok(());
        }
        if !c.is_unique() {
            let slave_instances = c.slave_instance_count();
            self.report(
                Cause::NotUnique {
                    cell: name,
                    slave_instances,
                },
                Severity::Error,
            );
            return Ok(());
        }
        if self.session.has_pending(self, cell) {
            return Err(Error::PendingGeometry(name));
        }
        self.with_session(|db| {
            db.slave_abutment_box_inner(cell, top);
            Ok(())
        })
    }

    fn slave_abutment_box_inner(&mut self, cell: CellId, top: CellId) {
        let _guard = span!(
            Level::INFO,
            "slaving abutment box",
            cell = %self.cells[cell].name,
            top = %self.cells[top].name
        )
        .entered();

        let materialized = self.cells[cell].flags.contains(CellFlags::MATERIALIZED);
        self.unmaterialize_inner(cell);

        let top_ab = self.cells[top].abutment_box;
        if let (Some(ab), Some(top_ab)) = (self.cells[cell].abutment_box, top_ab) {
            if ab.width() != top_ab.width() || ab.height() != top_ab.height() {
                let cause = Cause::AbutmentBoxMismatch {
                    top: self.cells[top].name,
                    slave: self.cells[cell].name,
                };
                self.report(cause, Severity::Warning);
            }
            let dx = top_ab.left() - ab.left();
            let dy = top_ab.bot() - ab.bot();
            for inst in self.cells[cell].instances.to_vec() {
                let i = &mut self.instances[inst];
                if i.status != PlacementStatus::Unplaced {
                    i.transformation = i.transformation.translated(dx, dy);
                    self.invalidate_instance_paths(inst);
                }
            }
        }

        self.set_abutment_box_inner(cell, top_ab);

        // Masters merged into this cell move first: the storage they share
        // with it is freed by the swap below.
        for inst in self.cells[cell].instances.to_vec() {
            let master = self.instances[inst].master;
            if self.cells[master].flags.contains(CellFlags::MERGED_QUAD_TREE) {
                event!(Level::DEBUG, master = %self.cells[master].name, "slaving merged master");
                self.slave_abutment_box_inner(master, top);
            }
        }

        self.swap_storage(cell, Some(top));
        if materialized {
            self.materialize_inner(cell);
        }
    }

    /// Creates an extension slice named `name` in `cell`.
    pub fn create_extension_slice(
        &mut self,
        cell: CellId,
        name: impl Into<Name>,
    ) -> Result<ExtensionSliceId> {
        let name = name.into();
        let c = self.check_cell(cell)?;
        if name.is_empty() {
            return Err(Error::EmptyName {
                kind: "extension slice",
            });
        }
        if c.extension_slices.contains_key(&name) {
            return Err(Error::DuplicateExtensionSlice { name, cell: c.name });
        }
        let used = c
            .extension_slices
            .iter()
            .fold(0u64, |acc, s| acc | self.extension_slices[s].mask);
        if used == u64::MAX {
            return Err(Error::ExtensionMasksExhausted(c.name));
        }
        let mask = 1u64 << (!used).trailing_zeros();
        let threshold = self.config.quadtree_split_threshold;
        self.with_session(|db| {
            let id = db.extension_slices.insert(ExtensionSlice {
                cell,
                name,
                mask,
                quadtree: QuadTree::new(threshold),
            });
            let _ = db.cells[cell].extension_slices.insert(name, id);
            db.touch(cell);
            Ok(id)
        })
    }

    /// Looks up an extension slice of `cell` by name.
    pub fn extension_slice(&self, cell: CellId, name: impl Into<Name>) -> Option<ExtensionSliceId> {
        self.cells.get(cell)?.extension_slices.get(&name.into())
    }

    /// Returns the extension slice with the given ID.
    #[inline]
    pub fn extension_slice_ref(&self, id: ExtensionSliceId) -> &ExtensionSlice {
        &self.extension_slices[id]
    }

    /// The combined masks of the named extension slices of `cell`.
    pub fn extension_slice_mask<'a>(
        &self,
        cell: CellId,
        names: impl IntoIterator<Item = &'a str>,
    ) -> u64 {
        names
            .into_iter()
            .filter_map(|n| self.extension_slice(cell, n))
            .fold(0, |acc, s| acc | self.extension_slices[s].mask)
    }

    /// Indexes a placed object of the slice's cell in an extension slice.
    pub fn insert_extension_go(&mut self, slice: ExtensionSliceId, go: GoId) -> Result<bool> {
        let s = self
            .extension_slices
            .get(slice)
            .ok_or(Error::StaleId("extension slice"))?;
        let cell = s.cell;
        if self.go_cell(go) != Some(cell) {
            return Err(Error::CellMismatch {
                what: "object",
                name: s.name,
                cell: self.cells[cell].name,
            });
        }
        let Some(bbox) = self.go_bounding_box(go) else {
            return Ok(false);
        };
        self.with_session(|db| {
            let inserted = db.extension_slices[slice].quadtree.insert(go, bbox);
            db.touch(cell);
            Ok(inserted)
        })
    }

    /// Removes an object from an extension slice.
    pub fn remove_extension_go(&mut self, slice: ExtensionSliceId, go: GoId) -> Result<bool> {
        let cell = self
            .extension_slices
            .get(slice)
            .ok_or(Error::StaleId("extension slice"))?
            .cell;
        self.with_session(|db| {
            let removed = db.extension_slices[slice].quadtree.remove(go).is_some();
            db.touch(cell);
            Ok(removed)
        })
    }

    /// Objects of an extension slice intersecting `area`.
    pub fn extension_gos_in(&self, slice: ExtensionSliceId, area: Rect) -> Vec<GoId> {
        self.extension_slices[slice].quadtree.items_in(area)
    }

    /// Destroys an extension slice.
    pub fn destroy_extension_slice(&mut self, slice: ExtensionSliceId) -> Result<()> {
        if !self.extension_slices.contains_key(slice) {
            return Err(Error::StaleId("extension slice"));
        }
        self.with_session(|db| {
            db.destroy_extension_slice_inner(slice);
            Ok(())
        })
    }

    pub(crate) fn destroy_extension_slice_inner(&mut self, slice: ExtensionSliceId) {
        if let Some(s) = self.extension_slices.remove(slice) {
            if let Some(c) = self.cells.get_mut(s.cell) {
                c.extension_slices.remove(slice);
            }
            self.touch(s.cell);
        }
    }

    /// Removes an object from every extension slice of its cell.
    pub(crate) fn drop_from_extension_slices(&mut self, cell: CellId, go: GoId) {
        let Some(c) = self.cells.get(cell) else {
            return;
        };
        for slice in c.extension_slices.to_vec() {
            self.extension_slices[slice].quadtree.remove(go);
        }
    }
}
