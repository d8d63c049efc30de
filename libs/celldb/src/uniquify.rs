//! Cloning and uniquification of masters.
//!
//! A master placed several times can't be edited for one of its placements
//! alone. Uniquification gives such placements a private clone of the
//! master. Clones of one master form a family recorded by a
//! [`UniquifyRelation`] shared by the original and every clone.

use indexmap::IndexSet;
use tracing::{event, span, Level};

use crate::cell::CellFlags;
use crate::component::ComponentKind;
use crate::error::{Error, Result};
use crate::instance::PlacementStatus;
use crate::name::Name;
use crate::{CellId, Database, InstanceId, NetId, UniquifyRelationId};

/// The clone family of a master cell.
#[derive(Debug)]
pub struct UniquifyRelation {
    pub(crate) master_owner: CellId,
    pub(crate) duplicates: u32,
    pub(crate) clones: IndexSet<CellId>,
}

impl UniquifyRelation {
    /// The original cell of the family.
    #[inline]
    pub fn master_owner(&self) -> CellId {
        self.master_owner
    }

    /// The counter used to number the next clone.
    #[inline]
    pub fn duplicates(&self) -> u32 {
        self.duplicates
    }
}

impl Database {
    /// The clone family of `cell`, if it has one.
    pub fn uniquify_relation(&self, cell: CellId) -> Option<&UniquifyRelation> {
        self.uniquify_relations.get(self.cells.get(cell)?.uniquify?)
    }

    /// The cell `cell` was cloned from, or `cell` itself.
    pub fn clone_master(&self, cell: CellId) -> CellId {
        self.uniquify_relation(cell)
            .map_or(cell, |r| r.master_owner)
    }

    /// Returns `true` if `cell` is a clone.
    pub fn is_uniquified(&self, cell: CellId) -> bool {
        self.uniquify_relation(cell)
            .is_some_and(|r| r.master_owner != cell)
    }

    /// Returns `true` unless `cell` is a clone.
    pub fn is_uniquify_master(&self, cell: CellId) -> bool {
        self.uniquify_relation(cell)
            .map_or(true, |r| r.master_owner == cell)
    }

    /// The clones in the family of `cell`.
    pub fn cloned_cells(&self, cell: CellId) -> Vec<CellId> {
        self.uniquify_relation(cell)
            .map(|r| r.clones.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sets [`CellFlags::PLACED`] if every instance of `cell` is placed.
    pub fn update_placed_flag(&mut self, cell: CellId) -> Result<bool> {
        self.check_cell(cell)?;
        let placed = self.cells[cell]
            .instances
            .iter()
            .all(|i| self.instances[i].status != PlacementStatus::Unplaced);
        if placed {
            self.cells[cell].flags.insert(CellFlags::PLACED);
        }
        Ok(placed)
    }

    /// Mints the next clone name of a family: `<owner>_uNN`.
    fn unique_name(&mut self, relation: UniquifyRelationId) -> Name {
        let width = self.config.uniquify_suffix_width;
        let owner = self.uniquify_relations[relation].master_owner;
        let library = self.cells[owner].library;
        loop {
            let r = &mut self.uniquify_relations[relation];
            let name = Name::new(format!(
                "{}_u{:0width$}",
                self.cells[owner].name,
                r.duplicates,
                width = width
            ));
            r.duplicates += 1;
            if !self.libraries[library].cells.contains_key(&name) {
                return name;
            }
        }
    }

    /// Creates a private copy of `cell` in its library.
    ///
    /// The clone gets the terminal, flatten-leaf and pad flags, the abutment
    /// box, every net except deep nets, and a copy of every instance. It is
    /// flagged placed only if all its instances are.
    pub fn clone_cell(&mut self, cell: CellId) -> Result<CellId> {
        self.check_cell(cell)?;
        self.with_session(|db| db.clone_cell_inner(cell))
    }

    fn clone_cell_inner(&mut self, cell: CellId) -> Result<CellId> {
        let relation = match self.cells[cell].uniquify {
            Some(relation) => relation,
            None => {
                let relation = self.uniquify_relations.insert(UniquifyRelation {
                    master_owner: cell,
                    duplicates: 1,
                    clones: IndexSet::new(),
                });
                self.cells[cell].uniquify = Some(relation);
                relation
            }
        };
        let name = self.unique_name(relation);
        let library = self.cells[cell].library;
        let clone = self.create_cell(Some(library), name)?;
        self.cells[clone].uniquify = Some(relation);
        self.uniquify_relations[relation].clones.insert(clone);

        let inherited = self.cells[cell].flags
            & (CellFlags::TERMINAL | CellFlags::FLATTEN_LEAF | CellFlags::PAD);
        self.cells[clone].flags.insert(inherited);
        let abutment_box = self.cells[cell].abutment_box;
        self.set_abutment_box_inner(clone, abutment_box);

        for net in self.cells[cell].nets.to_vec() {
            if !self.nets[net].is_deep() {
                self.clone_net_inner(net, clone);
            }
        }
        let mut placed = true;
        for inst in self.cells[cell].instances.to_vec() {
            let copy = self.clone_instance_inner(inst, clone);
            placed &= self.instances[copy].is_placed();
        }
        if placed {
            self.cells[clone].flags.insert(CellFlags::PLACED);
        }
        event!(Level::DEBUG, cell = %self.cells[cell].name, clone = %name, "cloned cell");
        Ok(clone)
    }

    /// Copies a net, with its attributes, aliases and drawn components, into `into`.
    pub fn clone_net(&mut self, net: NetId, into: CellId) -> Result<NetId> {
        let name = self.check_net(net)?.name;
        self.check_cell(into)?;
        self.check_net_name_free(into, name)?;
        self.with_session(|db| Ok(db.clone_net_inner(net, into)))
    }

    fn clone_net_inner(&mut self, net: NetId, into: CellId) -> NetId {
        let name = self.nets[net].name;
        let copy = self.create_net_inner(into, name, None);
        let n = &self.nets[net];
        let (arity, net_type, direction, global, external, position) = (
            n.arity,
            n.net_type,
            n.direction,
            n.global,
            n.external,
            n.position,
        );
        let aliases: Vec<Name> = n.aliases.iter().copied().collect();
        let c = &mut self.nets[copy];
        c.arity = arity;
        c.net_type = net_type;
        c.direction = direction;
        c.global = global;
        c.position = position;
        if external {
            self.set_external_inner(copy, true);
        }
        for alias in aliases {
            if self.check_net_name_free(into, alias).is_ok() {
                self.nets[copy].aliases.insert(alias);
                self.cells[into].net_aliases.insert(alias, copy);
            }
        }
        for component in self.nets[net].components.to_vec() {
            let kind = self.components[component].kind.clone();
            if matches!(kind, ComponentKind::Plug { .. } | ComponentKind::RoutingPad { .. }) {
                continue;
            }
            let external = self.components[component].external;
            let cloned = self.create_component_inner(copy, kind);
            self.components[cloned].external = external;
        }
        copy
    }

    /// Copies an instance into `into`, connecting its plugs to the nets of
    /// `into` named like the nets the original plugs were connected to.
    pub fn clone_instance(&mut self, instance: InstanceId, into: CellId) -> Result<InstanceId> {
        let i = self.check_instance(instance)?;
        let c = self.check_cell(into)?;
        if c.instances.contains_key(&i.name) {
            return Err(Error::DuplicateInstance {
                name: i.name,
                cell: c.name,
            });
        }
        if i.master == into || self.is_called_by(into, i.master) {
            return Err(Error::CyclicInstantiation {
                cell: c.name,
                master: self.cells[i.master].name,
            });
        }
        self.with_session(|db| Ok(db.clone_instance_inner(instance, into)))
    }

    fn clone_instance_inner(&mut self, instance: InstanceId, into: CellId) -> InstanceId {
        let i = &self.instances[instance];
        let (name, master, transformation, status) = (i.name, i.master, i.transformation, i.status);
        let connections: Vec<(NetId, Name)> = i
            .plugs
            .pairs()
            .filter_map(|(master_net, plug)| {
                let upper = self.components[plug].net?;
                Some((master_net, self.nets[upper].name))
            })
            .collect();
        let copy = self.create_instance_inner(into, name, master, transformation, status);
        for (master_net, upper_name) in connections {
            let (Some(plug), Some(upper)) = (
                self.instances[copy].plugs.get(&master_net),
                self.net_by_name(into, upper_name),
            ) else {
                continue;
            };
            self.connect_plug(plug, Some(upper));
        }
        copy
    }

    /// Rebinds `instance` to a fresh clone of its master, unless the master
    /// is already unique.
    pub fn instance_uniquify(&mut self, instance: InstanceId) -> Result<()> {
        let master = self.check_instance(instance)?.master;
        if self.cells[master].is_unique() {
            return Ok(());
        }
        self.with_session(|db| {
            let clone = db.clone_cell_inner(master)?;
            db.set_master_cell(instance, clone)
        })
    }

    /// Gives private masters to the unplaced instances of `cell` whose
    /// master is shared and not fully placed, then recurses into the masters
    /// of `cell` down to `depth` more levels.
    ///
    /// Terminal masters are never cloned.
    pub fn uniquify(&mut self, cell: CellId, depth: u32) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| db.uniquify_inner(cell, depth))
    }

    fn uniquify_inner(&mut self, cell: CellId, depth: u32) -> Result<()> {
        let _guard = span!(Level::INFO, "uniquifying", cell = %self.cells[cell].name, depth).entered();

        let mut masters = IndexSet::new();
        let mut queued = Vec::new();
        for inst in self.cells[cell].instances.to_vec() {
            let master = self.instances[inst].master;
            if self.cells[master].is_terminal() {
                continue;
            }
            if masters.insert(master) {
                self.update_placed_flag(master)?;
            }
            let m = &self.cells[master];
            if !m.is_unique()
                && !m.flags.contains(CellFlags::PLACED)
                && !self.instances[inst].is_placed()
            {
                queued.push(inst);
            }
        }
        event!(Level::DEBUG, queued = queued.len(), "instances to uniquify");

        for inst in queued {
            self.instance_uniquify(inst)?;
            masters.insert(self.instances[inst].master);
        }

        if depth > 0 {
            for master in masters {
                self.uniquify_inner(master, depth - 1)?;
            }
        }
        Ok(())
    }

    /// Detaches `cell` from its clone family. The family dissolves when its
    /// original goes.
    pub(crate) fn detach_uniquify_relation(&mut self, cell: CellId) {
        let Some(relation) = self.cells[cell].uniquify.take() else {
            return;
        };
        let Some(r) = self.uniquify_relations.get_mut(relation) else {
            return;
        };
        if r.master_owner == cell {
            if let Some(r) = self.uniquify_relations.remove(relation) {
                for clone in r.clones {
                    if let Some(c) = self.cells.get_mut(clone) {
                        c.uniquify = None;
                    }
                }
            }
        } else {
            r.clones.shift_remove(&cell);
        }
    }
}
