//! Instances: placements of a master cell inside an owner cell.

use geometry::rect::Rect;
use geometry::transform::{Transform, Transformation};
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::component::{Component, ComponentKind};
use crate::error::{Error, Result};
use crate::intrusive::IntrusiveMap;
use crate::name::Name;
use crate::{CellId, ComponentId, Database, GoId, InstanceId, NetId, SharedPathId};

/// How an instance is placed.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PlacementStatus {
    /// The transformation is meaningless; the instance is not in any spatial index.
    #[default]
    Unplaced,
    /// Placed, and free to move.
    Placed,
    /// Placed, and must not move.
    Fixed,
}

/// A placement of a master cell.
#[derive(Debug)]
pub struct Instance {
    pub(crate) name: Name,
    pub(crate) cell: CellId,
    pub(crate) master: CellId,
    pub(crate) transformation: Transformation,
    pub(crate) status: PlacementStatus,
    /// One plug per external net of the master, keyed by that net.
    pub(crate) plugs: IntrusiveMap<NetId, ComponentId>,
    /// Shared paths headed by this instance, keyed by their tail.
    pub(crate) shared_paths: IntrusiveMap<Option<SharedPathId>, SharedPathId>,
}

impl Instance {
    /// The instance name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The cell owning this instance.
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The placed cell.
    #[inline]
    pub fn master(&self) -> CellId {
        self.master
    }

    /// The placement transformation.
    #[inline]
    pub fn transformation(&self) -> Transformation {
        self.transformation
    }

    /// The placement status.
    #[inline]
    pub fn status(&self) -> PlacementStatus {
        self.status
    }

    /// Returns `true` unless the instance is unplaced.
    #[inline]
    pub fn is_placed(&self) -> bool {
        self.status != PlacementStatus::Unplaced
    }

    /// The plugs of the instance.
    pub fn plugs(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.plugs.iter()
    }
}

impl Database {
    pub(crate) fn check_instance(&self, id: InstanceId) -> Result<&Instance> {
        self.instances.get(id).ok_or(Error::StaleId("instance"))
    }

    /// Returns the instance with the given ID.
    #[inline]
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id]
    }

    /// Returns the instance with the given ID, or `None` if it was destroyed.
    #[inline]
    pub fn try_instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    /// Places `master` inside `cell`.
    ///
    /// Fails if the name is empty or taken in `cell`, or if `master` is
    /// `cell` or one of its callers. The new instance gets one unconnected
    /// plug per external net of `master`.
    pub fn create_instance(
        &mut self,
        cell: CellId,
        name: impl Into<Name>,
        master: CellId,
        transformation: Transformation,
        status: PlacementStatus,
    ) -> Result<InstanceId> {
        let name = name.into();
        let c = self.check_cell(cell)?;
        let m = self.check_cell(master)?;
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "instance" });
        }
        if c.instances.contains_key(&name) {
            return Err(Error::DuplicateInstance { name, cell: c.name });
        }
        if master == cell || self.is_called_by(cell, master) {
            return Err(Error::CyclicInstantiation {
                cell: c.name,
                master: m.name,
            });
        }
        self.with_session(|db| Ok(db.create_instance_inner(cell, name, master, transformation, status)))
    }

    pub(crate) fn create_instance_inner(
        &mut self,
        cell: CellId,
        name: Name,
        master: CellId,
        transformation: Transformation,
        status: PlacementStatus,
    ) -> InstanceId {
        let buckets = self.buckets();
        let id = self.instances.insert(Instance {
            name,
            cell,
            master,
            transformation,
            status,
            plugs: IntrusiveMap::new(buckets),
            shared_paths: IntrusiveMap::new(buckets),
        });
        let _ = self.cells[cell].instances.insert(name, id);
        self.cells[master].slave_instances.insert(id);
        let external: Vec<NetId> = self.cells[master]
            .nets
            .iter()
            .filter(|&n| self.nets[n].external)
            .collect();
        for master_net in external {
            self.create_plug(id, master_net);
        }
        let go = GoId::Instance(id);
        if self.should_materialize(go) {
            self.materialize_go(go);
        }
        self.touch(cell);
        event!(Level::TRACE, instance = %name, cell = %self.cells[cell].name, "created instance");
        id
    }

    pub(crate) fn create_plug(&mut self, instance: InstanceId, master_net: NetId) -> ComponentId {
        let cell = self.instances[instance].cell;
        let plug = self.components.insert_with_key(|id| {
            Component::new(
                id,
                cell,
                None,
                ComponentKind::Plug {
                    instance,
                    master_net,
                },
            )
        });
        let _ = self.instances[instance].plugs.insert(master_net, plug);
        plug
    }

    /// The plug of `instance` for the external net `master_net` of its master.
    pub fn plug_for(&self, instance: InstanceId, master_net: NetId) -> Option<ComponentId> {
        self.instances.get(instance)?.plugs.get(&master_net)
    }

    /// The bounding box of the master, placed by the instance's transformation.
    pub fn instance_bounding_box(&self, instance: InstanceId) -> Option<Rect> {
        let i = self.instances.get(instance)?;
        self.cell_bounding_box(i.master)
            .map(|bbox| bbox.transform(i.transformation))
    }

    /// Moves an instance.
    pub fn set_transformation(
        &mut self,
        instance: InstanceId,
        transformation: Transformation,
    ) -> Result<()> {
        self.check_instance(instance)?;
        self.with_session(|db| {
            if db.instances[instance].transformation != transformation {
                db.invalidate(GoId::Instance(instance));
                db.instances[instance].transformation = transformation;
                db.invalidate_instance_paths(instance);
            }
            Ok(())
        })
    }

    /// Changes the placement status of an instance.
    ///
    /// Only placed instances are indexed in their owner's quad-tree.
    pub fn set_placement_status(
        &mut self,
        instance: InstanceId,
        status: PlacementStatus,
    ) -> Result<()> {
        self.check_instance(instance)?;
        self.with_session(|db| {
            if db.instances[instance].status != status {
                db.invalidate(GoId::Instance(instance));
                db.instances[instance].status = status;
            }
            Ok(())
        })
    }

    /// Renames an instance, re-keying it in its owner cell.
    pub fn set_instance_name(&mut self, instance: InstanceId, name: impl Into<Name>) -> Result<()> {
        let name = name.into();
        let i = self.check_instance(instance)?;
        if i.name == name {
            return Ok(());
        }
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "instance" });
        }
        let cell = i.cell;
        if self.cells[cell].instances.contains_key(&name) {
            return Err(Error::DuplicateInstance {
                name,
                cell: self.cells[cell].name,
            });
        }
        self.with_session(|db| {
            db.instances[instance].name = name;
            let _ = db.cells[cell].instances.insert(name, instance);
            db.invalidate_instance_paths(instance);
            db.touch(cell);
            Ok(())
        })
    }

    /// Rebinds an instance to another master.
    ///
    /// Every plug must find an external net of the same name in `master`;
    /// plugs are moved onto those nets and plugs for the remaining external
    /// nets are created. Paths through the instance's old master are destroyed.
    pub fn set_master_cell(&mut self, instance: InstanceId, master: CellId) -> Result<()> {
        let i = self.check_instance(instance)?;
        let m = self.check_cell(master)?;
        if i.master == master {
            return Ok(());
        }
        let cell = i.cell;
        if master == cell || self.is_called_by(cell, master) {
            return Err(Error::CyclicInstantiation {
                cell: self.cells[cell].name,
                master: m.name,
            });
        }
        let mut rebinding = Vec::new();
        for (old_net, plug) in i.plugs.pairs() {
            let net_name = self.nets[old_net].name;
            match m.nets.get(&net_name).filter(|&n| self.nets[n].external) {
                Some(new_net) => rebinding.push((plug, new_net)),
                None => {
                    return Err(Error::MissingMasterNet {
                        master: m.name,
                        net: net_name,
                    })
                }
            }
        }

        self.with_session(|db| {
            db.invalidate(GoId::Instance(instance));
            for sp in db.instances[instance].shared_paths.to_vec() {
                if db.shared_paths.get(sp).is_some_and(|sp| sp.tail.is_some()) {
                    db.destroy_shared_path(sp);
                }
            }
            let old_master = db.instances[instance].master;
            db.cells[old_master].slave_instances.remove(instance);
            db.instances[instance].plugs.clear();
            for (plug, new_net) in rebinding {
                if let ComponentKind::Plug { master_net, .. } = &mut db.components[plug].kind {
                    *master_net = new_net;
                }
                let _ = db.instances[instance].plugs.insert(new_net, plug);
            }
            db.instances[instance].master = master;
            db.cells[master].slave_instances.insert(instance);
            let missing: Vec<NetId> = db.cells[master]
                .nets
                .iter()
                .filter(|&n| db.nets[n].external && !db.instances[instance].plugs.contains_key(&n))
                .collect();
            for net in missing {
                db.create_plug(instance, net);
            }
            db.invalidate_instance_paths(instance);
            db.touch(cell);
            Ok(())
        })
    }

    /// Destroys an instance with its plugs, the paths it heads and the
    /// entities that depend on it.
    pub fn destroy_instance(&mut self, instance: InstanceId) -> Result<()> {
        self.check_instance(instance)?;
        self.with_session(|db| {
            db.destroy_instance_inner(instance);
            Ok(())
        })
    }

    pub(crate) fn destroy_instance_inner(&mut self, instance: InstanceId) {
        let Some(i) = self.instances.get(instance) else {
            return;
        };
        let cell = i.cell;
        let go = GoId::Instance(instance);
        self.unmaterialize_go(go);
        self.session.invalidated.shift_remove(&go);
        self.session.stale_instances.shift_remove(&instance);
        self.drop_from_extension_slices(cell, go);

        while let Some(entity) = self.next_slave_entity(cell, Some(instance)) {
            self.destroy_entity(entity);
            self.remove_slave_entity(cell, entity);
        }
        for sp in self.instances[instance].shared_paths.to_vec() {
            self.destroy_shared_path(sp);
        }
        for plug in self.instances[instance].plugs.to_vec() {
            self.destroy_component_inner(plug);
        }

        let master = self.instances[instance].master;
        self.cells[cell].instances.remove(instance);
        if let Some(m) = self.cells.get_mut(master) {
            m.slave_instances.remove(instance);
        }
        self.instances.remove(instance);
        self.touch(cell);
    }
}
