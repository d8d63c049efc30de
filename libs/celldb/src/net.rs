//! Nets: named connectivity inside a cell.

use geometry::bbox::BoundingUnion;
use geometry::point::Point;
use geometry::rect::Rect;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::component::ComponentKind;
use crate::error::{Error, Result};
use crate::intrusive::IntrusiveSet;
use crate::name::Name;
use crate::occurrence::{EntityId, Occurrence};
use crate::{CellId, ComponentId, Database, NetId, RubberId};

/// The electrical role of a net.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum NetType {
    /// Not specified.
    #[default]
    Undefined,
    /// A signal.
    Logical,
    /// A clock.
    Clock,
    /// A power supply.
    Power,
    /// A ground supply.
    Ground,
}

impl NetType {
    /// Returns `true` for power and ground.
    #[inline]
    pub fn is_supply(&self) -> bool {
        matches!(self, NetType::Power | NetType::Ground)
    }
}

/// The direction of a net seen from outside its cell.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum NetDirection {
    /// Not specified.
    #[default]
    Undefined,
    /// Input.
    In,
    /// Output.
    Out,
    /// Bidirectional.
    Inout,
    /// Three-state output.
    Tristate,
}

/// A named connectivity object owned by one cell.
///
/// A net with a root occurrence is a deep net: the merge, in its cell, of a
/// net found below some instance.
#[derive(Debug)]
pub struct Net {
    pub(crate) name: Name,
    pub(crate) cell: CellId,
    pub(crate) arity: u32,
    pub(crate) net_type: NetType,
    pub(crate) direction: NetDirection,
    pub(crate) global: bool,
    pub(crate) external: bool,
    pub(crate) position: Point,
    pub(crate) components: IntrusiveSet<ComponentId>,
    pub(crate) rubbers: IntrusiveSet<RubberId>,
    pub(crate) aliases: IndexSet<Name>,
    pub(crate) root_occurrence: Option<Occurrence>,
}

impl Net {
    /// The net name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The owner cell.
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The bus width of the net.
    #[inline]
    pub fn arity(&self) -> u32 {
        self.arity
    }

    /// The net type.
    #[inline]
    pub fn net_type(&self) -> NetType {
        self.net_type
    }

    /// The net direction.
    #[inline]
    pub fn direction(&self) -> NetDirection {
        self.direction
    }

    /// Returns `true` if the net is global.
    #[inline]
    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Returns `true` if the net is visible from instances of its cell.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Returns `true` for power and ground nets.
    #[inline]
    pub fn is_supply(&self) -> bool {
        self.net_type.is_supply()
    }

    /// Returns `true` for clock nets.
    #[inline]
    pub fn is_clock(&self) -> bool {
        self.net_type == NetType::Clock
    }

    /// Returns `true` if the net was derived by flattening.
    #[inline]
    pub fn is_deep(&self) -> bool {
        self.root_occurrence.is_some()
    }

    /// The reference position of the net.
    #[inline]
    pub fn position(&self) -> Point {
        self.position
    }

    /// The occurrence a deep net was derived from.
    #[inline]
    pub fn root_occurrence(&self) -> Option<Occurrence> {
        self.root_occurrence
    }

    /// The components of the net.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter()
    }

    /// The rubbers of the net.
    pub fn rubbers(&self) -> impl Iterator<Item = RubberId> + '_ {
        self.rubbers.iter()
    }

    /// The alias names of the net.
    pub fn aliases(&self) -> impl Iterator<Item = Name> + '_ {
        self.aliases.iter().copied()
    }
}

impl Database {
    pub(crate) fn check_net(&self, id: NetId) -> Result<&Net> {
        self.nets.get(id).ok_or(Error::StaleId("net"))
    }

    /// Returns the net with the given ID.
    #[inline]
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id]
    }

    /// Returns the net with the given ID, or `None` if it was destroyed.
    #[inline]
    pub fn try_net(&self, id: NetId) -> Option<&Net> {
        self.nets.get(id)
    }

    pub(crate) fn check_net_name_free(&self, cell: CellId, name: Name) -> Result<()> {
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "net" });
        }
        let c = &self.cells[cell];
        if c.nets.contains_key(&name) || c.net_aliases.contains_key(&name) {
            return Err(Error::DuplicateNet { name, cell: c.name });
        }
        Ok(())
    }

    /// Creates a net named `name` in `cell`.
    pub fn create_net(&mut self, cell: CellId, name: impl Into<Name>) -> Result<NetId> {
        let name = name.into();
        self.check_cell(cell)?;
        self.check_net_name_free(cell, name)?;
        self.with_session(|db| Ok(db.create_net_inner(cell, name, None)))
    }

    pub(crate) fn create_net_inner(
        &mut self,
        cell: CellId,
        name: Name,
        root_occurrence: Option<Occurrence>,
    ) -> NetId {
        let buckets = self.buckets();
        let id = self.nets.insert(Net {
            name,
            cell,
            arity: 1,
            net_type: NetType::Undefined,
            direction: NetDirection::Undefined,
            global: false,
            external: false,
            position: Point::zero(),
            components: IntrusiveSet::new(buckets),
            rubbers: IntrusiveSet::new(buckets),
            aliases: IndexSet::new(),
            root_occurrence,
        });
        let _ = self.cells[cell].nets.insert(name, id);
        self.touch(cell);
        event!(Level::TRACE, net = %name, cell = %self.cells[cell].name, "created net");
        id
    }

    /// Renames a net, re-keying it in its cell.
    pub fn set_net_name(&mut self, net: NetId, name: impl Into<Name>) -> Result<()> {
        let name = name.into();
        let n = self.check_net(net)?;
        if n.name == name {
            return Ok(());
        }
        let cell = n.cell;
        self.check_net_name_free(cell, name)?;
        self.with_session(|db| {
            db.nets[net].name = name;
            let _ = db.cells[cell].nets.insert(name, net);
            db.touch(cell);
            Ok(())
        })
    }

    /// Sets the net type.
    pub fn set_net_type(&mut self, net: NetId, net_type: NetType) -> Result<()> {
        self.check_net(net)?;
        self.nets[net].net_type = net_type;
        Ok(())
    }

    /// Sets the net direction.
    pub fn set_net_direction(&mut self, net: NetId, direction: NetDirection) -> Result<()> {
        self.check_net(net)?;
        self.nets[net].direction = direction;
        Ok(())
    }

    /// Sets the bus width of the net.
    pub fn set_net_arity(&mut self, net: NetId, arity: u32) -> Result<()> {
        self.check_net(net)?;
        self.nets[net].arity = arity;
        Ok(())
    }

    /// Marks the net as global.
    pub fn set_net_global(&mut self, net: NetId, global: bool) -> Result<()> {
        self.check_net(net)?;
        self.nets[net].global = global;
        Ok(())
    }

    /// Sets the reference position of the net.
    pub fn set_net_position(&mut self, net: NetId, position: Point) -> Result<()> {
        self.check_net(net)?;
        self.nets[net].position = position;
        Ok(())
    }

    /// Makes a net visible from instances of its cell, or hides it.
    ///
    /// Making a net external creates an unconnected plug for it on every
    /// slave instance of the cell. Hiding it requires all those plugs to be
    /// unconnected, and destroys them.
    pub fn set_external(&mut self, net: NetId, external: bool) -> Result<()> {
        let n = self.check_net(net)?;
        if n.external == external {
            return Ok(());
        }
        if !external {
            for plug in self.slave_plugs(net) {
                if self.components[plug].net.is_some() {
                    let ComponentKind::Plug { instance, .. } = self.components[plug].kind else {
                        continue;
                    };
                    return Err(Error::ConnectedPlug {
                        instance: self.instances[instance].name,
                        net: n.name,
                    });
                }
            }
        }
        self.with_session(|db| {
            db.set_external_inner(net, external);
            Ok(())
        })
    }

    pub(crate) fn set_external_inner(&mut self, net: NetId, external: bool) {
        let cell = self.nets[net].cell;
        if external {
            self.nets[net].external = true;
            for inst in self.cells[cell].slave_instances.to_vec() {
                if !self.instances[inst].plugs.contains_key(&net) {
                    self.create_plug(inst, net);
                }
            }
        } else {
            for plug in self.slave_plugs(net) {
                self.destroy_component_inner(plug);
            }
            self.nets[net].external = false;
        }
        self.touch(cell);
    }

    /// The plugs referring to `net` on every instance of its cell.
    pub fn slave_plugs(&self, net: NetId) -> Vec<ComponentId> {
        let Some(n) = self.nets.get(net) else {
            return Vec::new();
        };
        self.cells[n.cell]
            .slave_instances
            .iter()
            .filter_map(|inst| self.instances[inst].plugs.get(&net))
            .collect()
    }

    /// Adds an alias name resolving to `net` in its cell.
    ///
    /// Returns `false` if the name is already the net's name or one of its
    /// aliases. Fails if another net or alias of the cell uses the name.
    pub fn add_net_alias(&mut self, net: NetId, name: impl Into<Name>) -> Result<bool> {
        let name = name.into();
        let n = self.check_net(net)?;
        if n.name == name || n.aliases.contains(&name) {
            return Ok(false);
        }
        let cell = n.cell;
        self.check_net_name_free(cell, name)?;
        self.nets[net].aliases.insert(name);
        self.cells[cell].net_aliases.insert(name, net);
        Ok(true)
    }

    /// Removes an alias of `net`. Returns `true` if it existed.
    pub fn remove_net_alias(&mut self, net: NetId, name: impl Into<Name>) -> Result<bool> {
        let name = name.into();
        self.check_net(net)?;
        if !self.nets[net].aliases.shift_remove(&name) {
            return Ok(false);
        }
        let cell = self.nets[net].cell;
        self.cells[cell].net_aliases.shift_remove(&name);
        Ok(true)
    }

    /// Returns `true` if `name` is an alias of `net`.
    pub fn is_net_alias(&self, net: NetId, name: impl Into<Name>) -> bool {
        let name = name.into();
        self.nets.get(net).is_some_and(|n| n.aliases.contains(&name))
    }

    /// Removes every alias of `net` from its cell.
    pub(crate) fn clear_net_aliases(&mut self, net: NetId) {
        let Some(n) = self.nets.get_mut(net) else {
            return;
        };
        let cell = n.cell;
        let aliases = std::mem::take(&mut n.aliases);
        if let Some(c) = self.cells.get_mut(cell) {
            for alias in aliases {
                c.net_aliases.shift_remove(&alias);
            }
        }
    }

    /// Moves everything connected to `from` onto `into` and destroys `from`.
    ///
    /// Components, rubbers and aliases move; the name of `from` becomes an
    /// alias of `into`. On every instance of the cell, whatever the plug of
    /// `from` was connected to is connected to the plug of `into` as well,
    /// merging upper nets where both plugs were connected.
    pub fn merge_nets(&mut self, into: NetId, from: NetId) -> Result<()> {
        let i = self.check_net(into)?;
        let f = self.check_net(from)?;
        if into == from {
            return Ok(());
        }
        if i.cell != f.cell {
            return Err(Error::CellMismatch {
                what: "net",
                name: f.name,
                cell: self.cells[i.cell].name,
            });
        }
        self.with_session(|db| {
            db.merge_nets_inner(into, from);
            Ok(())
        })
    }

    fn merge_nets_inner(&mut self, into: NetId, from: NetId) {
        let cell = self.nets[into].cell;
        event!(
            Level::DEBUG,
            into = %self.nets[into].name,
            from = %self.nets[from].name,
            "merging nets"
        );

        for c in self.nets[from].components.to_vec() {
            self.nets[from].components.remove(c);
            self.nets[into].components.insert(c);
            self.components[c].net = Some(into);
        }
        for r in self.nets[from].rubbers.to_vec() {
            self.nets[from].rubbers.remove(r);
            self.nets[into].rubbers.insert(r);
            self.rubbers[r].net = into;
        }
        let from_name = self.nets[from].name;
        let aliases: Vec<Name> = self.nets[from].aliases.iter().copied().collect();
        self.clear_net_aliases(from);

        if self.nets[from].external {
            if !self.nets[into].external {
                self.set_external_inner(into, true);
            }
            for inst in self.cells[cell].slave_instances.to_vec() {
                let (Some(from_plug), Some(into_plug)) = (
                    self.instances[inst].plugs.get(&from),
                    self.instances[inst].plugs.get(&into),
                ) else {
                    continue;
                };
                match (self.components[from_plug].net, self.components[into_plug].net) {
                    (Some(upper), None) => self.connect_plug(into_plug, Some(upper)),
                    (Some(upper_from), Some(upper_into)) if upper_from != upper_into => {
                        self.merge_nets_inner(upper_into, upper_from)
                    }
                    _ => {}
                }
            }
        }

        self.destroy_net_inner(from);
        for alias in std::iter::once(from_name).chain(aliases) {
            if self.check_net_name_free(cell, alias).is_ok() {
                self.nets[into].aliases.insert(alias);
                self.cells[cell].net_aliases.insert(alias, into);
            }
        }
        self.touch(cell);
    }

    /// Destroys a net with its components and rubbers, and the plugs
    /// referring to it from instances of its cell.
    pub fn destroy_net(&mut self, net: NetId) -> Result<()> {
        self.check_net(net)?;
        self.with_session(|db| {
            db.destroy_net_inner(net);
            Ok(())
        })
    }

    pub(crate) fn destroy_net_inner(&mut self, net: NetId) {
        let Some(n) = self.nets.get(net) else {
            return;
        };
        let cell = n.cell;
        for r in n.rubbers.to_vec() {
            self.destroy_rubber_inner(r);
        }
        for c in self.nets[net].components.to_vec() {
            if matches!(self.components[c].kind, ComponentKind::Plug { .. }) {
                self.connect_plug(c, None);
            } else {
                self.destroy_component_inner(c);
            }
        }
        for plug in self.slave_plugs(net) {
            self.destroy_component_inner(plug);
        }
        self.clear_net_aliases(net);
        self.cells[cell].nets.remove(net);
        self.remove_slave_entity(cell, EntityId::Net(net));
        self.nets.remove(net);
        self.touch(cell);
    }

    /// The components of `net`.
    pub fn net_components(&self, net: NetId) -> Vec<ComponentId> {
        self.nets[net].components.to_vec()
    }

    fn net_components_where(
        &self,
        net: NetId,
        pred: impl Fn(&ComponentKind) -> bool,
    ) -> Vec<ComponentId> {
        self.nets[net]
            .components
            .iter()
            .filter(|&c| pred(&self.components[c].kind))
            .collect()
    }

    /// The routing pads of `net`.
    pub fn net_routing_pads(&self, net: NetId) -> Vec<ComponentId> {
        self.net_components_where(net, |k| matches!(k, ComponentKind::RoutingPad { .. }))
    }

    /// The plugs connected to `net`.
    pub fn net_plugs(&self, net: NetId) -> Vec<ComponentId> {
        self.net_components_where(net, |k| matches!(k, ComponentKind::Plug { .. }))
    }

    /// The pins of `net`.
    pub fn net_pins(&self, net: NetId) -> Vec<ComponentId> {
        self.net_components_where(net, |k| matches!(k, ComponentKind::Pin { .. }))
    }

    /// The external components of `net`.
    pub fn net_external_components(&self, net: NetId) -> Vec<ComponentId> {
        self.nets[net]
            .components
            .iter()
            .filter(|&c| self.components[c].external)
            .collect()
    }

    /// The union of the bounding boxes of the components of `net`.
    pub fn net_bounding_box(&self, net: NetId) -> Option<Rect> {
        self.nets
            .get(net)?
            .components
            .iter()
            .fold(None, |bbox: Option<Rect>, c| {
                bbox.bounding_union(&self.component_bounding_box(c))
            })
    }
}
