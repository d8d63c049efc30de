//! Components, rubbers and markers.
//!
//! Components are the geometric members of nets. Every component also sits
//! on a body-hook ring: attaching two components splices their rings, so
//! connected components can be walked from any of them.

use geometry::bbox::BoundingUnion;
use geometry::point::Point;
use geometry::rect::Rect;
use geometry::transform::Transform;
use indexmap::IndexSet;
use tracing::{event, Level};

use crate::error::{Error, Result};
use crate::name::Name;
use crate::occurrence::{EntityId, Occurrence};
use crate::{CellId, ComponentId, Database, GoId, InstanceId, LayerId, MarkerId, NetId, RubberId};

/// The shape and role of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// A rectangular via or contact.
    Contact {
        /// The layer.
        layer: LayerId,
        /// The center point.
        center: Point,
        /// The width.
        width: i64,
        /// The height.
        height: i64,
    },
    /// A horizontal or vertical wire segment.
    Wire {
        /// The layer.
        layer: LayerId,
        /// The first end point.
        source: Point,
        /// The second end point.
        target: Point,
        /// The wire width.
        width: i64,
    },
    /// Named terminal geometry.
    Pin {
        /// The layer.
        layer: LayerId,
        /// The pin name.
        name: Name,
        /// The pin shape.
        rect: Rect,
    },
    /// The connection point of an instance for an external net of its master.
    Plug {
        /// The instance owning the plug.
        instance: InstanceId,
        /// The external net of the master.
        master_net: NetId,
    },
    /// A terminal standing for an occurrence found below the net's cell.
    RoutingPad {
        /// The occurrence, relative to the net's cell.
        occurrence: Occurrence,
        /// The layer of the occurrence, if it is a layered component.
        layer: Option<LayerId>,
    },
}

/// A geometric member of a net.
#[derive(Debug)]
pub struct Component {
    pub(crate) cell: CellId,
    pub(crate) net: Option<NetId>,
    pub(crate) kind: ComponentKind,
    pub(crate) external: bool,
    /// Next component on the body-hook ring. Points at itself when alone.
    pub(crate) ring_next: ComponentId,
    pub(crate) anchor: Option<ComponentId>,
    /// Components anchored on this one.
    pub(crate) slaves: IndexSet<ComponentId>,
    pub(crate) rubber: Option<RubberId>,
}

impl Component {
    pub(crate) fn new(id: ComponentId, cell: CellId, net: Option<NetId>, kind: ComponentKind) -> Self {
        Self {
            cell,
            net,
            kind,
            external: false,
            ring_next: id,
            anchor: None,
            slaves: IndexSet::new(),
            rubber: None,
        }
    }

    /// The cell owning the component.
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The net of the component. Only plugs may be unconnected.
    #[inline]
    pub fn net(&self) -> Option<NetId> {
        self.net
    }

    /// The kind of component.
    #[inline]
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Returns `true` if the component is terminal geometry of its net.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// The component this one is anchored on.
    #[inline]
    pub fn anchor(&self) -> Option<ComponentId> {
        self.anchor
    }

    /// Components anchored on this one.
    pub fn slave_hooks(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.slaves.iter().copied()
    }

    /// The rubber holding this component, if any.
    #[inline]
    pub fn rubber(&self) -> Option<RubberId> {
        self.rubber
    }

    /// The layer the component is drawn on.
    pub fn layer(&self) -> Option<LayerId> {
        match self.kind {
            ComponentKind::Contact { layer, .. }
            | ComponentKind::Wire { layer, .. }
            | ComponentKind::Pin { layer, .. } => Some(layer),
            ComponentKind::RoutingPad { layer, .. } => layer,
            ComponentKind::Plug { .. } => None,
        }
    }

    /// Returns `true` for plugs.
    #[inline]
    pub fn is_plug(&self) -> bool {
        matches!(self.kind, ComponentKind::Plug { .. })
    }

    /// Returns `true` for routing pads.
    #[inline]
    pub fn is_routing_pad(&self) -> bool {
        matches!(self.kind, ComponentKind::RoutingPad { .. })
    }
}

/// A group of components of one net that must be connected.
#[derive(Debug)]
pub struct Rubber {
    pub(crate) net: NetId,
    pub(crate) hooks: IndexSet<ComponentId>,
}

impl Rubber {
    /// The net of the rubber.
    #[inline]
    pub fn net(&self) -> NetId {
        self.net
    }

    /// The components held by the rubber.
    pub fn hooks(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.hooks.iter().copied()
    }
}

/// A named reference point of a cell.
#[derive(Debug)]
pub struct Marker {
    pub(crate) cell: CellId,
    pub(crate) name: Name,
    pub(crate) position: Point,
}

impl Marker {
    /// The cell owning the marker.
    #[inline]
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// The marker name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The marker position.
    #[inline]
    pub fn position(&self) -> Point {
        self.position
    }

    /// A degenerate box at the marker position.
    #[inline]
    pub fn bounding_box(&self) -> Rect {
        Rect::from_point(self.position)
    }
}

impl Database {
    pub(crate) fn check_component(&self, id: ComponentId) -> Result<&Component> {
        self.components.get(id).ok_or(Error::StaleId("component"))
    }

    /// Returns the component with the given ID.
    #[inline]
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id]
    }

    /// Returns the component with the given ID, or `None` if it was destroyed.
    #[inline]
    pub fn try_component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    fn check_layer(&self, layer: LayerId) -> Result<()> {
        if self.layers.contains_key(layer) {
            Ok(())
        } else {
            Err(Error::StaleId("layer"))
        }
    }

    pub(crate) fn create_component_inner(&mut self, net: NetId, kind: ComponentKind) -> ComponentId {
        let cell = self.nets[net].cell;
        let id = self
            .components
            .insert_with_key(|id| Component::new(id, cell, Some(net), kind));
        self.nets[net].components.insert(id);
        let go = GoId::Component(id);
        if self.should_materialize(go) {
            self.materialize_go(go);
        }
        self.touch(cell);
        id
    }

    /// Creates a contact on `net`.
    pub fn create_contact(
        &mut self,
        net: NetId,
        layer: LayerId,
        center: Point,
        width: i64,
        height: i64,
    ) -> Result<ComponentId> {
        self.check_net(net)?;
        self.check_layer(layer)?;
        self.with_session(|db| {
            Ok(db.create_component_inner(
                net,
                ComponentKind::Contact {
                    layer,
                    center,
                    width,
                    height,
                },
            ))
        })
    }

    /// Creates a wire segment on `net`.
    pub fn create_wire(
        &mut self,
        net: NetId,
        layer: LayerId,
        source: Point,
        target: Point,
        width: i64,
    ) -> Result<ComponentId> {
        self.check_net(net)?;
        self.check_layer(layer)?;
        self.with_session(|db| {
            Ok(db.create_component_inner(
                net,
                ComponentKind::Wire {
                    layer,
                    source,
                    target,
                    width,
                },
            ))
        })
    }

    /// Creates an external pin on `net`.
    pub fn create_pin(
        &mut self,
        net: NetId,
        name: impl Into<Name>,
        layer: LayerId,
        rect: Rect,
    ) -> Result<ComponentId> {
        let name = name.into();
        self.check_net(net)?;
        self.check_layer(layer)?;
        self.with_session(|db| {
            let pin = db.create_component_inner(net, ComponentKind::Pin { layer, name, rect });
            db.components[pin].external = true;
            Ok(pin)
        })
    }

    /// Marks a component as terminal geometry of its net.
    pub fn set_component_external(&mut self, component: ComponentId, external: bool) -> Result<()> {
        self.check_component(component)?;
        self.components[component].external = external;
        Ok(())
    }

    /// Moves a contact, wire or pin.
    pub fn translate_component(&mut self, component: ComponentId, dx: i64, dy: i64) -> Result<()> {
        let c = self.check_component(component)?;
        if matches!(
            c.kind,
            ComponentKind::Plug { .. } | ComponentKind::RoutingPad { .. }
        ) {
            return Err(Error::WrongComponentKind("contact, wire or pin"));
        }
        self.with_session(|db| {
            db.invalidate(GoId::Component(component));
            match &mut db.components[component].kind {
                ComponentKind::Contact { center, .. } => {
                    *center = center.translated(dx, dy);
                }
                ComponentKind::Wire { source, target, .. } => {
                    *source = source.translated(dx, dy);
                    *target = target.translated(dx, dy);
                }
                ComponentKind::Pin { rect, .. } => *rect = rect.translated(dx, dy),
                ComponentKind::Plug { .. } | ComponentKind::RoutingPad { .. } => {}
            }
            Ok(())
        })
    }

    /// The footprint of a component in its cell.
    ///
    /// A plug covers the external components of its master net, placed by
    /// the instance. A routing pad covers its occurrence.
    pub fn component_bounding_box(&self, component: ComponentId) -> Option<Rect> {
        let c = self.components.get(component)?;
        match &c.kind {
            ComponentKind::Contact {
                center,
                width,
                height,
                ..
            } => Some(Rect::from_center(*center, *width, *height)),
            ComponentKind::Wire {
                source,
                target,
                width,
                ..
            } => Rect::new(*source, *target).inflated(width / 2),
            ComponentKind::Pin { rect, .. } => Some(*rect),
            ComponentKind::Plug {
                instance,
                master_net,
            } => {
                let i = self.instances.get(*instance)?;
                let master_net = self.nets.get(*master_net)?;
                master_net
                    .components
                    .iter()
                    .filter(|&mc| self.components[mc].external)
                    .fold(None, |bbox: Option<Rect>, mc| {
                        bbox.bounding_union(&self.component_bounding_box(mc))
                    })
                    .map(|bbox| bbox.transform(i.transformation))
            }
            ComponentKind::RoutingPad { occurrence, .. } => {
                self.occurrence_bounding_box(*occurrence)
            }
        }
    }

    /// Connects a plug to a net of its instance's owner cell, or disconnects it.
    pub fn set_plug_net(&mut self, plug: ComponentId, net: Option<NetId>) -> Result<()> {
        let p = self.check_component(plug)?;
        if !p.is_plug() {
            return Err(Error::WrongComponentKind("plug"));
        }
        if let Some(net) = net {
            let n = self.check_net(net)?;
            if n.cell != p.cell {
                return Err(Error::CellMismatch {
                    what: "net",
                    name: n.name,
                    cell: self.cells[p.cell].name,
                });
            }
        }
        self.with_session(|db| {
            db.connect_plug(plug, net);
            Ok(())
        })
    }

    pub(crate) fn connect_plug(&mut self, plug: ComponentId, net: Option<NetId>) {
        let old = self.components[plug].net;
        if old == net {
            return;
        }
        if let Some(old) = old {
            if let Some(n) = self.nets.get_mut(old) {
                n.components.remove(plug);
            }
        }
        if let Some(net) = net {
            self.nets[net].components.insert(plug);
        }
        self.components[plug].net = net;
        self.touch(self.components[plug].cell);
    }

    /// Splices the ring of `component` into the ring of `master`.
    ///
    /// Attaching two components already on one ring does nothing.
    pub fn attach(&mut self, component: ComponentId, master: ComponentId) -> Result<()> {
        let c = self.check_component(component)?;
        let m = self.check_component(master)?;
        if c.cell != m.cell {
            return Err(Error::CellMismatch {
                what: "component",
                name: Name::new("hook"),
                cell: self.cells[m.cell].name,
            });
        }
        self.attach_inner(component, master);
        Ok(())
    }

    pub(crate) fn attach_inner(&mut self, component: ComponentId, master: ComponentId) {
        if self.same_ring(component, master) {
            return;
        }
        let next_c = self.components[component].ring_next;
        let next_m = self.components[master].ring_next;
        self.components[component].ring_next = next_m;
        self.components[master].ring_next = next_c;
    }

    fn same_ring(&self, a: ComponentId, b: ComponentId) -> bool {
        let mut cursor = a;
        loop {
            if cursor == b {
                return true;
            }
            cursor = self.components[cursor].ring_next;
            if cursor == a {
                return false;
            }
        }
    }

    /// Takes a component off its ring.
    pub fn detach(&mut self, component: ComponentId) -> Result<()> {
        self.check_component(component)?;
        self.detach_inner(component);
        Ok(())
    }

    pub(crate) fn detach_inner(&mut self, component: ComponentId) {
        let next = self.components[component].ring_next;
        if next == component {
            return;
        }
        let mut prev = next;
        while self.components[prev].ring_next != component {
            prev = self.components[prev].ring_next;
        }
        self.components[prev].ring_next = next;
        self.components[component].ring_next = component;
    }

    /// Returns `true` if the component shares its ring with another one.
    pub fn is_attached(&self, component: ComponentId) -> bool {
        self.components
            .get(component)
            .is_some_and(|c| c.ring_next != component)
    }

    /// The components on the ring of `component`, starting with it.
    pub fn ring(&self, component: ComponentId) -> Vec<ComponentId> {
        let mut ring = vec![component];
        let mut cursor = self.components[component].ring_next;
        while cursor != component {
            ring.push(cursor);
            cursor = self.components[cursor].ring_next;
        }
        ring
    }

    /// Anchors `component` on `anchor`, making it a slave hook of it.
    pub fn set_anchor(&mut self, component: ComponentId, anchor: Option<ComponentId>) -> Result<()> {
        let c = self.check_component(component)?;
        if let Some(anchor) = anchor {
            let a = self.check_component(anchor)?;
            if a.cell != c.cell {
                return Err(Error::CellMismatch {
                    what: "component",
                    name: Name::new("anchor"),
                    cell: self.cells[c.cell].name,
                });
            }
        }
        if let Some(old) = self.components[component].anchor.take() {
            self.components[old].slaves.shift_remove(&component);
        }
        if let Some(anchor) = anchor {
            self.components[anchor].slaves.insert(component);
        }
        self.components[component].anchor = anchor;
        Ok(())
    }

    /// Destroys a component. Plugs live and die with their instance.
    pub fn destroy_component(&mut self, component: ComponentId) -> Result<()> {
        if self.check_component(component)?.is_plug() {
            return Err(Error::WrongComponentKind("contact, wire, pin or routing pad"));
        }
        self.with_session(|db| {
            db.destroy_component_inner(component);
            Ok(())
        })
    }

    pub(crate) fn destroy_component_inner(&mut self, component: ComponentId) {
        let Some(c) = self.components.get(component) else {
            return;
        };
        let cell = c.cell;
        let go = GoId::Component(component);
        self.unmaterialize_go(go);
        self.session.invalidated.shift_remove(&go);
        self.drop_from_extension_slices(cell, go);
        self.detach_inner(component);

        if let Some(anchor) = self.components[component].anchor {
            if let Some(a) = self.components.get_mut(anchor) {
                a.slaves.shift_remove(&component);
            }
        }
        for slave in std::mem::take(&mut self.components[component].slaves) {
            if let Some(s) = self.components.get_mut(slave) {
                s.anchor = None;
            }
        }
        if let Some(rubber) = self.components[component].rubber {
            if let Some(r) = self.rubbers.get_mut(rubber) {
                r.hooks.shift_remove(&component);
            }
        }
        if let Some(net) = self.components[component].net {
            if let Some(n) = self.nets.get_mut(net) {
                n.components.remove(component);
            }
        }
        match self.components[component].kind {
            ComponentKind::Plug { instance, .. } => {
                if let Some(i) = self.instances.get_mut(instance) {
                    i.plugs.remove(component);
                }
            }
            ComponentKind::RoutingPad { .. } => {
                self.remove_slave_entity(cell, EntityId::Component(component));
            }
            _ => {}
        }
        self.components.remove(component);
        self.touch(cell);
    }

    /// Creates a rubber on `net` holding `hooks`.
    ///
    /// Every hook must be a component of `net`; a hook held by another
    /// rubber moves to the new one.
    pub fn create_rubber(
        &mut self,
        net: NetId,
        hooks: impl IntoIterator<Item = ComponentId>,
    ) -> Result<RubberId> {
        let n = self.check_net(net)?;
        let hooks: IndexSet<ComponentId> = hooks.into_iter().collect();
        for &hook in &hooks {
            self.check_component(hook)?;
            if !n.components.contains(hook) {
                return Err(Error::CellMismatch {
                    what: "component",
                    name: Name::new("hook"),
                    cell: self.cells[n.cell].name,
                });
            }
        }
        let rubber = self.rubbers.insert(Rubber {
            net,
            hooks: IndexSet::new(),
        });
        for hook in hooks {
            if let Some(old) = self.components[hook].rubber.replace(rubber) {
                self.rubbers[old].hooks.shift_remove(&hook);
            }
            self.rubbers[rubber].hooks.insert(hook);
        }
        self.nets[net].rubbers.insert(rubber);
        Ok(rubber)
    }

    /// Returns the rubber with the given ID.
    #[inline]
    pub fn rubber(&self, id: RubberId) -> &Rubber {
        &self.rubbers[id]
    }

    /// The union of the footprints of the rubber's hooks.
    pub fn rubber_bounding_box(&self, rubber: RubberId) -> Option<Rect> {
        self.rubbers
            .get(rubber)?
            .hooks
            .iter()
            .fold(None, |bbox: Option<Rect>, &c| {
                bbox.bounding_union(&self.component_bounding_box(c))
            })
    }

    /// Destroys a rubber, releasing its hooks.
    pub fn destroy_rubber(&mut self, rubber: RubberId) -> Result<()> {
        if !self.rubbers.contains_key(rubber) {
            return Err(Error::StaleId("rubber"));
        }
        self.destroy_rubber_inner(rubber);
        Ok(())
    }

    pub(crate) fn destroy_rubber_inner(&mut self, rubber: RubberId) {
        let Some(r) = self.rubbers.remove(rubber) else {
            return;
        };
        for hook in r.hooks {
            if let Some(c) = self.components.get_mut(hook) {
                c.rubber = None;
            }
        }
        if let Some(n) = self.nets.get_mut(r.net) {
            n.rubbers.remove(rubber);
        }
    }

    /// Creates a marker in `cell`.
    pub fn create_marker(
        &mut self,
        cell: CellId,
        name: impl Into<Name>,
        position: Point,
    ) -> Result<MarkerId> {
        let name = name.into();
        self.check_cell(cell)?;
        self.with_session(|db| {
            let marker = db.markers.insert(Marker {
                cell,
                name,
                position,
            });
            db.cells[cell].markers.insert(marker);
            let go = GoId::Marker(marker);
            if db.should_materialize(go) {
                db.materialize_go(go);
            }
            db.touch(cell);
            event!(Level::TRACE, marker = %name, "created marker");
            Ok(marker)
        })
    }

    /// Returns the marker with the given ID.
    #[inline]
    pub fn marker(&self, id: MarkerId) -> &Marker {
        &self.markers[id]
    }

    /// Destroys a marker.
    pub fn destroy_marker(&mut self, marker: MarkerId) -> Result<()> {
        if !self.markers.contains_key(marker) {
            return Err(Error::StaleId("marker"));
        }
        self.with_session(|db| {
            db.destroy_marker_inner(marker);
            Ok(())
        })
    }

    pub(crate) fn destroy_marker_inner(&mut self, marker: MarkerId) {
        let Some(cell) = self.markers.get(marker).map(|m| m.cell) else {
            return;
        };
        let go = GoId::Marker(marker);
        self.unmaterialize_go(go);
        self.session.invalidated.shift_remove(&go);
        self.drop_from_extension_slices(cell, go);
        if let Some(c) = self.cells.get_mut(cell) {
            c.markers.remove(marker);
        }
        self.markers.remove(marker);
        self.touch(cell);
    }
}
