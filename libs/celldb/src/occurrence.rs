//! Occurrences: entities seen through an instantiation path.

use arcstr::ArcStr;
use geometry::rect::Rect;
use geometry::transform::Transform;

use crate::component::ComponentKind;
use crate::name::Name;
use crate::path::Path;
use crate::{CellId, ComponentId, Database, InstanceId, MarkerId, NetId, RubberId};

/// Any entity owned by a cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// An instance.
    Instance(InstanceId),
    /// A net.
    Net(NetId),
    /// A component.
    Component(ComponentId),
    /// A marker.
    Marker(MarkerId),
    /// A rubber.
    Rubber(RubberId),
}

impl From<InstanceId> for EntityId {
    fn from(value: InstanceId) -> Self {
        Self::Instance(value)
    }
}

impl From<NetId> for EntityId {
    fn from(value: NetId) -> Self {
        Self::Net(value)
    }
}

impl From<ComponentId> for EntityId {
    fn from(value: ComponentId) -> Self {
        Self::Component(value)
    }
}

impl From<MarkerId> for EntityId {
    fn from(value: MarkerId) -> Self {
        Self::Marker(value)
    }
}

impl From<RubberId> for EntityId {
    fn from(value: RubberId) -> Self {
        Self::Rubber(value)
    }
}

/// An entity as seen from the owner cell of `path`.
///
/// The entity belongs to the master cell of `path`, or to the owner cell
/// itself when the path is empty.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Occurrence {
    pub(crate) entity: EntityId,
    pub(crate) path: Path,
}

impl Occurrence {
    /// Creates an occurrence.
    pub fn new(entity: impl Into<EntityId>, path: Path) -> Self {
        Self {
            entity: entity.into(),
            path,
        }
    }

    /// The entity.
    #[inline]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The instantiation path.
    #[inline]
    pub fn path(&self) -> Path {
        self.path
    }

    /// The entity as a net, if it is one.
    pub fn net(&self) -> Option<NetId> {
        match self.entity {
            EntityId::Net(net) => Some(net),
            _ => None,
        }
    }

    /// The entity as a component, if it is one.
    pub fn component(&self) -> Option<ComponentId> {
        match self.entity {
            EntityId::Component(c) => Some(c),
            _ => None,
        }
    }
}

impl Database {
    /// The cell owning an entity, or `None` if the entity was destroyed.
    pub fn entity_cell(&self, entity: EntityId) -> Option<CellId> {
        match entity {
            EntityId::Instance(i) => self.instances.get(i).map(|i| i.cell),
            EntityId::Net(n) => self.nets.get(n).map(|n| n.cell),
            EntityId::Component(c) => self.components.get(c).map(|c| c.cell),
            EntityId::Marker(m) => self.markers.get(m).map(|m| m.cell),
            EntityId::Rubber(r) => self
                .rubbers
                .get(r)
                .and_then(|r| self.nets.get(r.net))
                .map(|n| n.cell),
        }
    }

    /// The name of an entity, for those that carry one.
    pub fn entity_name(&self, entity: EntityId) -> Option<Name> {
        match entity {
            EntityId::Instance(i) => self.instances.get(i).map(|i| i.name),
            EntityId::Net(n) => self.nets.get(n).map(|n| n.name),
            EntityId::Component(c) => match &self.components.get(c)?.kind {
                ComponentKind::Pin { name, .. } => Some(*name),
                ComponentKind::Plug { master_net, .. } => self.nets.get(*master_net).map(|n| n.name),
                _ => None,
            },
            EntityId::Marker(m) => self.markers.get(m).map(|m| m.name),
            EntityId::Rubber(_) => None,
        }
    }

    /// The bounding box of an entity in its own cell.
    pub fn entity_bounding_box(&self, entity: EntityId) -> Option<Rect> {
        match entity {
            EntityId::Instance(i) => self.instance_bounding_box(i),
            EntityId::Net(n) => self.net_bounding_box(n),
            EntityId::Component(c) => self.component_bounding_box(c),
            EntityId::Marker(m) => self.markers.get(m).map(|m| m.bounding_box()),
            EntityId::Rubber(r) => self.rubber_bounding_box(r),
        }
    }

    /// The path an entity was derived through, for routing pads and deep nets.
    pub(crate) fn entity_occurrence_path(&self, entity: EntityId) -> Option<Path> {
        match entity {
            EntityId::Net(n) => self.nets.get(n)?.root_occurrence.map(|o| o.path),
            EntityId::Component(c) => match &self.components.get(c)?.kind {
                ComponentKind::RoutingPad { occurrence, .. } => Some(occurrence.path),
                _ => None,
            },
            _ => None,
        }
    }

    /// The cell an occurrence is seen from.
    pub fn occurrence_owner_cell(&self, occurrence: Occurrence) -> Option<CellId> {
        self.path_owner_cell(occurrence.path)
            .or_else(|| self.entity_cell(occurrence.entity))
    }

    /// The path name and entity name joined by the configured separator.
    pub fn occurrence_name(&self, occurrence: Occurrence) -> ArcStr {
        let entity = self
            .entity_name(occurrence.entity)
            .map(|n| n.as_str())
            .unwrap_or("?");
        if occurrence.path.is_empty() {
            ArcStr::from(entity)
        } else {
            arcstr::format!(
                "{}{}{}",
                self.path_name(occurrence.path),
                self.config.name_separator,
                entity
            )
        }
    }

    /// The bounding box of the entity, placed in the owner cell of the path.
    pub fn occurrence_bounding_box(&self, occurrence: Occurrence) -> Option<Rect> {
        self.entity_bounding_box(occurrence.entity)
            .map(|bbox| bbox.transform(self.path_transformation(occurrence.path)))
    }
}
