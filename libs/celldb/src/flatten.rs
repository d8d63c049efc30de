//! Net flattening and routing pad rings.
//!
//! Flattening materializes the connectivity of every hyper-net visible from
//! a cell as routing pads on nets of that cell: hyper-nets rooted below an
//! instance get a deep net, hyper-nets rooted in the cell get routing pads
//! on their own net.

use bitflags::bitflags;
use tracing::{event, span, Level};

use crate::cell::CellFlags;
use crate::component::ComponentKind;
use crate::diagnostics::{Cause, Severity};
use crate::error::{Error, Result};
use crate::hypernet::HyperNet;
use crate::name::Name;
use crate::occurrence::{EntityId, Occurrence};
use crate::path::Path;
use crate::{CellId, ComponentId, Database, GoId, NetId, SharedPathId};

bitflags! {
    /// Options of [`Database::flatten_nets`] and [`Database::create_routing_pad_rings`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FlattenFlags: u32 {
        /// Leave clock nets alone.
        const NO_CLOCK_FLATTEN            = 1 << 0;
        /// Report routing pads created through unplaced instances.
        const WARN_ON_UNPLACED_INSTANCES  = 1 << 1;
        /// Chain the routing pads of ordinary nets into rings.
        const BUILD_RINGS                 = 1 << 2;
        /// Chain the routing pads of global clock nets into rings.
        const BUILD_CLOCK_RINGS           = 1 << 3;
        /// Chain the routing pads of global supply nets into rings.
        const BUILD_SUPPLY_RINGS          = 1 << 4;
        /// Every ring-building flag.
        const MASK_RINGS = Self::BUILD_RINGS.bits()
            | Self::BUILD_CLOCK_RINGS.bits()
            | Self::BUILD_SUPPLY_RINGS.bits();
    }
}

impl Database {
    /// Flattens every hyper-net visible from `cell` into routing pads.
    ///
    /// Nets of `cell` that already hold a routing pad are considered
    /// flattened and skipped, so flattening twice creates nothing new.
    pub fn flatten_nets(&mut self, cell: CellId, flags: FlattenFlags) -> Result<()> {
        self.check_cell(cell)?;
        self.with_session(|db| {
            db.flatten_nets_inner(cell, flags);
            Ok(())
        })
    }

    fn flatten_nets_inner(&mut self, cell: CellId, flags: FlattenFlags) {
        let _guard = span!(Level::INFO, "flattening nets", cell = %self.cells[cell].name).entered();

        self.cells[cell].flags.insert(CellFlags::FLATTENED_NETS);

        let mut nested = Vec::new();
        let mut top = Vec::new();
        for occurrence in self.hyper_net_root_net_occurrences(cell) {
            let Some(net) = occurrence.net() else {
                continue;
            };
            if self.nets[net].is_clock() && flags.contains(FlattenFlags::NO_CLOCK_FLATTEN) {
                continue;
            }
            if !occurrence.path.is_empty() {
                let name = self.occurrence_name(occurrence);
                match self.net_by_name(cell, name.as_str()) {
                    Some(duplicate) => {
                        event!(Level::TRACE, net = %self.nets[duplicate].name, "found existing deep net");
                    }
                    None => nested.push(occurrence),
                }
            } else if self.net_routing_pads(net).is_empty() {
                top.push(occurrence);
            }
        }
        event!(
            Level::DEBUG,
            nested = nested.len(),
            top = top.len(),
            "collected hyper-nets"
        );

        for occurrence in nested {
            let deep_net = self.create_deep_net(cell, occurrence);
            for plug in self.leaf_plug_occurrences(&HyperNet::new(occurrence)) {
                self.create_best_routing_pad(deep_net, plug, flags);
            }
        }

        for occurrence in top {
            let Some(net) = occurrence.net() else {
                continue;
            };
            for plug in self.leaf_plug_occurrences(&HyperNet::new(occurrence)) {
                self.create_best_routing_pad(net, plug, flags);
            }
            for pin in self.net_pins(net) {
                self.create_routing_pad_inner(net, Occurrence::new(pin, Path::EMPTY));
            }
        }
    }

    /// Creates the deep net of `cell` standing for a nested root net occurrence.
    fn create_deep_net(&mut self, cell: CellId, occurrence: Occurrence) -> NetId {
        let name = Name::new(self.occurrence_name(occurrence));
        let deep_net = self.create_net_inner(cell, name, Some(occurrence));
        if let Some(root) = occurrence.net() {
            self.nets[deep_net].net_type = self.nets[root].net_type;
        }
        if let Some(head) = self.path_head_instance(occurrence.path) {
            self.add_slave_entity(cell, head, EntityId::Net(deep_net));
        }
        event!(Level::DEBUG, net = %name, "created deep net");
        deep_net
    }

    /// The deep net of `cell` whose hyper-net contains `leaf_net` seen through `path`.
    ///
    /// Only valid once the nets of `cell` have been flattened.
    pub fn get_deep_net(&mut self, cell: CellId, path: Path, leaf_net: NetId) -> Option<NetId> {
        if !self.cells.get(cell)?.flags.contains(CellFlags::FLATTENED_NETS) {
            return None;
        }
        let root = self.hyper_net_root_net_occurrence(Occurrence::new(leaf_net, path));
        self.cells[cell]
            .nets
            .iter()
            .find(|&n| self.nets[n].root_occurrence == Some(root))
    }

    /// Creates a routing pad on `net` for `occurrence`, which must be seen
    /// from the cell of `net`.
    pub fn create_routing_pad(&mut self, net: NetId, occurrence: Occurrence) -> Result<ComponentId> {
        let n = self.check_net(net)?;
        let entity_cell = self
            .entity_cell(occurrence.entity)
            .ok_or(Error::StaleId("occurrence entity"))?;
        let owner = self
            .occurrence_owner_cell(occurrence)
            .unwrap_or(entity_cell);
        if owner != n.cell || self.path_master_cell(occurrence.path).unwrap_or(owner) != entity_cell {
            return Err(Error::CellMismatch {
                what: "occurrence of net",
                name: n.name,
                cell: self.cells[n.cell].name,
            });
        }
        self.with_session(|db| Ok(db.create_routing_pad_inner(net, occurrence)))
    }

    pub(crate) fn create_routing_pad_inner(&mut self, net: NetId, occurrence: Occurrence) -> ComponentId {
        let layer = occurrence
            .component()
            .and_then(|c| self.components.get(c))
            .and_then(|c| c.layer());
        let rp = self.create_component_inner(net, ComponentKind::RoutingPad { occurrence, layer });
        if let Some(head) = self.path_head_instance(occurrence.path) {
            let cell = self.nets[net].cell;
            self.add_slave_entity(cell, head, EntityId::Component(rp));
        }
        rp
    }

    /// The routing pads whose footprint follows `go`: those seen through an
    /// instance, or those standing for a component.
    pub(crate) fn dependent_routing_pads(&self, go: GoId) -> Vec<ComponentId> {
        match go {
            GoId::Instance(instance) => {
                self.routing_pads_on_paths(&self.paths_through(instance), |_| true)
            }
            GoId::Component(component) => {
                let Some(c) = self.components.get(component) else {
                    return Vec::new();
                };
                if c.is_routing_pad() || c.is_plug() {
                    return Vec::new();
                }
                let entity = EntityId::Component(component);
                let local = Occurrence::new(component, Path::EMPTY);
                let mut pads: Vec<ComponentId> = self.cells[c.cell]
                    .nets
                    .iter()
                    .flat_map(move |n| self.nets[n].components.iter())
                    .filter(|&rp| {
                        matches!(
                            self.components[rp].kind,
                            ComponentKind::RoutingPad { occurrence, .. } if occurrence == local
                        )
                    })
                    .collect();
                let paths: Vec<SharedPathId> = self.cells[c.cell]
                    .slave_instances
                    .iter()
                    .flat_map(|s| self.paths_through(s))
                    .collect();
                pads.extend(self.routing_pads_on_paths(&paths, |o| o.entity == entity));
                pads
            }
            GoId::Marker(_) => Vec::new(),
        }
    }

    fn routing_pads_on_paths(
        &self,
        paths: &[SharedPathId],
        keep: impl Fn(&Occurrence) -> bool,
    ) -> Vec<ComponentId> {
        let mut pads = Vec::new();
        for &sp in paths {
            let head = self.shared_paths[sp].head;
            let owner = self.instances[head].cell;
            let Some(entities) = self.cells[owner].slave_entities.get(&head) else {
                continue;
            };
            for &entity in entities {
                let EntityId::Component(rp) = entity else {
                    continue;
                };
                if let ComponentKind::RoutingPad { occurrence, .. } = self.components[rp].kind {
                    if occurrence.path == Path(Some(sp)) && keep(&occurrence) {
                        pads.push(rp);
                    }
                }
            }
        }
        pads
    }

    /// Creates a routing pad for a plug occurrence, placed on the biggest
    /// external component of the plug's master net when there is one.
    fn create_best_routing_pad(&mut self, net: NetId, plug: Occurrence, flags: FlattenFlags) -> ComponentId {
        let occurrence = self.biggest_area_occurrence(plug);
        let rp = self.create_routing_pad_inner(net, occurrence);
        if flags.contains(FlattenFlags::WARN_ON_UNPLACED_INSTANCES)
            && !self.is_placed_occurrence(occurrence)
        {
            let cause = Cause::UnplacedOccurrence {
                net: self.nets[net].name,
                occurrence: self.occurrence_name(occurrence),
            };
            self.report(cause, Severity::Warning);
        }
        rp
    }

    fn biggest_area_occurrence(&mut self, plug: Occurrence) -> Occurrence {
        let Some(ComponentKind::Plug {
            instance,
            master_net,
        }) = plug.component().map(|c| self.components[c].kind.clone())
        else {
            return plug;
        };
        let best = self
            .net_external_components(master_net)
            .into_iter()
            .filter_map(|c| self.component_bounding_box(c).map(|bbox| (c, bbox.area())))
            .max_by_key(|&(_, area)| area)
            .map(|(c, _)| c);
        match (best, self.path_append(plug.path, instance)) {
            (Some(component), Ok(path)) => Occurrence::new(component, path),
            _ => plug,
        }
    }

    /// Returns `true` if every instance of the occurrence path is placed.
    pub fn is_placed_occurrence(&self, occurrence: Occurrence) -> bool {
        self.path_instances(occurrence.path)
            .into_iter()
            .all(|i| self.instances[i].is_placed())
    }

    /// Chains the routing pads of the nets of `cell` into rings.
    ///
    /// Ordinary nets are handled with [`FlattenFlags::BUILD_RINGS`]; global
    /// nets only when they are clocks or supplies and the matching flag is
    /// set. Plugs of those nets leave their rings first; plugs with
    /// anchored components are reported and left alone.
    pub fn create_routing_pad_rings(&mut self, cell: CellId, flags: FlattenFlags) -> Result<()> {
        self.check_cell(cell)?;
        let flags = flags & FlattenFlags::MASK_RINGS;
        self.with_session(|db| {
            let _guard =
                span!(Level::INFO, "building routing pad rings", cell = %db.cells[cell].name)
                    .entered();
            for net in db.cells[cell].nets.to_vec() {
                let n = &db.nets[net];
                let build_ring = if n.global {
                    (flags.contains(FlattenFlags::BUILD_CLOCK_RINGS) && n.is_clock())
                        || (flags.contains(FlattenFlags::BUILD_SUPPLY_RINGS) && n.is_supply())
                } else {
                    flags.contains(FlattenFlags::BUILD_RINGS)
                };
                if !build_ring {
                    continue;
                }
                db.build_routing_pad_ring(net);
            }
            Ok(())
        })
    }

    fn build_routing_pad_ring(&mut self, net: NetId) {
        for plug in self.net_plugs(net) {
            if self.components[plug].slaves.is_empty() {
                self.detach_inner(plug);
                continue;
            }
            let ComponentKind::Plug {
                instance,
                master_net,
            } = self.components[plug].kind
            else {
                continue;
            };
            let cause = Cause::PlugHasSlaveHooks {
                instance: self.instances[instance].name,
                net: self.nets[master_net].name,
            };
            self.report(cause, Severity::Error);
        }

        let mut previous: Option<ComponentId> = None;
        for rp in self.net_routing_pads(net) {
            if let Some(prev) = previous {
                if !self.is_attached(rp) || !self.is_attached(prev) {
                    self.attach_inner(rp, prev);
                }
            }
            previous = Some(rp);
        }
        self.touch(self.nets[net].cell);
    }
}
