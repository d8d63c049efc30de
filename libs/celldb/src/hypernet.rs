//! Hyper-nets: a net together with every net hierarchically connected to it.
//!
//! Walking a hyper-net goes down through the connected plugs of a net into
//! the external nets of the instance masters, and up from an external net
//! through the plug of the instance it is seen through.

use std::collections::HashSet;

use crate::component::ComponentKind;
use crate::occurrence::{EntityId, Occurrence};
use crate::path::Path;
use crate::{CellId, Database, InstanceId, NetId};

/// A hyper-net, identified by one of its net occurrences.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HyperNet {
    net_occurrence: Occurrence,
}

impl HyperNet {
    /// Creates the hyper-net containing `net_occurrence`.
    pub fn new(net_occurrence: Occurrence) -> Self {
        Self { net_occurrence }
    }

    /// The net occurrence the hyper-net was built from.
    #[inline]
    pub fn net_occurrence(&self) -> Occurrence {
        self.net_occurrence
    }
}

impl Database {
    /// Returns `true` if hyper-net walks descend into instances of `cell`.
    fn is_flattened_through(&self, cell: CellId) -> bool {
        let c = &self.cells[cell];
        !c.is_terminal() && !c.is_flatten_leaf()
    }

    /// Returns `true` if plugs of instances of `cell` are leaves of hyper-nets.
    fn is_leaf_master(&self, cell: CellId) -> bool {
        let c = &self.cells[cell];
        c.is_leaf() || c.is_terminal() || c.is_flatten_leaf()
    }

    /// The upper net occurrence connected to an external net seen through `path`.
    fn upper_net_occurrence(&mut self, net: NetId, path: Path) -> Option<Occurrence> {
        if !self.nets[net].external {
            return None;
        }
        let tail = self.path_tail_instance(path)?;
        let plug = self.instances[tail].plugs.get(&net)?;
        let upper = self.components[plug].net?;
        let head = self.path_head_path(path);
        Some(Occurrence::new(upper, head))
    }

    /// Every net occurrence of the hyper-net.
    pub fn hyper_net_occurrences(&mut self, hyper_net: &HyperNet) -> Vec<Occurrence> {
        let start = hyper_net.net_occurrence;
        let mut visited = HashSet::from([start]);
        let mut found = vec![start];
        let mut next = 0;
        while next < found.len() {
            let occurrence = found[next];
            next += 1;
            let Some(net) = occurrence.net() else {
                continue;
            };
            if !self.nets.contains_key(net) {
                continue;
            }

            let mut neighbors = Vec::new();
            for (instance, master_net) in self.connected_plugs(net) {
                if !self.is_flattened_through(self.instances[instance].master) {
                    continue;
                }
                if let Ok(path) = self.path_append(occurrence.path, instance) {
                    neighbors.push(Occurrence::new(master_net, path));
                }
            }
            if let Some(upper) = self.upper_net_occurrence(net, occurrence.path) {
                neighbors.push(upper);
            }
            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    found.push(neighbor);
                }
            }
        }
        found
    }

    /// The (instance, master net) pairs of the plugs connected to `net`.
    fn connected_plugs(&self, net: NetId) -> Vec<(InstanceId, NetId)> {
        self.nets[net]
            .components
            .iter()
            .filter_map(|c| match self.components[c].kind {
                ComponentKind::Plug {
                    instance,
                    master_net,
                } => Some((instance, master_net)),
                _ => None,
            })
            .collect()
    }

    /// Plug occurrences of the hyper-net on instances of leaf, terminal or
    /// flatten-leaf masters.
    pub fn leaf_plug_occurrences(&mut self, hyper_net: &HyperNet) -> Vec<Occurrence> {
        let mut plugs = Vec::new();
        for occurrence in self.hyper_net_occurrences(hyper_net) {
            let Some(net) = occurrence.net() else {
                continue;
            };
            for c in self.nets[net].components.iter() {
                if let ComponentKind::Plug { instance, .. } = self.components[c].kind {
                    if self.is_leaf_master(self.instances[instance].master) {
                        plugs.push(Occurrence::new(c, occurrence.path));
                    }
                }
            }
        }
        plugs
    }

    /// The topmost net occurrence of the hyper-net containing `occurrence`.
    ///
    /// Climbs from external nets through the plugs they are seen through,
    /// as long as those plugs are connected.
    pub fn hyper_net_root_net_occurrence(&mut self, occurrence: Occurrence) -> Occurrence {
        let mut current = occurrence;
        while let Some(net) = current.net() {
            match self.upper_net_occurrence(net, current.path) {
                Some(upper) => current = upper,
                None => break,
            }
        }
        current
    }

    /// The root net occurrence of every hyper-net visible from `cell`.
    ///
    /// These are the nets of `cell` itself, plus the nets below its
    /// instances that do not connect upward: internal nets, and external
    /// nets whose plug is unconnected. Deep nets are derived, and skipped.
    pub fn hyper_net_root_net_occurrences(&mut self, cell: CellId) -> Vec<Occurrence> {
        let mut roots: Vec<Occurrence> = self.cells[cell]
            .nets
            .iter()
            .filter(|&n| !self.nets[n].is_deep())
            .map(|n| Occurrence::new(n, Path::EMPTY))
            .collect();
        self.collect_nested_roots(cell, Path::EMPTY, &mut roots);
        roots
    }

    fn collect_nested_roots(&mut self, cell: CellId, path: Path, roots: &mut Vec<Occurrence>) {
        for instance in self.cells[cell].instances.to_vec() {
            let master = self.instances[instance].master;
            if !self.is_flattened_through(master) || self.cells[master].is_leaf() {
                continue;
            }
            let Ok(instance_path) = self.path_append(path, instance) else {
                continue;
            };
            for net in self.cells[master].nets.to_vec() {
                let n = &self.nets[net];
                if n.is_deep() {
                    continue;
                }
                let connected = n.external
                    && self.instances[instance]
                        .plugs
                        .get(&net)
                        .is_some_and(|plug| self.components[plug].net.is_some());
                if !connected {
                    roots.push(Occurrence::new(EntityId::Net(net), instance_path));
                }
            }
            self.collect_nested_roots(master, instance_path, roots);
        }
    }
}
