//! Technology layers.
//!
//! Layers are opaque handles registered by a technology loader. The database
//! only needs a name and a mask to key the per-layer slices of a cell.

use crate::error::{Error, Result};
use crate::name::Name;
use crate::{Database, LayerId};

/// A bit pattern identifying a layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerMask(u64);

impl LayerMask {
    /// Creates a mask from raw bits.
    #[inline]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bits of the mask.
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Returns `true` if the masks share a bit.
    #[inline]
    pub const fn intersects(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

/// A technology layer.
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) name: Name,
    pub(crate) mask: LayerMask,
}

impl Layer {
    /// The layer name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The layer mask.
    #[inline]
    pub fn mask(&self) -> LayerMask {
        self.mask
    }
}

impl Database {
    /// Registers a layer. Names and masks must be unique.
    pub fn register_layer(&mut self, name: impl Into<Name>, mask: LayerMask) -> Result<LayerId> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "layer" });
        }
        if self.layers_by_name.contains_key(&name) || self.layers_by_mask.contains_key(&mask) {
            return Err(Error::DuplicateLayer(name));
        }
        let id = self.layers.insert(Layer { name, mask });
        let _ = self.layers_by_name.insert(name, id);
        let _ = self.layers_by_mask.insert(mask, id);
        Ok(id)
    }

    /// Looks up a layer by name.
    pub fn layer_by_name(&self, name: impl Into<Name>) -> Option<LayerId> {
        self.layers_by_name.get(&name.into())
    }

    /// Looks up a layer by mask.
    pub fn layer_by_mask(&self, mask: LayerMask) -> Option<LayerId> {
        self.layers_by_mask.get(&mask)
    }

    /// Returns the layer with the given ID.
    #[inline]
    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id]
    }
}
