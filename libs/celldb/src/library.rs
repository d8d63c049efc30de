//! Libraries of cells.

use crate::error::{Error, Result};
use crate::intrusive::IntrusiveMap;
use crate::name::Name;
use crate::{CellId, Database, LibraryId};

/// A named collection of cells, optionally nested in a parent library.
#[derive(Debug)]
pub struct Library {
    pub(crate) name: Name,
    pub(crate) parent: Option<LibraryId>,
    pub(crate) libraries: IntrusiveMap<Name, LibraryId>,
    pub(crate) cells: IntrusiveMap<Name, CellId>,
}

impl Library {
    /// The library name.
    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    /// The parent library, if any.
    #[inline]
    pub fn parent(&self) -> Option<LibraryId> {
        self.parent
    }

    /// The cells of this library.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter()
    }

    /// The sub-libraries of this library.
    pub fn libraries(&self) -> impl Iterator<Item = LibraryId> + '_ {
        self.libraries.iter()
    }
}

impl Database {
    /// Creates a library, either at the root or under `parent`.
    ///
    /// Library names are unique among siblings.
    pub fn create_library(
        &mut self,
        parent: Option<LibraryId>,
        name: impl Into<Name>,
    ) -> Result<LibraryId> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName { kind: "library" });
        }
        let siblings = match parent {
            Some(parent) => {
                &self
                    .libraries
                    .get(parent)
                    .ok_or(Error::UnknownLibrary)?
                    .libraries
            }
            None => &self.root_libraries,
        };
        if siblings.contains_key(&name) {
            return Err(Error::DuplicateLibrary(name));
        }
        let buckets = self.buckets();
        let id = self.libraries.insert(Library {
            name,
            parent,
            libraries: IntrusiveMap::new(buckets),
            cells: IntrusiveMap::new(buckets),
        });
        let _ = match parent {
            Some(parent) => self.libraries[parent].libraries.insert(name, id),
            None => self.root_libraries.insert(name, id),
        };
        Ok(id)
    }

    /// Returns the library with the given ID.
    #[inline]
    pub fn library(&self, id: LibraryId) -> &Library {
        &self.libraries[id]
    }

    /// Looks up a root library by name.
    pub fn root_library(&self, name: impl Into<Name>) -> Option<LibraryId> {
        self.root_libraries.get(&name.into())
    }

    /// Looks up a cell of `library` by name.
    pub fn library_cell(&self, library: LibraryId, name: impl Into<Name>) -> Option<CellId> {
        self.libraries.get(library)?.cells.get(&name.into())
    }

    /// The cells of `library`.
    pub fn library_cells(&self, library: LibraryId) -> Vec<CellId> {
        self.libraries
            .get(library)
            .map(|lib| lib.cells.to_vec())
            .unwrap_or_default()
    }

    /// Destroys `library`, its sub-libraries and all their cells.
    pub fn destroy_library(&mut self, library: LibraryId) -> Result<()> {
        if !self.libraries.contains_key(library) {
            return Err(Error::UnknownLibrary);
        }
        self.with_session(|db| {
            db.destroy_library_inner(library);
            Ok(())
        })
    }

    fn destroy_library_inner(&mut self, library: LibraryId) {
        for sub in self.libraries[library].libraries.to_vec() {
            self.destroy_library_inner(sub);
        }
        for cell in self.libraries[library].cells.to_vec() {
            if self.cells.contains_key(cell) {
                self.destroy_cell_inner(cell);
            }
        }
        match self.libraries[library].parent {
            Some(parent) => {
                self.libraries[parent].libraries.remove(library);
            }
            None => {
                self.root_libraries.remove(library);
            }
        }
        self.libraries.remove(library);
    }
}
