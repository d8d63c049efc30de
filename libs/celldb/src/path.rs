//! Hash-consed instantiation paths.
//!
//! A [`Path`] is a handle on a canonical [`SharedPath`]: a non-empty chain of
//! instances from an owner cell down to a master. Each shared path is the
//! pair (head instance, tail shared path) and is registered in its head
//! instance under its tail, so looking up or creating a path costs one hash
//! probe per instance and two constructions of the same chain always yield
//! the same [`SharedPathId`]. Path equality is therefore handle equality.

use std::cell::{Cell, RefCell};

use arcstr::ArcStr;
use geometry::transform::Transformation;

use crate::error::{Error, Result};
use crate::name::Name;
use crate::{CellId, Database, InstanceId, SharedPathId};

/// A canonical chain of instances.
#[derive(Debug)]
pub struct SharedPath {
    pub(crate) head: InstanceId,
    pub(crate) tail: Option<SharedPathId>,
    pub(crate) name: RefCell<Option<ArcStr>>,
    pub(crate) transformation: Cell<Option<Transformation>>,
}

impl SharedPath {
    /// The first instance of the chain.
    #[inline]
    pub fn head(&self) -> InstanceId {
        self.head
    }

    /// The rest of the chain.
    #[inline]
    pub fn tail(&self) -> Option<SharedPathId> {
        self.tail
    }

    fn invalidate(&self) {
        self.name.replace(None);
        self.transformation.set(None);
    }
}

/// A possibly empty instantiation path.
///
/// Two paths are equal if and only if they denote the same shared path.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(pub(crate) Option<SharedPathId>);

impl Path {
    /// The empty path.
    pub const EMPTY: Path = Path(None);

    /// Returns `true` if the path has no instances.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The shared path this handle refers to.
    #[inline]
    pub fn shared_path(&self) -> Option<SharedPathId> {
        self.0
    }
}

impl From<SharedPathId> for Path {
    fn from(value: SharedPathId) -> Self {
        Self(Some(value))
    }
}

impl Database {
    /// Returns the shared path with the given ID.
    #[inline]
    pub fn shared_path(&self, id: SharedPathId) -> &SharedPath {
        &self.shared_paths[id]
    }

    /// The number of live shared paths.
    #[inline]
    pub fn shared_path_count(&self) -> usize {
        self.shared_paths.len()
    }

    fn intern_shared_path(&mut self, head: InstanceId, tail: Option<SharedPathId>) -> SharedPathId {
        if let Some(sp) = self.instances[head].shared_paths.get(&tail) {
            return sp;
        }
        let sp = self.shared_paths.insert(SharedPath {
            head,
            tail,
            name: RefCell::new(None),
            transformation: Cell::new(None),
        });
        let _ = self.instances[head].shared_paths.insert(tail, sp);
        sp
    }

    /// The path made of `instance` alone.
    pub fn path_from_instance(&mut self, instance: InstanceId) -> Result<Path> {
        self.check_instance(instance)?;
        Ok(Path(Some(self.intern_shared_path(instance, None))))
    }

    /// The path `head` followed by `tail`.
    ///
    /// `tail` must be empty or start in the master cell of `head`.
    pub fn path_prepend(&mut self, head: InstanceId, tail: Path) -> Result<Path> {
        let h = self.check_instance(head)?;
        if let Some(tail_owner) = self.path_owner_cell(tail) {
            if tail_owner != h.master {
                return Err(Error::IncompatiblePath {
                    head: h.name,
                    head_master: self.cells[h.master].name,
                    tail_owner: self.cells[tail_owner].name,
                });
            }
        }
        Ok(Path(Some(self.intern_shared_path(head, tail.0))))
    }

    /// The path `head` followed by `tail`.
    ///
    /// `tail` must be an instance of the master cell of `head`.
    pub fn path_append(&mut self, head: Path, tail: InstanceId) -> Result<Path> {
        let t = self.check_instance(tail)?;
        if let Some(head_master) = self.path_master_cell(head) {
            if head_master != t.cell {
                let head_tail = self.path_tail_instance(head).unwrap_or(tail);
                return Err(Error::IncompatiblePath {
                    head: self.instances[head_tail].name,
                    head_master: self.cells[head_master].name,
                    tail_owner: self.cells[t.cell].name,
                });
            }
        }
        let mut path = self.path_from_instance(tail)?;
        for inst in self.path_instances(head).into_iter().rev() {
            path = Path(Some(self.intern_shared_path(inst, path.0)));
        }
        Ok(path)
    }

    /// The concatenation of `head` and `tail`.
    ///
    /// Instances of `head` are prepended to `tail` from its last one backward.
    pub fn path_concat(&mut self, head: Path, tail: Path) -> Result<Path> {
        let mut path = tail;
        for inst in self.path_instances(head).into_iter().rev() {
            path = self.path_prepend(inst, path)?;
        }
        Ok(path)
    }

    /// Resolves a path name such as `a.b.c` from `cell`.
    ///
    /// Each segment names an instance of the master reached so far. The empty
    /// string resolves to the empty path.
    pub fn path_from_name(&mut self, cell: CellId, name: &str) -> Result<Path> {
        let mut current = self.check_cell(cell)?;
        if name.is_empty() {
            return Ok(Path::EMPTY);
        }
        let mut instances = Vec::new();
        for segment in name.split(self.config.name_separator) {
            let inst = Name::get(segment)
                .and_then(|n| current.instances.get(&n))
                .ok_or_else(|| Error::InvalidPathName {
                    path: ArcStr::from(name),
                    cell: current.name,
                })?;
            instances.push(inst);
            current = &self.cells[self.instances[inst].master];
        }
        let mut path = Path::EMPTY;
        for inst in instances.into_iter().rev() {
            path = Path(Some(self.intern_shared_path(inst, path.0)));
        }
        Ok(path)
    }

    /// The instances of `path`, head first.
    pub fn path_instances(&self, path: Path) -> Vec<InstanceId> {
        let mut instances = Vec::new();
        let mut cursor = path.0;
        while let Some(sp) = cursor {
            let sp = &self.shared_paths[sp];
            instances.push(sp.head);
            cursor = sp.tail;
        }
        instances
    }

    /// The first instance of `path`.
    pub fn path_head_instance(&self, path: Path) -> Option<InstanceId> {
        path.0.map(|sp| self.shared_paths[sp].head)
    }

    /// The last instance of `path`.
    pub fn path_tail_instance(&self, path: Path) -> Option<InstanceId> {
        let mut sp = path.0?;
        while let Some(tail) = self.shared_paths[sp].tail {
            sp = tail;
        }
        Some(self.shared_paths[sp].head)
    }

    /// `path` without its first instance.
    pub fn path_tail_path(&self, path: Path) -> Path {
        Path(path.0.and_then(|sp| self.shared_paths[sp].tail))
    }

    /// `path` without its last instance.
    pub fn path_head_path(&mut self, path: Path) -> Path {
        let mut instances = self.path_instances(path);
        instances.pop();
        let mut head = Path::EMPTY;
        for inst in instances.into_iter().rev() {
            head = Path(Some(self.intern_shared_path(inst, head.0)));
        }
        head
    }

    /// The cell containing the first instance of `path`.
    pub fn path_owner_cell(&self, path: Path) -> Option<CellId> {
        self.path_head_instance(path)
            .map(|inst| self.instances[inst].cell)
    }

    /// The master of the last instance of `path`.
    pub fn path_master_cell(&self, path: Path) -> Option<CellId> {
        self.path_tail_instance(path)
            .map(|inst| self.instances[inst].master)
    }

    /// The instance names of `path` joined by the configured separator.
    pub fn path_name(&self, path: Path) -> ArcStr {
        let Some(sp) = path.0 else {
            return ArcStr::new();
        };
        let shared = &self.shared_paths[sp];
        if let Some(name) = shared.name.borrow().as_ref() {
            return name.clone();
        }
        let head = self.instances[shared.head].name;
        let name = match shared.tail {
            Some(tail) => arcstr::format!(
                "{}{}{}",
                head,
                self.config.name_separator,
                self.path_name(Path(Some(tail)))
            ),
            None => ArcStr::from(head.as_str()),
        };
        shared.name.replace(Some(name.clone()));
        name
    }

    /// The transformation from the master of `path` to its owner cell.
    pub fn path_transformation(&self, path: Path) -> Transformation {
        let Some(sp) = path.0 else {
            return Transformation::identity();
        };
        let shared = &self.shared_paths[sp];
        if let Some(t) = shared.transformation.get() {
            return t;
        }
        let head = self.instances[shared.head].transformation;
        let t = match shared.tail {
            Some(tail) => Transformation::cascade(head, self.path_transformation(Path(Some(tail)))),
            None => head,
        };
        shared.transformation.set(Some(t));
        t
    }

    /// Every shared path containing `instance`.
    pub(crate) fn paths_through(&self, instance: InstanceId) -> Vec<SharedPathId> {
        let mut found: Vec<SharedPathId> = self.instances[instance].shared_paths.to_vec();
        let mut next = 0;
        while next < found.len() {
            let sp = found[next];
            next += 1;
            let owner = self.instances[self.shared_paths[sp].head].cell;
            for caller in self.cells[owner].slave_instances.iter() {
                if let Some(dependent) = self.instances[caller].shared_paths.get(&Some(sp)) {
                    found.push(dependent);
                }
            }
        }
        found
    }

    /// Drops the cached names and transformations of paths through `instance`.
    pub(crate) fn invalidate_instance_paths(&mut self, instance: InstanceId) {
        for sp in self.paths_through(instance) {
            self.shared_paths[sp].invalidate();
        }
    }

    /// Destroys a shared path, the paths extending it upward, and the
    /// entities whose occurrence goes through it.
    pub(crate) fn destroy_shared_path(&mut self, sp: SharedPathId) {
        let Some(shared) = self.shared_paths.get(sp) else {
            return;
        };
        let head = shared.head;
        let owner = self.instances[head].cell;
        let dependents: Vec<SharedPathId> = self.cells[owner]
            .slave_instances
            .iter()
            .filter_map(|caller| self.instances[caller].shared_paths.get(&Some(sp)))
            .collect();
        for dependent in dependents {
            self.destroy_shared_path(dependent);
        }

        let path = Path(Some(sp));
        let users: Vec<_> = self.cells[owner]
            .slave_entities
            .get(&head)
            .map(|entities| {
                entities
                    .iter()
                    .copied()
                    .filter(|&e| self.entity_occurrence_path(e) == Some(path))
                    .collect()
            })
            .unwrap_or_default();
        for entity in users {
            self.destroy_entity(entity);
            self.remove_slave_entity(owner, entity);
        }

        self.instances[head].shared_paths.remove(sp);
        self.shared_paths.remove(sp);
    }
}
