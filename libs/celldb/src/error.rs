//! Database errors.

use arcstr::ArcStr;

use crate::name::Name;

/// The [`Result`](std::result::Result) type returned by fallible database operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A structural invariant violation.
///
/// Every check that produces one of these errors runs before the operation
/// mutates anything, so the database is left unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A cell or library was created without a valid parent library.
    #[error("unknown library")]
    UnknownLibrary,
    /// An entity was given an empty name.
    #[error("{kind} name is empty")]
    EmptyName {
        /// The kind of entity being named.
        kind: &'static str,
    },
    /// A library with this name already exists under the same parent.
    #[error("library `{0}` already exists")]
    DuplicateLibrary(Name),
    /// A cell with this name already exists in the library.
    #[error("cell `{name}` already exists in library `{library}`")]
    DuplicateCell {
        /// The requested name.
        name: Name,
        /// The library name.
        library: Name,
    },
    /// An instance with this name already exists in the cell.
    #[error("instance `{name}` already exists in cell `{cell}`")]
    DuplicateInstance {
        /// The requested name.
        name: Name,
        /// The owner cell name.
        cell: Name,
    },
    /// A net or net alias with this name already exists in the cell.
    #[error("net `{name}` already exists in cell `{cell}`")]
    DuplicateNet {
        /// The requested name.
        name: Name,
        /// The owner cell name.
        cell: Name,
    },
    /// A layer with this name or mask is already registered.
    #[error("layer `{0}` (or its mask) is already registered")]
    DuplicateLayer(Name),
    /// An extension slice with this name already exists in the cell.
    #[error("extension slice `{name}` already exists in cell `{cell}`")]
    DuplicateExtensionSlice {
        /// The requested name.
        name: Name,
        /// The owner cell name.
        cell: Name,
    },
    /// Every extension slice mask bit of the cell is in use.
    #[error("no extension slice mask left in cell `{0}`")]
    ExtensionMasksExhausted(Name),
    /// A path tail does not start in the master cell of the head instance.
    #[error(
        "can't create path: tail path starts in `{tail_owner}`, \
         but head instance `{head}` places `{head_master}`"
    )]
    IncompatiblePath {
        /// The head instance name.
        head: Name,
        /// The master cell of the head instance.
        head_master: Name,
        /// The owner cell of the tail path.
        tail_owner: Name,
    },
    /// A textual path names an instance that does not exist.
    #[error("can't create path: invalid path name `{path}` in cell `{cell}`")]
    InvalidPathName {
        /// The textual path.
        path: ArcStr,
        /// The cell the path was resolved from.
        cell: Name,
    },
    /// A handle refers to an entity that has been destroyed.
    #[error("stale {0} handle")]
    StaleId(&'static str),
    /// Placing `master` inside `cell` would make the hierarchy cyclic.
    #[error("cell `{master}` can't be instantiated in `{cell}`: `{cell}` is called by `{master}`")]
    CyclicInstantiation {
        /// The owner cell.
        cell: Name,
        /// The master cell.
        master: Name,
    },
    /// Two entities that must share a cell do not.
    #[error("{what} `{name}` does not belong to cell `{cell}`")]
    CellMismatch {
        /// The kind of entity.
        what: &'static str,
        /// The entity name.
        name: Name,
        /// The expected cell name.
        cell: Name,
    },
    /// A master cell lacks an external net required by an instance plug.
    #[error("cell `{master}` has no external net named `{net}`")]
    MissingMasterNet {
        /// The master cell name.
        master: Name,
        /// The required net name.
        net: Name,
    },
    /// A plug is still connected where an unconnected plug is required.
    #[error("plug of instance `{instance}` on net `{net}` is connected")]
    ConnectedPlug {
        /// The instance owning the plug.
        instance: Name,
        /// The master net of the plug.
        net: Name,
    },
    /// An operation applied to the wrong kind of component.
    #[error("component is not a {0}")]
    WrongComponentKind(&'static str),
    /// A required relation is not attached to the cell.
    #[error("no {relation} relation attached to cell `{cell}`")]
    MissingRelation {
        /// The relation kind.
        relation: &'static str,
        /// The cell name.
        cell: Name,
    },
    /// The spatial storage of a cell can't be swapped while geometry updates are queued.
    #[error("cell `{0}` has pending geometry updates in the current update session")]
    PendingGeometry(Name),
}
