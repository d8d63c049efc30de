//! Recoverable conditions reported while the database is mutated.
//!
//! Operations that skip work or proceed despite a suspicious state do not
//! fail. They record an [`Issue`] in the database's [`IssueSet`] and log it
//! through `tracing` at the matching level.

use std::fmt::Display;

use arcstr::ArcStr;
use tracing::{event, Level};

use crate::name::Name;

/// How serious an [`Issue`] is.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
    /// An error. The operation that raised it skipped some work.
    Error,
}

/// The issues recorded by a [`Database`](crate::Database).
#[derive(Debug, Clone, Default)]
pub struct IssueSet {
    issues: Vec<Issue>,
    num_errors: usize,
    num_warnings: usize,
}

impl IssueSet {
    pub(crate) fn add(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Error => self.num_errors += 1,
            Severity::Warning => self.num_warnings += 1,
            Severity::Info => (),
        };
        self.issues.push(issue);
    }

    /// Returns an iterator over all issues in the set.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    /// The number of issues in this issue set.
    #[inline]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if this issue set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// The number of errors in this issue set.
    #[inline]
    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    /// The number of warnings in this issue set.
    #[inline]
    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }
}

/// An issue raised by a database operation.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Issue {
    cause: Cause,
    severity: Severity,
}

/// The condition behind an [`Issue`].
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Cause {
    /// `slave_abutment_box` was called on a cell that already shares a quad-tree.
    AlreadySlaved {
        /// The cell name.
        cell: Name,
    },
    /// `slave_abutment_box` was called on a cell with several slave instances.
    NotUnique {
        /// The cell name.
        cell: Name,
        /// The number of slave instances.
        slave_instances: usize,
    },
    /// Abutment boxes of different sizes were slaved together.
    AbutmentBoxMismatch {
        /// The top cell name.
        top: Name,
        /// The slaved cell name.
        slave: Name,
    },
    /// A plug has components anchored on it and can't be detached from its ring.
    PlugHasSlaveHooks {
        /// The name of the plug's instance.
        instance: Name,
        /// The master net of the plug.
        net: Name,
    },
    /// A routing pad was created through an instance that is not placed.
    UnplacedOccurrence {
        /// The net owning the routing pad.
        net: Name,
        /// The occurrence name of the routing pad.
        occurrence: ArcStr,
    },
}

impl Issue {
    /// Creates an issue and logs it at the level matching its severity.
    pub(crate) fn new_and_log(cause: Cause, severity: Severity) -> Self {
        match severity {
            Severity::Info => event!(Level::INFO, issue = ?cause, "{}", cause),
            Severity::Warning => event!(Level::WARN, issue = ?cause, "{}", cause),
            Severity::Error => event!(Level::ERROR, issue = ?cause, "{}", cause),
        }
        Self { cause, severity }
    }

    /// The cause of this issue.
    #[inline]
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// The severity of this issue.
    #[inline]
    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySlaved { cell } => write!(
                f,
                "cell `{}` is already slaved, abutment box slaving cancelled",
                cell
            ),
            Self::NotUnique {
                cell,
                slave_instances,
            } => write!(
                f,
                "cell `{}` is not unique ({} slave instances), abutment box slaving cancelled",
                cell, slave_instances
            ),
            Self::AbutmentBoxMismatch { top, slave } => write!(
                f,
                "slaving abutment boxes of different sizes (top `{}`, slave `{}`), fixed blocks may shift",
                top, slave
            ),
            Self::PlugHasSlaveHooks { instance, net } => write!(
                f,
                "plug `{}.{}` has attached components, it is left out of the ring",
                instance, net
            ),
            Self::UnplacedOccurrence { net, occurrence } => write!(
                f,
                "routing pad `{}` of net `{}` goes through an unplaced instance",
                occurrence, net
            ),
        }
    }
}
