//! Update sessions.
//!
//! While a session is open, geometry changes of placed objects only take them
//! out of their spatial index and queue them. Closing the outermost session
//! puts them back, refreshes the footprints of instances whose master
//! changed size, and notifies the observers of every touched cell once.

use indexmap::IndexSet;
use tracing::{event, span, Level};

use crate::error::Result;
use crate::observer::ObserverFlags;
use crate::{CellId, Database, GoId, InstanceId};

/// Deferred work of the open update sessions.
#[derive(Debug, Default)]
pub(crate) struct UpdateSession {
    pub(crate) depth: usize,
    /// Objects taken out of their spatial index, to be put back on close.
    pub(crate) invalidated: IndexSet<GoId>,
    /// Instances whose master bounding box changed.
    pub(crate) stale_instances: IndexSet<InstanceId>,
    /// Cells whose observers must be notified.
    pub(crate) touched: IndexSet<CellId>,
}

impl UpdateSession {
    /// Returns `true` if work is queued for objects of `cell`.
    pub(crate) fn has_pending(&self, db: &Database, cell: CellId) -> bool {
        self.invalidated
            .iter()
            .any(|&go| db.go_cell(go) == Some(cell))
            || self
                .stale_instances
                .iter()
                .any(|&i| db.instances.get(i).is_some_and(|i| i.cell == cell))
    }
}

impl Database {
    /// Opens an update session. Sessions nest; only closing the outermost
    /// one flushes deferred work.
    pub fn open_update_session(&mut self) {
        self.session.depth += 1;
        event!(Level::TRACE, depth = self.session.depth, "opened update session");
    }

    /// Closes the innermost update session.
    pub fn close_update_session(&mut self) {
        match self.session.depth {
            0 => {
                event!(Level::WARN, "closing an update session that is not open");
            }
            1 => {
                self.flush_session();
                self.session.depth = 0;
            }
            _ => self.session.depth -= 1,
        }
    }

    /// The number of nested open sessions.
    #[inline]
    pub fn update_session_depth(&self) -> usize {
        self.session.depth
    }

    /// Runs `f` inside an update session.
    pub(crate) fn with_session<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.open_update_session();
        let result = f(self);
        self.close_update_session();
        result
    }

    /// Records that `cell` changed.
    #[inline]
    pub(crate) fn touch(&mut self, cell: CellId) {
        self.session.touched.insert(cell);
    }

    /// Takes an object out of its spatial index until the session closes,
    /// when it is put back if it still belongs there. Routing pads standing
    /// for the object follow it.
    pub(crate) fn invalidate(&mut self, go: GoId) {
        let Some(cell) = self.go_cell(go) else {
            return;
        };
        for rp in self.dependent_routing_pads(go) {
            self.invalidate(GoId::Component(rp));
        }
        self.touch(cell);
        self.unmaterialize_go(go);
        self.session.invalidated.insert(go);
    }

    fn flush_session(&mut self) {
        let _guard = span!(Level::INFO, "closing update session").entered();

        for go in std::mem::take(&mut self.session.invalidated) {
            if self.should_materialize(go) {
                self.materialize_go(go);
            }
        }

        let mut rounds = 0;
        while !self.session.stale_instances.is_empty() {
            rounds += 1;
            for inst in std::mem::take(&mut self.session.stale_instances) {
                if !self.instances.contains_key(inst) {
                    continue;
                }
                let go = GoId::Instance(inst);
                if self.is_go_materialized(go) {
                    self.unmaterialize_go(go);
                    self.materialize_go(go);
                }
            }
        }
        event!(Level::TRACE, rounds, "refreshed stale instance footprints");

        for cell in std::mem::take(&mut self.session.touched) {
            self.notify(cell, ObserverFlags::CELL_CHANGED);
        }
    }
}
