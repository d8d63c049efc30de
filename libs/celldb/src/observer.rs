//! Change notification for cells.
//!
//! Cells hold weak references to observers, so an observer's lifetime is
//! entirely up to the component that created it.

use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::error::Result;
use crate::{CellId, Database};

bitflags! {
    /// Kinds of change reported to observers.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ObserverFlags: u32 {
        /// The structure or geometry of the cell changed.
        const CELL_CHANGED    = 1 << 0;
        /// The cell is about to be destroyed.
        const CELL_DESTROYED  = 1 << 1;
    }
}

/// Something that wants to hear about changes to a cell.
pub trait CellObserver {
    /// Called with the kinds of change that occurred.
    fn notify(&self, flags: ObserverFlags);
}

impl Database {
    /// Registers an observer on `cell`.
    pub fn add_observer(&mut self, cell: CellId, observer: &Rc<dyn CellObserver>) -> Result<()> {
        self.check_cell(cell)?;
        self.cells[cell].observers.push(Rc::downgrade(observer));
        Ok(())
    }

    /// Unregisters an observer from `cell`.
    pub fn remove_observer(&mut self, cell: CellId, observer: &Rc<dyn CellObserver>) -> Result<()> {
        self.check_cell(cell)?;
        let target = Rc::downgrade(observer);
        self.cells[cell]
            .observers
            .retain(|o| !Weak::ptr_eq(o, &target));
        Ok(())
    }

    /// Notifies every live observer of `cell`, pruning the dead ones.
    pub fn notify(&mut self, cell: CellId, flags: ObserverFlags) {
        let Some(c) = self.cells.get_mut(cell) else {
            return;
        };
        c.observers.retain(|o| match o.upgrade() {
            Some(observer) => {
                observer.notify(flags);
                true
            }
            None => false,
        });
    }
}
