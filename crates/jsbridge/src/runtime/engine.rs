//! Re-entrant access to the engine.
//!
//! The engine lives in a `RefCell`. Native callbacks are invoked by the engine
//! while that cell is already mutably borrowed, yet the callback bodies need
//! the engine again (to read properties, call functions, evaluate scripts).
//! On entry into a native callback the `&mut Context` the engine handed us is
//! parked here, and nested accesses reuse it instead of borrowing the cell.

use crate::error::{Error, Result};
use boa_engine::Context as Engine;
use std::cell::{Cell, RefCell, RefMut};
use std::ptr::NonNull;

pub(crate) struct EngineCell {
    engine: RefCell<Engine>,
    parked: Cell<Option<NonNull<Engine>>>,
}

impl EngineCell {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine: RefCell::new(engine),
            parked: Cell::new(None),
        }
    }

    /// Runs `f` with exclusive access to the engine.
    ///
    /// Inside a native callback this is the engine reference handed to the
    /// callback; otherwise the cell is borrowed for the duration of `f`.
    ///
    /// # Errors
    ///
    /// `Error::ContextBusy` if the engine is borrowed by a job driver that is
    /// suspended at an await point.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> Result<R> {
        if let Some(mut parked) = self.parked.get() {
            // SAFETY: a pointer is parked only by `reenter`, which derives it
            // from the `&mut Engine` passed to a native callback and clears it
            // before that callback returns. While it is parked the callback's
            // own reference is not used, so this is the only live access path.
            let engine = unsafe { parked.as_mut() };
            return Ok(f(engine));
        }

        let mut engine = self.engine.try_borrow_mut().map_err(|_| Error::ContextBusy)?;
        Ok(f(&mut engine))
    }

    /// Returns true while a native callback is running.
    pub(crate) fn is_reentered(&self) -> bool {
        self.parked.get().is_some()
    }

    /// Borrows the engine for a job driver that holds it across await points.
    pub(crate) fn borrow_for_jobs(&self) -> Result<RefMut<'_, Engine>> {
        if self.is_reentered() {
            return Err(Error::ContextBusy);
        }
        self.engine.try_borrow_mut().map_err(|_| Error::ContextBusy)
    }

    /// Parks `engine` for the duration of `f`, so nested `with` calls from a
    /// native callback body reach the engine that invoked the callback.
    pub(crate) fn reenter<R>(&self, engine: &mut Engine, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            slot: &'a Cell<Option<NonNull<Engine>>>,
            previous: Option<NonNull<Engine>>,
        }

        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.slot.set(self.previous);
            }
        }

        let previous = self.parked.replace(Some(NonNull::from(engine)));
        let _restore = Restore {
            slot: &self.parked,
            previous,
        };
        f()
    }
}
