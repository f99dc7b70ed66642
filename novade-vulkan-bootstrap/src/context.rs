//! Hierarchical scope owning an allocator, a bounded error chain and a list of
//! cleanups.
//!
//! A child borrows its parent, so the compiler keeps a child from outliving
//! it. Purging (explicitly or on drop) runs the registered cleanups newest
//! first and then returns the context's own footprint to its parent's
//! allocator, or to its own allocator for a root.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::alloc::{AllocStats, Allocator, SystemAllocator};
use crate::error::{Error, Result};
use crate::error_chain::ErrorChain;
use crate::guard::UndoStack;
use crate::logging::{LogLevel, Logger};

pub struct Context<'p> {
    parent: Option<&'p Context<'p>>,
    allocator: Rc<dyn Allocator>,
    logger: Logger,
    error: RefCell<ErrorChain>,
    cleanups: RefCell<UndoStack<'static>>,
}

impl<'p> Context<'p> {
    /// Builds a child of `parent`, or a fresh root using the process-default
    /// allocator and logger when `parent` is `None`.
    pub fn create(parent: Option<&'p Context<'p>>) -> Result<Self> {
        match parent {
            Some(parent) => {
                parent
                    .alloc(Self::footprint())
                    .map_err(|err| {
                        let _ = parent.push_error(format_args!("failed to create child context"));
                        err
                    })?;
                Ok(Self {
                    parent: Some(parent),
                    allocator: Rc::clone(&parent.allocator),
                    logger: parent.logger.clone(),
                    error: RefCell::new(ErrorChain::new()),
                    cleanups: RefCell::new(UndoStack::new()),
                })
            }
            None => Self::with_allocator(Rc::new(SystemAllocator::new()), Logger::default()),
        }
    }

    /// Builds a root around a caller-chosen allocator and logger.
    pub fn with_allocator(allocator: Rc<dyn Allocator>, logger: Logger) -> Result<Self> {
        let bytes = Self::footprint();
        if !allocator.allocate(bytes) {
            tracing::error!("failed to create fresh context: allocator refused {} bytes", bytes);
            return Err(Error::AllocationFailure { bytes });
        }
        Ok(Self {
            parent: None,
            allocator,
            logger,
            error: RefCell::new(ErrorChain::new()),
            cleanups: RefCell::new(UndoStack::new()),
        })
    }

    pub fn child(&self) -> Result<Context<'_>> {
        Context::create(Some(self))
    }

    /// Bytes a context charges to the allocator for itself.
    pub fn footprint() -> usize {
        std::mem::size_of::<Context<'static>>()
    }

    pub fn parent(&self) -> Option<&Context<'p>> {
        self.parent
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.logger.set_min_level(level);
    }

    pub fn stats(&self) -> AllocStats {
        self.allocator.stats()
    }

    /// Requests `bytes` from the allocator, recording a failure on the chain.
    pub fn alloc(&self, bytes: usize) -> Result<()> {
        if self.allocator.allocate(bytes) {
            Ok(())
        } else {
            Err(self.fail(Error::AllocationFailure { bytes }))
        }
    }

    pub fn free(&self, bytes: usize) {
        self.allocator.free(bytes);
    }

    /// Registers an undo action to run when the context is purged.
    pub fn cleanup_push(&self, label: &'static str, cleanup: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(label, cleanup);
    }

    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.borrow().len()
    }

    /// Appends a message to the error chain.
    pub fn push_error(&self, message: fmt::Arguments<'_>) -> Result<()> {
        self.error
            .borrow_mut()
            .push(message)
            .map_err(|_| Error::ErrorChainExhausted)
    }

    /// Records `err` on the chain and hands it back for propagation.
    pub fn fail(&self, err: Error) -> Error {
        let _ = self.push_error(format_args!("{err}"));
        err
    }

    pub fn error(&self) -> Ref<'_, ErrorChain> {
        self.error.borrow()
    }

    pub fn has_error(&self) -> bool {
        !self.error.borrow().is_empty()
    }

    pub fn clear_error(&self) {
        self.error.borrow_mut().clear();
    }

    pub fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        self.logger.log(level, message);
    }

    pub fn debug(&self, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs `message` with the chain head, then every entry newest first.
    pub fn log_error(&self, message: &str) {
        let chain = self.error.borrow();
        let head = chain.head().unwrap_or("no recorded cause");
        self.log(LogLevel::Error, format_args!("{message}: {head}"));
        for (i, entry) in chain.iter().enumerate() {
            let number = chain.len() - i;
            self.log(LogLevel::Error, format_args!("  ({number:02}) {entry}"));
        }
    }

    /// Runs pending cleanups, newest first. Later calls find nothing to run.
    pub fn run_cleanups(&self) {
        // Take the stack out first so a cleanup may register more cleanups.
        loop {
            let mut pending = std::mem::take(&mut *self.cleanups.borrow_mut());
            if pending.is_empty() {
                break;
            }
            pending.unwind();
        }
    }

    pub fn purge(self) {
        drop(self);
    }

    /// Logs the chain, purges, and exits the process with failure.
    pub fn bail(self, reason: &str) -> ! {
        self.log(LogLevel::Fatal, format_args!("{reason}"));
        if self.has_error() {
            self.log_error(reason);
        }
        drop(self);
        std::process::exit(1);
    }

    /// Purges and exits the process successfully.
    pub fn exit(self) -> ! {
        drop(self);
        std::process::exit(0);
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        self.run_cleanups();
        match self.parent {
            Some(parent) => parent.free(Self::footprint()),
            None => self.allocator.free(Self::footprint()),
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("is_root", &self.parent.is_none())
            .field("logger", &self.logger)
            .field("error", &*self.error.borrow())
            .field("pending_cleanups", &self.pending_cleanups())
            .finish()
    }
}
