//! Deleters, and the hook that ties an owner's deleter to a control block.

use std::cell::Cell;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::affinity::ThreadAffinity;
use crate::block::ControlBlock;
use crate::borrow::{BorrowFlag, Loan};
use crate::link::Link;
use crate::Error;

/// Releases objects on behalf of an [crate::Owner].
///
/// Deleters are `'static` because a deletion can outlive the owner that scheduled it: if the
/// object is borrowed when its owner dies, the deleter moves into the control block and runs
/// when the last borrow ends.
pub trait Deleter<T: ?Sized>: 'static {
    /// # Safety
    ///
    /// `ptr` must point to a live object that this deleter knows how to release, and must not
    /// be used again afterwards.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

/// A deleter that can also produce objects, which is what [crate::Owner::new_in] and
/// [crate::Owner::replace] need.
pub trait Allocate<T>: Deleter<T> {
    fn allocate(&mut self, value: T) -> NonNull<T>;
}

/// The default deleter: objects live in a `Box`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

impl<T: ?Sized> Deleter<T> for Global {
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        // Safety: caller promises ptr came from Box::leak / Box::into_raw.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

impl<T> Allocate<T> for Global {
    fn allocate(&mut self, value: T) -> NonNull<T> {
        NonNull::from(Box::leak(Box::new(value)))
    }
}

/// The owner's half of the control block protocol.
///
/// Creates the block lazily on first observation (or eagerly for slices, which need their
/// length recorded), invalidates it when the object goes, and runs or defers the deleter. The
/// hook's `Rc` does not count as an attachment.
///
/// The borrow flag outlives any one block. Every block the hook creates shares it, so borrows
/// taken through a block that has since been invalidated still hold off deletion and exclusive
/// access.
pub(crate) struct Notifier<D> {
    /// Taken out exactly once, by whoever ends the owner's life.
    deleter: ManuallyDrop<D>,
    block: Cell<Option<Rc<ControlBlock>>>,
    borrows: Rc<BorrowFlag>,
    /// Element count recorded in blocks created from now on.
    size: Cell<usize>,
    affinity: ThreadAffinity,
}

impl<D> Notifier<D> {
    pub(crate) fn new(deleter: D) -> Self {
        Self {
            deleter: ManuallyDrop::new(deleter),
            block: Cell::new(None),
            borrows: Rc::default(),
            size: Cell::new(1),
            affinity: ThreadAffinity::default(),
        }
    }

    pub(crate) fn deleter(&self) -> &D {
        &self.deleter
    }

    pub(crate) fn deleter_mut(&mut self) -> &mut D {
        &mut self.deleter
    }

    /// # Safety
    ///
    /// Must be called at most once, and the notifier must not touch its deleter afterwards.
    pub(crate) unsafe fn take_deleter(&mut self) -> D {
        unsafe { ManuallyDrop::take(&mut self.deleter) }
    }

    /// Gives up the deleter, invalidating first since nothing can keep observers informed
    /// afterwards.
    pub(crate) fn into_deleter(self) -> D {
        self.invalidate();
        let mut this = ManuallyDrop::new(self);
        // Safety: `this` is never dropped or used again, and its block slot is empty.
        unsafe { this.take_deleter() }
    }

    fn peek<R>(&self, f: impl FnOnce(&Rc<ControlBlock>) -> R) -> Option<R> {
        let block = self.block.take()?;
        let r = f(&block);
        self.block.set(Some(block));
        Some(r)
    }

    fn create_block(&self) -> Rc<ControlBlock> {
        ControlBlock::create(self.size.get(), self.affinity, Rc::clone(&self.borrows))
    }

    fn assure_block(&self) -> Rc<ControlBlock> {
        self.block.take().unwrap_or_else(|| self.create_block())
    }

    fn with_block<R>(&self, f: impl FnOnce(&Rc<ControlBlock>) -> R) -> R {
        let block = self.assure_block();
        let r = f(&block);
        self.block.set(Some(block));
        r
    }

    pub(crate) fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// Blocks created from now on get this affinity. An existing block nobody has seen yet is
    /// rebuilt so the change applies to it too.
    pub(crate) fn set_affinity(&mut self, affinity: ThreadAffinity) {
        self.affinity = affinity;
        let untouched = self.peek(|b| b.attachments() == 0).unwrap_or(false)
            && !self.borrows.is_borrowed();
        if untouched {
            self.set_size(self.size.get());
        }
    }

    /// Attaches a new observer, creating the block if this is the first one.
    pub(crate) fn observe(&self) -> Link {
        Link::attached(self.with_block(|block| block.attach()))
    }

    /// Starts over with a fresh block recording `size` elements. The old block, if any, is
    /// invalidated.
    pub(crate) fn set_size(&self, size: usize) {
        self.size.set(size);
        let fresh = self.create_block();
        if let Some(old) = self.block.replace(Some(fresh)) {
            old.invalidate();
        }
    }

    pub(crate) fn invalidate(&self) {
        if let Some(block) = self.block.take() {
            block.invalidate();
        }
    }

    pub(crate) fn is_borrowed(&self) -> bool {
        self.borrows.is_borrowed()
    }

    pub(crate) fn check_unborrowed(&self) -> Result<(), Error> {
        self.borrows.check_unborrowed()
    }

    pub(crate) fn attachments(&self) -> usize {
        self.peek(|b| b.attachments()).unwrap_or(0)
    }

    pub(crate) fn recorded_size(&self) -> usize {
        self.size.get()
    }

    pub(crate) fn loan_shared(&self) -> Result<Loan, Error> {
        self.with_block(Loan::shared)
    }

    pub(crate) fn loan_exclusive(&self) -> Result<Loan, Error> {
        self.with_block(Loan::exclusive)
    }

    /// Ends the object's life: observers see it invalid immediately, and the deleter runs now
    /// or, if a borrow guard is still reading the object, when that guard is released.
    pub(crate) fn retire<T>(&self, ptr: NonNull<T>, mut deleter: D)
    where
        T: ?Sized + 'static,
        D: Deleter<T>,
    {
        if self.borrows.is_borrowed() {
            self.borrows.defer(Box::new(move || {
                // Safety: the owner gave up ptr when it retired it.
                unsafe { deleter.delete(ptr) }
            }));
            self.invalidate();
        } else {
            self.invalidate();
            // Safety: as above, and nothing is borrowing the object.
            unsafe { deleter.delete(ptr) }
        }
    }
}

impl<D> Drop for Notifier<D> {
    fn drop(&mut self) {
        // The deleter is not ours to drop; the owner has already taken it.
        self.invalidate();
    }
}
