//! Borrow guards.
//!
//! Reading through an observer is only sound while the target is alive. A guard keeps it alive
//! without owning it: it holds an attachment (so the control block outlives the guard) and a
//! borrow on the object's flag (so an owner dying mid-borrow parks its deletion in the flag
//! instead of running it). The last guard to go runs the parked deletion.
//!
//! The flag belongs to the object, not to a control block. An owner that severs its observers
//! starts a fresh block but keeps the flag, so guards handed out through the old block still
//! count.

use std::cell::Cell;
use std::fmt::{self, Debug, Display};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::block::ControlBlock;
use crate::stats::{self, Counter};
use crate::{Error, Invariant};

/// A deletion that could not run because the object was borrowed when its owner died.
pub(crate) type Deletion = Box<dyn FnOnce()>;

/// Which borrows of one object are handed out, and what to do when the last one ends.
#[derive(Default)]
pub(crate) struct BorrowFlag {
    /// > 0: that many shared borrows. -1: one exclusive borrow.
    state: Cell<isize>,
    deferred: Cell<Option<Deletion>>,
}

impl Debug for BorrowFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowFlag")
            .field("state", &self.state.get())
            .field("deferred", &self.has_deferred())
            .finish()
    }
}

impl BorrowFlag {
    pub(crate) fn is_borrowed(&self) -> bool {
        self.state.get() != 0
    }

    pub(crate) fn try_shared(&self) -> Result<(), Error> {
        let state = self.state.get();
        if state < 0 {
            tracing::debug!("shared borrow refused");
            return Err(Error::AlreadyMutablyBorrowed);
        }
        self.state.set(state + 1);
        Ok(())
    }

    pub(crate) fn check_unborrowed(&self) -> Result<(), Error> {
        match self.state.get() {
            0 => Ok(()),
            s if s > 0 => Err(Error::AlreadyBorrowed),
            _ => Err(Error::AlreadyMutablyBorrowed),
        }
    }

    pub(crate) fn try_exclusive(&self) -> Result<(), Error> {
        self.check_unborrowed().map_err(|e| {
            tracing::debug!("exclusive borrow refused");
            e
        })?;
        self.state.set(-1);
        Ok(())
    }

    /// Ends one borrow. Hands back the pending deletion if this was the last borrow and the
    /// owner died in the meantime.
    pub(crate) fn release(&self) -> Option<Deletion> {
        let state = self.state.get();
        debug_assert_ne!(state, 0, "released an unborrowed object");
        let next = if state < 0 { 0 } else { state - 1 };
        self.state.set(next);
        if next == 0 {
            self.deferred.take()
        } else {
            None
        }
    }

    pub(crate) fn defer(&self, deletion: Deletion) {
        debug_assert!(self.is_borrowed());
        stats::bump(Counter::DeletionDeferred);
        tracing::trace!("object is borrowed; deferring deletion");
        self.deferred.set(Some(deletion));
    }

    pub(crate) fn has_deferred(&self) -> bool {
        let deferred = self.deferred.take();
        let pending = deferred.is_some();
        self.deferred.set(deferred);
        pending
    }
}

impl Invariant for BorrowFlag {
    fn invariant(&self) {
        let state = self.state.get();
        assert!(state >= -1, "borrow flag is {state}");
        if self.has_deferred() {
            assert_ne!(state, 0);
        }
    }
}

impl Drop for BorrowFlag {
    fn drop(&mut self) {
        if self.deferred.get_mut().take().is_some() {
            // Only reachable if a borrow guard was leaked. The object leaks with it.
            tracing::warn!("borrow flag dropped with a deletion still pending");
        }
    }
}

/// One borrow plus one attachment.
pub(crate) struct Loan {
    block: Option<Rc<ControlBlock>>,
}

impl Loan {
    pub(crate) fn shared(block: &Rc<ControlBlock>) -> Result<Self, Error> {
        if !block.is_valid()? {
            return Err(Error::NullDereference);
        }
        block.borrows().try_shared()?;
        Ok(Loan {
            block: Some(block.attach()),
        })
    }

    pub(crate) fn exclusive(block: &Rc<ControlBlock>) -> Result<Self, Error> {
        if !block.is_valid()? {
            return Err(Error::NullDereference);
        }
        block.borrows().try_exclusive()?;
        Ok(Loan {
            block: Some(block.attach()),
        })
    }

    fn duplicate(&self) -> Self {
        let block = self.block.as_ref().map(|block| {
            // Already holding a shared borrow, so another one cannot fail.
            let _ = block.borrows().try_shared();
            block.attach()
        });
        Loan { block }
    }
}

impl Drop for Loan {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        if let Some(deletion) = block.borrows().release() {
            tracing::trace!("last borrow of {:?} released; running deferred deletion", block.id());
            deletion();
        }
        block.detach();
    }
}

/// Shared access to an observed object. Obtained from [crate::Observer::borrow] or
/// [crate::Owner::borrow].
///
/// While any `Ref` is alive no [RefMut] can be taken, and if the owner is dropped the object
/// stays alive until the last guard goes away. Observers still learn about the death right away.
pub struct Ref<T: ?Sized> {
    value: NonNull<T>,
    loan: Loan,
}

impl<T: ?Sized> Ref<T> {
    pub(crate) fn new(value: NonNull<T>, loan: Loan) -> Self {
        Self { value, loan }
    }

    /// Another shared guard on the same object. An associated function, like
    /// `std::cell::Ref::clone`, so it does not shadow `T::clone`.
    #[allow(clippy::should_implement_trait)]
    pub fn clone(orig: &Self) -> Self {
        Self {
            value: orig.value,
            loan: orig.loan.duplicate(),
        }
    }

    /// Narrows the guard to a part of the object.
    pub fn map<U: ?Sized>(orig: Self, f: impl FnOnce(&T) -> &U) -> Ref<U> {
        let value = NonNull::from(f(&*orig));
        Ref {
            value,
            loan: orig.loan,
        }
    }
}

impl<T: ?Sized> Deref for Ref<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the loan holds a shared borrow, which keeps the deletion from running and
        // rules out any RefMut.
        unsafe { self.value.as_ref() }
    }
}

impl<T: ?Sized + Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + Display> Display for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

/// Exclusive access to an observed object. Obtained from [crate::Observer::borrow_mut] or
/// [crate::Owner::borrow_mut].
pub struct RefMut<T: ?Sized> {
    value: NonNull<T>,
    loan: Loan,
    _invariant: PhantomData<*mut T>,
}

impl<T: ?Sized> RefMut<T> {
    pub(crate) fn new(value: NonNull<T>, loan: Loan) -> Self {
        Self {
            value,
            loan,
            _invariant: PhantomData,
        }
    }

    pub fn map<U: ?Sized>(mut orig: Self, f: impl FnOnce(&mut T) -> &mut U) -> RefMut<U> {
        let value = NonNull::from(f(&mut *orig));
        RefMut::new(value, orig.take_loan())
    }

    fn take_loan(&mut self) -> Loan {
        Loan {
            block: self.loan.block.take(),
        }
    }
}

impl<T: ?Sized> Deref for RefMut<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: the loan holds the exclusive borrow.
        unsafe { self.value.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for RefMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the loan holds the exclusive borrow.
        unsafe { self.value.as_mut() }
    }
}

impl<T: ?Sized + Debug> Debug for RefMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + Display> Display for RefMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}
