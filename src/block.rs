//! The control block: the only state shared between an owner and its observers.
//!
//! A block knows nothing about the type it is tracking. It records whether the object is alive
//! (and how many elements it has, for slices) and how many observers are attached. Borrows are
//! tracked on the object's `BorrowFlag`, which every block made for that object shares.
//!
//! Blocks live in an `Rc`. The owner's hook holds one `Rc` without an attachment for as long as
//! the block is valid, and every attached observer or live borrow guard holds one `Rc` with
//! one attachment. So the `Rc` count is always `attachments + (valid as usize)`, and the block is
//! freed exactly when the deletion rule in [ControlBlock::detach] says it may be.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::thread::ThreadId;

use crate::affinity::{check_origin, ThreadAffinity};
use crate::borrow::BorrowFlag;
use crate::stats::{self, Counter};
use crate::{CellIncrement, Error, Invariant};

mod id;
pub use self::id::BlockId;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Liveness {
    /// Alive, with this many elements (1 for anything that isn't a slice).
    Valid(usize),
    Invalid,
}

impl Liveness {
    /// What this state adds to the attachment count when deciding whether a block is
    /// unreachable. Never negative while valid; exactly -1 once invalid.
    fn contribution(self) -> isize {
        match self {
            Self::Valid(size) => isize::try_from(size).unwrap_or(isize::MAX),
            Self::Invalid => -1,
        }
    }
}

pub(crate) struct ControlBlock {
    id: BlockId,
    attachments: Cell<usize>,
    liveness: Cell<Liveness>,
    origin: Option<ThreadId>,
    borrows: Rc<BorrowFlag>,
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("id", &self.id)
            .field("attachments", &self.attachments.get())
            .field("liveness", &self.liveness.get())
            .field("borrows", &self.borrows)
            .finish()
    }
}

impl ControlBlock {
    pub(crate) fn create(
        size: usize,
        affinity: ThreadAffinity,
        borrows: Rc<BorrowFlag>,
    ) -> Rc<Self> {
        Self::with_origin(size, affinity.origin(), borrows)
    }

    pub(crate) fn with_origin(
        size: usize,
        origin: Option<ThreadId>,
        borrows: Rc<BorrowFlag>,
    ) -> Rc<Self> {
        let id = BlockId::next();
        stats::bump(Counter::BlockCreated);
        tracing::trace!("created block {id:?} (size {size}, origin {origin:?})");
        Rc::new(ControlBlock {
            id,
            attachments: Cell::new(0),
            liveness: Cell::new(Liveness::Valid(size)),
            origin,
            borrows,
        })
    }

    pub(crate) fn id(&self) -> BlockId {
        self.id
    }

    pub(crate) fn attachments(&self) -> usize {
        self.attachments.get()
    }

    /// The borrow flag of the object this block tracks.
    pub(crate) fn borrows(&self) -> &BorrowFlag {
        &self.borrows
    }

    pub(crate) fn is_valid(&self) -> Result<bool, Error> {
        check_origin(self.origin)?;
        Ok(matches!(self.liveness.get(), Liveness::Valid(_)))
    }

    pub(crate) fn element_count(&self) -> usize {
        match self.liveness.get() {
            Liveness::Valid(size) => size,
            Liveness::Invalid => 0,
        }
    }

    /// Called by the owner's hook, giving up the hook's `Rc`. Frees the block right here if
    /// nobody is attached; otherwise leaves it for the observers to find out.
    pub(crate) fn invalidate(self: Rc<Self>) {
        stats::bump(Counter::Invalidated);
        debug_assert!(
            matches!(self.liveness.get(), Liveness::Valid(_)),
            "block {:?} invalidated twice",
            self.id
        );
        self.liveness.set(Liveness::Invalid);
        #[cfg(debug_assertions)]
        self.invariant();
        if self.attachments.get() == 0 {
            debug_assert_eq!(Rc::strong_count(&self), 1);
            tracing::trace!("invalidated block {:?} with nothing attached", self.id);
        } else {
            tracing::trace!(
                "invalidated block {:?}, {} attachments outstanding",
                self.id,
                self.attachments.get()
            );
        }
    }

    pub(crate) fn attach(self: &Rc<Self>) -> Rc<Self> {
        stats::bump(Counter::Attached);
        self.attachments.increment();
        Rc::clone(self)
    }

    /// Gives up one attachment along with its `Rc`.
    ///
    /// Validity and attachment are fused into one number: a valid block contributes its
    /// (non-negative) size and an invalid one contributes -1, so `attachments + contribution`
    /// only goes negative once the block is both invalid and unattached. Whichever of
    /// invalidation and the last detach happens second is the one that frees it.
    pub(crate) fn detach(self: Rc<Self>) {
        stats::bump(Counter::Detached);
        debug_assert!(self.attachments.get() > 0, "detached from {:?} too often", self.id);
        self.attachments.decrement();
        let remaining = isize::try_from(self.attachments.get()).unwrap_or(isize::MAX);
        let can_free = remaining + self.liveness.get().contribution() < 0;
        debug_assert_eq!(Rc::strong_count(&self) == 1, can_free);
        #[cfg(debug_assertions)]
        self.invariant();
        if can_free {
            tracing::trace!("last attachment left invalid block {:?}", self.id);
        }
    }
}

impl Invariant for ControlBlock {
    fn invariant(&self) {
        self.borrows.invariant();
        if self.borrows.has_deferred() {
            // only a dead owner defers
            assert_eq!(self.liveness.get(), Liveness::Invalid);
        }
    }
}

impl Drop for ControlBlock {
    fn drop(&mut self) {
        stats::bump(Counter::BlockFreed);
        tracing::trace!("freeing block {:?}", self.id);
        debug_assert_eq!(self.attachments.get(), 0);
        debug_assert_eq!(self.liveness.get(), Liveness::Invalid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::stats;
    use std::rc::Rc;

    fn unchecked() -> Rc<ControlBlock> {
        ControlBlock::create(1, ThreadAffinity::Unchecked, Rc::default())
    }

    #[test]
    fn invalidate_with_nothing_attached_frees_immediately() {
        let before = stats();
        let block = unchecked();
        let weak = Rc::downgrade(&block);
        block.invalidate();
        assert!(weak.upgrade().is_none());
        let diff = stats() - before;
        assert_eq!(diff.blocks_created, 1);
        assert_eq!(diff.blocks_freed, 1);
    }

    #[test]
    fn last_detach_after_invalidate_frees() {
        let block = unchecked();
        let weak = Rc::downgrade(&block);
        let a = block.attach();
        let b = block.attach();
        assert_eq!(block.attachments(), 2);
        block.invalidate();
        assert_eq!(a.is_valid(), Ok(false));
        a.detach();
        assert!(weak.upgrade().is_some());
        b.detach();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn detaching_to_zero_while_valid_keeps_block() {
        let block = unchecked();
        let weak = Rc::downgrade(&block);
        let a = block.attach();
        a.detach();
        assert_eq!(block.attachments(), 0);
        assert_eq!(block.is_valid(), Ok(true));
        assert!(weak.upgrade().is_some());
        block.invalidate();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn empty_slice_block_survives_last_detach() {
        // Valid(0) contributes zero, which is still not negative.
        let block = ControlBlock::create(0, ThreadAffinity::Unchecked, Rc::default());
        let weak = Rc::downgrade(&block);
        block.attach().detach();
        assert!(weak.upgrade().is_some());
        block.invalidate();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn element_count_drops_to_zero_on_invalidate() {
        let block = ControlBlock::create(5, ThreadAffinity::Unchecked, Rc::default());
        let a = block.attach();
        assert_eq!(a.element_count(), 5);
        block.invalidate();
        assert_eq!(a.element_count(), 0);
        a.detach();
    }

    #[test]
    fn strict_block_rejects_other_threads() {
        let foreign = std::thread::spawn(|| std::thread::current().id())
            .join()
            .unwrap();
        let block = ControlBlock::with_origin(1, Some(foreign), Rc::default());
        match block.is_valid() {
            Err(Error::ThreadAffinityViolation { origin, current }) => {
                assert_eq!(origin, foreign);
                assert_eq!(current, std::thread::current().id());
            }
            other => panic!("expected an affinity violation, got {other:?}"),
        }
        block.invalidate();
    }

    #[test]
    fn strict_block_accepts_its_own_thread() {
        let block = ControlBlock::create(1, ThreadAffinity::Strict, Rc::default());
        assert_eq!(block.is_valid(), Ok(true));
        block.invalidate();
    }

    #[test]
    fn blocks_of_one_object_share_its_borrows() {
        let flag = Rc::<BorrowFlag>::default();
        let old = ControlBlock::create(1, ThreadAffinity::Unchecked, flag.clone());
        let guard = old.attach();
        guard.borrows().try_shared().unwrap();
        old.invalidate();

        let fresh = ControlBlock::create(1, ThreadAffinity::Unchecked, flag.clone());
        assert_eq!(fresh.borrows().try_exclusive(), Err(Error::AlreadyBorrowed));
        assert!(guard.borrows().release().is_none());
        fresh.borrows().try_exclusive().unwrap();
        assert!(fresh.borrows().release().is_none());

        guard.detach();
        fresh.invalidate();
    }
}
