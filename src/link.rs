use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::block::{BlockId, ControlBlock};
use crate::borrow::Loan;
use crate::Error;

/// An observer's attachment to a control block.
///
/// The connection sits in a `Cell` so that `&self` methods can drop it: discovering that the
/// block is invalid detaches on the spot, letting the block be freed as soon as possible rather
/// than whenever the observer itself goes away.
///
/// Holding `Some` always means holding exactly one attachment.
#[derive(Default)]
pub(crate) struct Link {
    block: Cell<Option<Rc<ControlBlock>>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_id() {
            Some(id) => write!(f, "Link({id:?})"),
            None => write!(f, "Link(detached)"),
        }
    }
}

impl Link {
    /// Wraps an `Rc` that already carries an attachment.
    pub(crate) fn attached(block: Rc<ControlBlock>) -> Self {
        Self {
            block: Cell::new(Some(block)),
        }
    }

    fn peek<R>(&self, f: impl FnOnce(&Rc<ControlBlock>) -> R) -> Option<R> {
        let block = self.block.take()?;
        let r = f(&block);
        self.block.set(Some(block));
        Some(r)
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.peek(|_| ()).is_some()
    }

    pub(crate) fn block_id(&self) -> Option<BlockId> {
        self.peek(|b| b.id())
    }

    /// Checks validity, detaching if the block turns out to be dead.
    pub(crate) fn check_valid(&self) -> Result<bool, Error> {
        let Some(block) = self.block.take() else {
            return Ok(false);
        };
        match block.is_valid() {
            Ok(true) => {
                self.block.set(Some(block));
                Ok(true)
            }
            Ok(false) => {
                block.detach();
                Ok(false)
            }
            Err(e) => {
                self.block.set(Some(block));
                Err(e)
            }
        }
    }

    /// Validity without the side effect, for `Debug`.
    pub(crate) fn peek_valid(&self) -> Option<Result<bool, Error>> {
        self.peek(|b| b.is_valid())
    }

    pub(crate) fn release(&self) {
        if let Some(block) = self.block.take() {
            block.detach();
        }
    }

    /// A copy of `src` that is attached only if `src` is currently valid. Attaching to a dead
    /// block never happens through this path.
    pub(crate) fn adopt_if_valid(src: &Link) -> Result<Link, Error> {
        let adopted = src.peek(|block| -> Result<Option<Rc<ControlBlock>>, Error> {
            Ok(block.is_valid()?.then(|| block.attach()))
        });
        Ok(match adopted.transpose()?.flatten() {
            Some(block) => Link::attached(block),
            None => Link::default(),
        })
    }

    /// A copy of `src` attached to the same block, whatever its state. Only used once the
    /// caller has just established validity.
    pub(crate) fn adopt(src: &Link) -> Link {
        match src.peek(|block| block.attach()) {
            Some(block) => Link::attached(block),
            None => Link::default(),
        }
    }

    pub(crate) fn attachments(&self) -> usize {
        self.peek(|b| b.attachments()).unwrap_or(0)
    }

    pub(crate) fn element_count(&self) -> usize {
        self.peek(|b| b.element_count()).unwrap_or(0)
    }

    pub(crate) fn loan_shared(&self) -> Result<Loan, Error> {
        self.peek(Loan::shared).unwrap_or(Err(Error::NullDereference))
    }

    pub(crate) fn loan_exclusive(&self) -> Result<Loan, Error> {
        self.peek(Loan::exclusive).unwrap_or(Err(Error::NullDereference))
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.release();
    }
}
