use std::cell::Cell;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) usize);
impl BlockId {
    pub(super) fn next() -> Self {
        thread_local! {
            static BLOCK_ID: Cell<usize> = const { Cell::new(0) };
        }

        BLOCK_ID.with(|x| {
            let next = x.get() + 1;
            x.set(next);
            BlockId(next)
        })
    }
}
impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
