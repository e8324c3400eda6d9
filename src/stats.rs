use std::cell::Cell;
use std::fmt::{self, Debug};
use std::ops::Sub;

use crate::CellIncrement;

#[derive(Default)]
struct Counters {
    blocks_created: Cell<usize>,
    blocks_freed: Cell<usize>,
    invalidations: Cell<usize>,
    attaches: Cell<usize>,
    detaches: Cell<usize>,
    deferred_deletions: Cell<usize>,
}

thread_local! {
    static COUNTERS: Counters = Counters::default();
}

#[derive(Clone, Copy)]
pub(crate) enum Counter {
    BlockCreated,
    BlockFreed,
    Invalidated,
    Attached,
    Detached,
    DeletionDeferred,
}

pub(crate) fn bump(counter: Counter) {
    // Blocks can be freed from thread-local destructors, after ours is gone.
    let _ = COUNTERS.try_with(|c| {
        match counter {
            Counter::BlockCreated => &c.blocks_created,
            Counter::BlockFreed => &c.blocks_freed,
            Counter::Invalidated => &c.invalidations,
            Counter::Attached => &c.attaches,
            Counter::Detached => &c.detaches,
            Counter::DeletionDeferred => &c.deferred_deletions,
        }
        .increment()
    });
}

/// Snapshot of this thread's control block activity.
///
/// Counters are per thread, since every block lives and dies on the thread that made it.
/// Subtract two snapshots to see what a piece of code did:
///
/// ```
/// use unique_observer::{stats, Owner};
///
/// let before = stats();
/// let owner = Owner::new(1);
/// let observer = owner.observe();
/// drop(owner);
/// drop(observer);
/// let diff = stats() - before;
/// assert_eq!(diff.blocks_created, 1);
/// assert_eq!(diff.blocks_freed, 1);
/// ```
pub fn stats() -> Stats {
    COUNTERS.with(|c| {
        let created = c.blocks_created.get();
        let freed = c.blocks_freed.get();
        Stats {
            blocks_created: created,
            blocks_freed: freed,
            live_blocks: created - freed,
            invalidations: c.invalidations.get(),
            attaches: c.attaches.get(),
            detaches: c.detaches.get(),
            deferred_deletions: c.deferred_deletions.get(),
        }
    })
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Stats {
    pub blocks_created: usize,
    pub blocks_freed: usize,
    pub live_blocks: usize,
    pub invalidations: usize,
    pub attaches: usize,
    pub detaches: usize,
    pub deferred_deletions: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct StatsDiff {
    pub blocks_created: isize,
    pub blocks_freed: isize,
    pub live_blocks: isize,
    pub invalidations: isize,
    pub attaches: isize,
    pub detaches: isize,
    pub deferred_deletions: isize,
}

impl Debug for StatsDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("StatsDiff");
        let mut field = |name: &str, x: isize| {
            if x != 0 {
                f.field(name, &x);
            }
        };
        field("blocks_created", self.blocks_created);
        field("blocks_freed", self.blocks_freed);
        field("live_blocks", self.live_blocks);
        field("invalidations", self.invalidations);
        field("attaches", self.attaches);
        field("detaches", self.detaches);
        field("deferred_deletions", self.deferred_deletions);
        f.finish()
    }
}

impl Stats {
    pub fn diff(&self, other: Self) -> StatsDiff {
        StatsDiff {
            blocks_created: self.blocks_created as isize - other.blocks_created as isize,
            blocks_freed: self.blocks_freed as isize - other.blocks_freed as isize,
            live_blocks: self.live_blocks as isize - other.live_blocks as isize,
            invalidations: self.invalidations as isize - other.invalidations as isize,
            attaches: self.attaches as isize - other.attaches as isize,
            detaches: self.detaches as isize - other.detaches as isize,
            deferred_deletions: self.deferred_deletions as isize
                - other.deferred_deletions as isize,
        }
    }
}

impl Sub for Stats {
    type Output = StatsDiff;
    fn sub(self, rhs: Self) -> Self::Output {
        self.diff(rhs)
    }
}

#[test]
fn diff_debug_skips_zeroes() {
    let diff = StatsDiff {
        blocks_created: 2,
        detaches: -1,
        ..Default::default()
    };
    assert_eq!(
        format!("{diff:?}"),
        "StatsDiff { blocks_created: 2, detaches: -1 }"
    );
}
