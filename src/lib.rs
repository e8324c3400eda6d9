#![doc = include_str!("../README.md")]
#![allow(clippy::type_complexity)]

mod affinity;
mod block;
mod borrow;
mod cast;
mod cmp;
mod error;
mod link;
mod notify;
mod observer;
mod owner;
mod path;
mod stats;

pub use affinity::ThreadAffinity;
pub use borrow::{Ref, RefMut};
pub use cast::{Downcast, Upcast};
pub use error::Error;
pub use notify::{Allocate, Deleter, Global};
pub use observer::Observer;
pub use owner::Owner;
pub use path::{Field, Indexed, Path, Step};
pub use stats::{stats, Stats, StatsDiff};

use std::cell::Cell;
use std::ptr::NonNull;

pub(crate) trait Invariant {
    fn invariant(&self);
}

/// Address only, so a fat pointer to a trait object compares equal to a thin pointer to the
/// same object.
#[inline]
pub(crate) fn thin_addr<T: ?Sized>(ptr: Option<NonNull<T>>) -> *const () {
    ptr.map_or(std::ptr::null(), |p| p.as_ptr() as *const ())
}

pub(crate) trait CellIncrement {
    type Num;
    fn increment(&self);
    fn decrement(&self);
    fn update_val(&self, f: impl FnOnce(Self::Num) -> Self::Num);
}

macro_rules! impl_cell_increment {
    ($num_ty:ty) => {
        impl CellIncrement for Cell<$num_ty> {
            type Num = $num_ty;
            #[inline]
            fn update_val(&self, f: impl FnOnce(Self::Num) -> Self::Num) {
                self.set(f(self.get()));
            }
            #[inline(always)]
            fn increment(&self) {
                self.update_val(|x| x + 1)
            }
            #[inline(always)]
            fn decrement(&self) {
                self.update_val(|x| x - 1)
            }
        }
    };
}
impl_cell_increment!(usize);
