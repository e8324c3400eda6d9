//! Equality by address.
//!
//! Two handles are equal when they point at the same place right now. A dead observer points
//! nowhere, so it equals null. Metadata is ignored: an observer of `dyn Trait` equals an
//! observer of the concrete type at the same address, and an alias of a struct's first field
//! equals an observer of the struct.

use std::ptr::NonNull;

use crate::notify::Deleter;
use crate::{thin_addr, Observer, Owner};

impl<T: ?Sized, U: ?Sized> PartialEq<Observer<U>> for Observer<T> {
    fn eq(&self, other: &Observer<U>) -> bool {
        thin_addr(self.get()) == thin_addr(other.get())
    }
}

impl<T: ?Sized> Eq for Observer<T> {}

impl<T, U, D> PartialEq<Owner<U, D>> for Observer<T>
where
    T: ?Sized,
    U: ?Sized + 'static,
    D: Deleter<U>,
{
    fn eq(&self, other: &Owner<U, D>) -> bool {
        thin_addr(self.get()) == thin_addr(other.get())
    }
}

impl<T, D, U> PartialEq<Observer<U>> for Owner<T, D>
where
    T: ?Sized + 'static,
    D: Deleter<T>,
    U: ?Sized,
{
    fn eq(&self, other: &Observer<U>) -> bool {
        thin_addr(self.get()) == thin_addr(other.get())
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<*const U> for Observer<T> {
    fn eq(&self, other: &*const U) -> bool {
        thin_addr(self.get()) == *other as *const ()
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<*mut U> for Observer<T> {
    fn eq(&self, other: &*mut U) -> bool {
        thin_addr(self.get()) == *other as *const ()
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Option<NonNull<U>>> for Observer<T> {
    fn eq(&self, other: &Option<NonNull<U>>) -> bool {
        thin_addr(self.get()) == thin_addr(*other)
    }
}

impl<T: ?Sized> Observer<T> {
    /// No object: never attached, reset, or dead. Detaches on finding it dead.
    pub fn is_null(&self) -> bool {
        self.get().is_none()
    }
}
