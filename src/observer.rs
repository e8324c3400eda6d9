use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

use crate::borrow::{Ref, RefMut};
use crate::cast::{Downcast, Upcast};
use crate::link::Link;
use crate::notify::Deleter;
use crate::{Error, Owner, Path};

/// A non-owning pointer to an object held by an [Owner], that knows when the object is gone.
///
/// Observers never keep the object alive and never dangle: once the owner drops, resets or
/// replaces the object, every observer reports itself invalid and [Observer::get] returns
/// `None`. The first observer to notice lets go of the control block, so invalid observers
/// hold on to nothing but their own cached address.
///
/// Nothing turns an owner itself into an observer, so handing over an owner by value is a build
/// error:
///
/// ```compile_fail
/// use unique_observer::{Observer, Owner};
/// let dangling: Observer<u8> = Owner::new(1).into();
/// ```
///
/// Borrowing a temporary still compiles, though. `Owner::new(1).observe()` and
/// `Observer::from(&Owner::new(1))` build an observer whose owner is gone by the end of the
/// statement. Such an observer is invalid from its first check and never dangles:
///
/// ```
/// use unique_observer::Owner;
/// let stillborn = Owner::new(1).observe();
/// assert!(!stillborn.is_valid());
/// assert!(stillborn.get().is_none());
/// ```
pub struct Observer<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    link: Link,
}

impl<T: ?Sized> Observer<T> {
    pub fn null() -> Self {
        Self {
            ptr: None,
            link: Link::default(),
        }
    }

    pub(crate) fn attached(ptr: NonNull<T>, link: Link) -> Self {
        Self {
            ptr: Some(ptr),
            link,
        }
    }

    #[must_use]
    pub fn new<D: Deleter<T>>(owner: &Owner<T, D>) -> Self
    where
        T: 'static,
    {
        Self::from_owner(owner)
    }

    /// Observes `owner`'s object as a `T`, for any `S` that upcasts to `T`.
    #[must_use]
    pub fn from_owner<S, D>(owner: &Owner<S, D>) -> Self
    where
        S: ?Sized + Upcast<T> + 'static,
        D: Deleter<S>,
    {
        match owner.get() {
            Some(ptr) => Self::attached(<S as Upcast<T>>::upcast(ptr), owner.notifier.observe()),
            None => Self::null(),
        }
    }

    /// The cached address, if the object is still alive. Detaches on finding it dead.
    pub fn try_get(&self) -> Result<Option<NonNull<T>>, Error> {
        if self.link.check_valid()? {
            Ok(self.ptr)
        } else {
            Ok(None)
        }
    }

    /// # Panics
    ///
    /// With [Error::ThreadAffinityViolation], if a strict control block is checked from a
    /// thread that did not create it.
    pub fn get(&self) -> Option<NonNull<T>> {
        self.try_get().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_is_valid(&self) -> Result<bool, Error> {
        self.link.check_valid()
    }

    /// Whether the object is still alive. An observer that finds out it is not lets go of the
    /// control block right away.
    ///
    /// # Panics
    ///
    /// As [Observer::get].
    pub fn is_valid(&self) -> bool {
        self.try_is_valid().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_borrow(&self) -> Result<Ref<T>, Error> {
        let ptr = self.try_get()?.ok_or(Error::NullDereference)?;
        Ok(Ref::new(ptr, self.link.loan_shared()?))
    }

    /// # Panics
    ///
    /// With [Error::NullDereference] if the object is gone, or if it is mutably borrowed.
    pub fn borrow(&self) -> Ref<T> {
        self.try_borrow().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<T>, Error> {
        let ptr = self.try_get()?.ok_or(Error::NullDereference)?;
        Ok(RefMut::new(ptr, self.link.loan_exclusive()?))
    }

    /// # Panics
    ///
    /// With [Error::NullDereference] if the object is gone, or if it is borrowed.
    pub fn borrow_mut(&self) -> RefMut<T> {
        self.try_borrow_mut().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Same object, seen through a wider type. Keeps the attachment.
    pub fn upcast<U: ?Sized>(self) -> Observer<U>
    where
        T: Upcast<U>,
    {
        Observer {
            ptr: self.ptr.map(<T as Upcast<U>>::upcast),
            link: self.link,
        }
    }

    /// An observer of a part of this one's object, sharing its control block.
    pub fn point_into<U: ?Sized>(&self, path: &Path<T, U>) -> Result<Observer<U>, Error> {
        let root = self.try_get()?.ok_or(Error::NullDereference)?;
        let target = path.resolve(root)?;
        Ok(Observer::attached(target, Link::adopt(&self.link)))
    }

    /// Observers and borrow guards on the control block, 0 if detached.
    pub fn attachment_count(&self) -> usize {
        self.link.attachments()
    }

    /// 1 for a single object, the length for a slice, 0 once dead or detached.
    pub fn element_count(&self) -> usize {
        self.link.element_count()
    }

    /// Detaches and becomes null.
    pub fn reset(&mut self) {
        self.link.release();
        self.ptr = None;
    }
}

impl<T: ?Sized + Downcast> Observer<T> {
    /// Observes the same object as a concrete `U`. A null observer comes back if the object is
    /// not a `U`, or is gone; this one is left alone either way.
    pub fn try_downcast<U: Any>(&self) -> Result<Observer<U>, Error> {
        let Some(ptr) = self.try_get()? else {
            return Ok(Observer::null());
        };
        // Reading the vtable means reading the object, so take a shared borrow for it.
        let loan = self.link.loan_shared()?;
        // Safety: alive, and the loan rules out writers.
        let any = <T as Downcast>::as_any(unsafe { ptr.as_ref() });
        let matches = any.is::<U>();
        debug_assert!(
            !matches || std::ptr::eq(any as *const dyn Any as *const (), ptr.as_ptr() as *const ())
        );
        drop(loan);
        if !matches {
            tracing::debug!("downcast observer to a type the object does not have");
            return Ok(Observer::null());
        }
        Ok(Observer::attached(ptr.cast::<U>(), Link::adopt(&self.link)))
    }

    /// # Panics
    ///
    /// If the object is mutably borrowed.
    pub fn downcast<U: Any>(&self) -> Observer<U> {
        self.try_downcast().unwrap_or_else(|e| panic!("{e}"))
    }
}

impl<T: ?Sized> Default for Observer<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> Clone for Observer<T> {
    /// A clone of a dead observer is null and unattached.
    ///
    /// # Panics
    ///
    /// As [Observer::get].
    fn clone(&self) -> Self {
        let link = Link::adopt_if_valid(&self.link).unwrap_or_else(|e| panic!("{e}"));
        let ptr = if link.is_attached() { self.ptr } else { None };
        Self { ptr, link }
    }
}

impl<'a, T: ?Sized + 'static, D: Deleter<T>> From<&'a Owner<T, D>> for Observer<T> {
    fn from(owner: &'a Owner<T, D>) -> Self {
        Self::new(owner)
    }
}

impl<T: ?Sized> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Observer");
        s.field("ptr", &self.ptr);
        match self.link.peek_valid() {
            Some(Ok(valid)) => s.field("valid", &valid),
            Some(Err(_)) => s.field("valid", &"<other thread>"),
            None => s.field("valid", &false),
        };
        s.field("link", &self.link).finish()
    }
}
