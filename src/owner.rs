use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use crate::borrow::{Ref, RefMut};
use crate::notify::{Allocate, Deleter, Global, Notifier};
use crate::{Error, Observer, Path, ThreadAffinity};

/// Exclusive owner of a heap object that [Observer]s can watch.
///
/// Behaves like a `Box` that tells its observers when the object dies. Dropping the owner, or
/// replacing or resetting the object, invalidates every observer at once. The control block is
/// only created once somebody observes or borrows, so an owner nobody watches costs nothing
/// extra.
///
/// Access goes through [Ref]/[RefMut] guards, checked at run time like a `RefCell`, since
/// observers may be reading the object at the same time.
pub struct Owner<T: ?Sized + 'static, D: Deleter<T> = Global> {
    pub(crate) ptr: Option<NonNull<T>>,
    pub(crate) notifier: Notifier<D>,
    _owns: PhantomData<T>,
}

impl<T: 'static> Owner<T> {
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }
}

impl<T: ?Sized + 'static> Owner<T> {
    pub fn null() -> Self {
        Self::null_in(Global)
    }

    /// Takes over a boxed object. Slices should come in through `From<Box<[T]>>` or
    /// [Owner::from_vec] instead, which record the length for [Owner::element_count].
    pub fn from_box(boxed: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(boxed));
        // Safety: Global deletes by reconstructing the box.
        unsafe { Self::from_raw_parts(ptr, Global) }
    }

    /// Takes the object back out. Observers are invalidated first, as if it had been dropped.
    ///
    /// Gives the owner back unchanged if it is null, or if a borrow guard is alive.
    pub fn into_box(self) -> Result<Box<T>, Self> {
        if self.ptr.is_none() || self.notifier.is_borrowed() {
            return Err(self);
        }
        let (ptr, Global) = self.into_raw_parts()?;
        match ptr {
            // Safety: the pointer came from a Box, and the owner has let go of it.
            Some(ptr) => Ok(unsafe { Box::from_raw(ptr.as_ptr()) }),
            None => Err(Self::null()),
        }
    }
}

impl<T: 'static> Owner<[T]> {
    pub fn from_vec(vec: Vec<T>) -> Self {
        vec.into_boxed_slice().into()
    }
}

impl<T: ?Sized + 'static, D: Deleter<T> + Default> Default for Owner<T, D> {
    fn default() -> Self {
        Self::null_in(D::default())
    }
}

impl<T: 'static, D: Allocate<T>> Owner<T, D> {
    pub fn new_in(value: T, mut alloc: D) -> Self {
        let ptr = alloc.allocate(value);
        // Safety: allocated by the same strategy that will delete it.
        unsafe { Self::from_raw_parts(ptr, alloc) }
    }

    /// Swaps in a new object. Observers of the old one are invalidated, and the old one is
    /// deleted.
    pub fn try_replace(&mut self, value: T) -> Result<(), Error> {
        self.try_reset()?;
        self.ptr = Some(self.notifier.deleter_mut().allocate(value));
        Ok(())
    }

    /// # Panics
    ///
    /// If a borrow guard is alive.
    pub fn replace(&mut self, value: T) {
        self.try_replace(value).unwrap_or_else(|e| panic!("{e}"))
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> Owner<T, D> {
    /// # Safety
    ///
    /// `ptr` must point to a live object that `deleter` may delete, and nothing else may delete
    /// it.
    pub unsafe fn from_raw_parts(ptr: NonNull<T>, deleter: D) -> Self {
        Self {
            ptr: Some(ptr),
            notifier: Notifier::new(deleter),
            _owns: PhantomData,
        }
    }

    pub fn null_in(deleter: D) -> Self {
        Self {
            ptr: None,
            notifier: Notifier::new(deleter),
            _owns: PhantomData,
        }
    }

    /// Picks strict or unchecked thread affinity for this owner's control blocks.
    pub fn with_affinity(mut self, affinity: ThreadAffinity) -> Self {
        self.notifier.set_affinity(affinity);
        self
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.notifier.affinity()
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn deleter(&self) -> &D {
        self.notifier.deleter()
    }

    pub fn deleter_mut(&mut self) -> &mut D {
        self.notifier.deleter_mut()
    }

    #[must_use]
    pub fn observe(&self) -> Observer<T> {
        Observer::new(self)
    }

    /// Severs every current observer without touching the object. The owner stays usable, and
    /// later observers attach to a fresh control block. Borrow guards already handed out keep
    /// the object borrowed until they are dropped.
    pub fn invalidate_observers(&self) {
        tracing::trace!("invalidating observers on request");
        self.notifier.invalidate();
    }

    /// Attachments on the current control block: observers plus live borrow guards.
    pub fn attachment_count(&self) -> usize {
        self.notifier.attachments()
    }

    /// 1 for a single object, the length for a slice, 0 when null.
    pub fn element_count(&self) -> usize {
        if self.ptr.is_some() {
            self.notifier.recorded_size()
        } else {
            0
        }
    }

    /// An observer of a part of the object, sharing this owner's control block.
    pub fn point_into<U: ?Sized>(&self, path: &Path<T, U>) -> Result<Observer<U>, Error> {
        let root = self.ptr.ok_or(Error::NullDereference)?;
        let target = path.resolve(root)?;
        Ok(Observer::attached(target, self.notifier.observe()))
    }

    pub fn try_borrow(&self) -> Result<Ref<T>, Error> {
        let ptr = self.ptr.ok_or(Error::NullDereference)?;
        Ok(Ref::new(ptr, self.notifier.loan_shared()?))
    }

    /// # Panics
    ///
    /// If null or mutably borrowed.
    pub fn borrow(&self) -> Ref<T> {
        self.try_borrow().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<T>, Error> {
        let ptr = self.ptr.ok_or(Error::NullDereference)?;
        Ok(RefMut::new(ptr, self.notifier.loan_exclusive()?))
    }

    /// # Panics
    ///
    /// If null or borrowed.
    pub fn borrow_mut(&self) -> RefMut<T> {
        self.try_borrow_mut().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Deletes the object and becomes null. Observers are invalidated first.
    pub fn try_reset(&mut self) -> Result<(), Error> {
        self.notifier.check_unborrowed()?;
        self.notifier.invalidate();
        if let Some(ptr) = self.ptr.take() {
            // Safety: owned, not borrowed, and no longer reachable through self.
            unsafe { self.notifier.deleter_mut().delete(ptr) }
        }
        Ok(())
    }

    /// # Panics
    ///
    /// If a borrow guard is alive.
    pub fn reset(&mut self) {
        self.try_reset().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Splits into the raw pointer and the deleter, invalidating observers. Gives the owner back
    /// if a borrow guard is alive.
    pub fn into_raw_parts(self) -> Result<(Option<NonNull<T>>, D), Self> {
        if self.notifier.is_borrowed() {
            return Err(self);
        }
        let this = ManuallyDrop::new(self);
        let ptr = this.ptr;
        // Safety: `this` is never dropped, so the notifier is moved out exactly once.
        let notifier = unsafe { ptr::read(&this.notifier) };
        Ok((ptr, notifier.into_deleter()))
    }
}

impl<T: 'static> From<Box<T>> for Owner<T> {
    fn from(boxed: Box<T>) -> Self {
        Self::from_box(boxed)
    }
}

impl<T: 'static> From<Box<[T]>> for Owner<[T]> {
    fn from(boxed: Box<[T]>) -> Self {
        let len = boxed.len();
        let owner = Self::from_box(boxed);
        owner.notifier.set_size(len);
        owner
    }
}

impl<T: 'static> From<Vec<T>> for Owner<[T]> {
    fn from(vec: Vec<T>) -> Self {
        Self::from_vec(vec)
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> fmt::Debug for Owner<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("ptr", &self.ptr)
            .field("attachments", &self.attachment_count())
            .finish()
    }
}

impl<T: ?Sized + 'static, D: Deleter<T>> Drop for Owner<T, D> {
    fn drop(&mut self) {
        // Safety: this is the end of the owner; nothing uses the deleter after this.
        let deleter = unsafe { self.notifier.take_deleter() };
        match self.ptr.take() {
            Some(ptr) => self.notifier.retire(ptr, deleter),
            None => {
                self.notifier.invalidate();
                drop(deleter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::stats;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingDeleter(Rc<Cell<u32>>);

    impl Deleter<String> for CountingDeleter {
        unsafe fn delete(&mut self, ptr: NonNull<String>) {
            self.0.set(self.0.get() + 1);
            Global.delete(ptr)
        }
    }

    impl Allocate<String> for CountingDeleter {
        fn allocate(&mut self, value: String) -> NonNull<String> {
            Global.allocate(value)
        }
    }

    #[test]
    fn custom_deleter_runs_exactly_once() {
        let deletes = Rc::new(Cell::new(0));
        let owner = Owner::new_in("x".to_string(), CountingDeleter(deletes.clone()));
        let obs = owner.observe();
        drop(owner);
        assert!(!obs.is_valid());
        assert_eq!(deletes.get(), 1);
    }

    #[test]
    fn replace_invalidates_old_observers_only() {
        let deletes = Rc::new(Cell::new(0));
        let mut owner = Owner::new_in("old".to_string(), CountingDeleter(deletes.clone()));
        let old = owner.observe();
        owner.replace("new".to_string());
        assert_eq!(deletes.get(), 1);
        assert!(!old.is_valid());
        let new = owner.observe();
        assert_eq!(&*new.borrow(), "new");
    }

    #[test]
    fn replace_while_borrowed_is_refused() {
        let mut owner = Owner::new(String::from("kept"));
        let obs = owner.observe();
        let guard = obs.borrow();
        assert_eq!(owner.try_replace("lost".into()), Err(Error::AlreadyBorrowed));
        assert_eq!(&*guard, "kept");
        drop(guard);
        owner.replace("fresh".into());
        assert!(!obs.is_valid());
    }

    #[test]
    fn unobserved_owner_creates_no_block() {
        let before = stats();
        let owner = Owner::new(5);
        assert_eq!(owner.attachment_count(), 0);
        drop(owner);
        assert_eq!((stats() - before).blocks_created, 0);
    }

    #[test]
    fn null_owner() {
        let owner: Owner<u8> = Owner::null();
        assert!(owner.is_null());
        assert_eq!(owner.element_count(), 0);
        assert!(owner.observe().get().is_none());
        assert_eq!(owner.try_borrow().err(), Some(Error::NullDereference));
        assert_eq!(
            owner.point_into(&Path::new()).err(),
            Some(Error::NullDereference)
        );
    }

    #[test]
    fn into_box_hands_back_the_object() {
        let owner = Owner::new(vec![1, 2]);
        let obs = owner.observe();
        let guard = obs.borrow();
        let owner = owner.into_box().expect_err("borrowed");
        drop(guard);
        let boxed = owner.into_box().expect("not borrowed");
        assert_eq!(*boxed, [1, 2]);
        assert!(!obs.is_valid());
    }

    #[test]
    fn severed_guards_still_hold_the_object() {
        let mut owner = Owner::new(String::from("held"));
        let obs = owner.observe();
        let guard = obs.borrow();
        owner.invalidate_observers();
        assert!(!obs.is_valid());

        assert_eq!(owner.try_reset(), Err(Error::AlreadyBorrowed));
        assert_eq!(owner.try_replace("lost".into()), Err(Error::AlreadyBorrowed));
        let owner = owner.into_raw_parts().expect_err("still borrowed");
        let owner = owner.into_box().expect_err("still borrowed");
        assert_eq!(&*guard, "held");

        drop(guard);
        assert_eq!(*owner.into_box().expect("released"), "held");
    }

    #[test]
    fn into_raw_parts_keeps_the_deleter() {
        let deletes = Rc::new(Cell::new(0));
        let owner = Owner::new_in("raw".to_string(), CountingDeleter(deletes.clone()));
        let obs = owner.observe();
        let (ptr, mut deleter) = owner.into_raw_parts().unwrap();
        assert!(!obs.is_valid());
        assert_eq!(deletes.get(), 0);
        unsafe { deleter.delete(ptr.unwrap()) };
        assert_eq!(deletes.get(), 1);
    }

    #[test]
    fn affinity_applies_to_an_untouched_slice_block() {
        let owner = Owner::from_vec(vec![1, 2, 3]).with_affinity(ThreadAffinity::Unchecked);
        assert_eq!(owner.affinity(), ThreadAffinity::Unchecked);
        assert_eq!(owner.element_count(), 3);
        let obs = owner.observe();
        assert_eq!(obs.element_count(), 3);
        assert_eq!(obs.try_is_valid(), Ok(true));
    }

    #[test]
    fn slice_owner_counts_elements() {
        let owner: Owner<[u8]> = vec![0; 4].into();
        assert_eq!(owner.element_count(), 4);
        let obs = owner.observe();
        assert_eq!(obs.element_count(), 4);
        owner.invalidate_observers();
        assert_eq!(obs.element_count(), 0);
        assert_eq!(owner.observe().element_count(), 4);
    }
}
