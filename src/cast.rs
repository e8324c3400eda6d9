//! Conversions between observers of related types.
//!
//! Rust has no subclassing, so "base" means a trait object the concrete type implements.
//! [Upcast] says which conversions exist. Types opt in with [crate::impl_upcast], and a pair
//! the compiler cannot unsize is rejected when the macro expands.
//! [Downcast] goes the other way, at run time, by asking the object for its `TypeId`.

use std::any::Any;
use std::ptr::NonNull;

/// `Self` can be viewed as a `U`.
///
/// Every type upcasts to itself. Trait-object conversions are declared with
/// [crate::impl_upcast]:
///
/// ```
/// use unique_observer::{impl_upcast, Observer, Owner};
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
/// struct Square(f64);
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
/// impl_upcast!(Square => dyn Shape);
///
/// let owner = Owner::new(Square(3.0));
/// let shape: Observer<dyn Shape> = owner.observe().upcast();
/// assert_eq!(shape.borrow().area(), 9.0);
/// ```
///
/// # Safety
///
/// `upcast` must return a pointer into the same allocation that stays valid exactly as long as
/// `ptr` does. Anything else would let observers outlive what they point at.
pub unsafe trait Upcast<U: ?Sized> {
    fn upcast(ptr: NonNull<Self>) -> NonNull<U>;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    #[inline]
    fn upcast(ptr: NonNull<T>) -> NonNull<T> {
        ptr
    }
}

/// Declares unsizing upcasts, e.g. `impl_upcast!(Dog, Cat => dyn Animal)`.
#[macro_export]
macro_rules! impl_upcast {
    ($($from:ty),+ => $to:ty) => {
        $(
            // The body is a plain unsizing coercion, which never changes the address.
            unsafe impl $crate::Upcast<$to> for $from {
                #[inline]
                fn upcast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$to> {
                    ptr
                }
            }
        )+
    };
}

/// Run-time type identification for [crate::Observer::downcast].
///
/// Implemented for every sized `'static` type. Make it a supertrait of your trait so that
/// observers of the trait object can be downcast:
///
/// ```
/// use unique_observer::{impl_upcast, Downcast, Observer, Owner};
///
/// trait Animal: Downcast {}
/// struct Dog;
/// struct Cat;
/// impl Animal for Dog {}
/// impl Animal for Cat {}
/// impl_upcast!(Dog, Cat => dyn Animal);
///
/// let owner = Owner::new(Dog);
/// let animal: Observer<dyn Animal> = owner.observe().upcast();
/// assert!(animal.downcast::<Dog>().is_valid());
/// assert!(!animal.downcast::<Cat>().is_valid());
/// ```
pub trait Downcast: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> Downcast for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Downcast for dyn Any {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}
