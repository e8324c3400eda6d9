//! Alias paths: how to get from an object to one of its parts.
//!
//! A [Path] is built up from steps (run-time index, constant index, field) and then applied to
//! an owner or observer with `point_into`. The resulting observer points at the part but shares
//! the root's control block, so it goes invalid exactly when the root does.
//!
//! Resolution only does address arithmetic, never reads the object.

use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::Error;

/// One step of a [Path], for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Checked when the path is resolved. `bound` is known up front for arrays, not for slices.
    Index { index: usize, bound: Option<usize> },
    /// Checked when the program is compiled.
    ConstIndex { index: usize, bound: usize },
    Field(&'static str),
}

/// A chain of projections from a `T` to a `U` inside it.
///
/// ```
/// use unique_observer::{member, Owner, Path};
///
/// struct Particle {
///     position: [f32; 3],
/// }
///
/// let owner = Owner::new(Particle { position: [1.0, 2.0, 3.0] });
/// let y = Path::new().field(member!(Particle, position)).index(1);
/// let alias = owner.point_into(&y).unwrap();
/// assert_eq!(*alias.borrow(), 2.0);
/// ```
pub struct Path<T: ?Sized, U: ?Sized> {
    steps: SmallVec<[Step; 4]>,
    resolve: Rc<dyn Fn(NonNull<T>) -> Result<NonNull<U>, Error>>,
}

impl<T: ?Sized, U: ?Sized> Clone for Path<T, U> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            resolve: Rc::clone(&self.resolve),
        }
    }
}

impl<T: ?Sized, U: ?Sized> fmt::Debug for Path<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter()).finish()
    }
}

impl<T: ?Sized + 'static> Path<T, T> {
    /// The empty path, resolving to the object itself.
    pub fn new() -> Self {
        Self {
            steps: SmallVec::new(),
            resolve: Rc::new(|root: NonNull<T>| Ok::<_, Error>(root)),
        }
    }
}

impl<T: ?Sized + 'static> Default for Path<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, U: ?Sized> Path<T, U> {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The caller must know `root` points at a live object.
    pub(crate) fn resolve(&self, root: NonNull<T>) -> Result<NonNull<U>, Error> {
        (self.resolve)(root)
    }
}

impl<T: ?Sized + 'static, U: ?Sized + 'static> Path<T, U> {
    fn then<V: ?Sized + 'static>(
        self,
        step: Step,
        next: impl Fn(NonNull<U>) -> Result<NonNull<V>, Error> + 'static,
    ) -> Path<T, V> {
        let Path { mut steps, resolve } = self;
        steps.push(step);
        Path {
            steps,
            resolve: Rc::new(move |root: NonNull<T>| next(resolve(root)?)),
        }
    }

    /// Steps into a field. Build the [Field] with [crate::member].
    pub fn field<V: ?Sized + 'static>(self, field: Field<U, V>) -> Path<T, V> {
        self.then(Step::Field(field.name), move |ptr| Ok((field.project)(ptr)))
    }
}

impl<T, U> Path<T, U>
where
    T: ?Sized + 'static,
    U: ?Sized + Indexed + 'static,
    U::Elem: 'static,
{
    /// Steps to element `index`. Fails with [Error::OutOfRange] when the path is resolved if
    /// the index is past the end.
    pub fn index(self, index: usize) -> Path<T, U::Elem> {
        self.then(
            Step::Index {
                index,
                bound: U::BOUND,
            },
            move |ptr| {
                let len = U::len(ptr);
                if index < len {
                    // Safety: in bounds of the array ptr addresses.
                    Ok(unsafe { NonNull::new_unchecked(ptr.cast::<U::Elem>().as_ptr().add(index)) })
                } else {
                    tracing::debug!("alias index {index} out of range for length {len}");
                    Err(Error::OutOfRange { index, len })
                }
            },
        )
    }
}

struct InBounds<const I: usize, const N: usize>;
impl<const I: usize, const N: usize> InBounds<I, N> {
    const OK: () = assert!(I < N, "constant alias index is out of bounds");
}

impl<T: ?Sized + 'static, E: 'static, const N: usize> Path<T, [E; N]> {
    /// Steps to element `I`, refusing to compile if `I` is out of bounds.
    ///
    /// ```compile_fail
    /// use unique_observer::Path;
    /// let _ = Path::<[u8; 5], [u8; 5]>::new().at::<7>();
    /// ```
    pub fn at<const I: usize>(self) -> Path<T, E> {
        #[allow(clippy::let_unit_value)]
        let () = InBounds::<I, N>::OK;
        self.then(Step::ConstIndex { index: I, bound: N }, |ptr| {
            // Safety: I < N, checked above at compile time.
            Ok(unsafe { NonNull::new_unchecked(ptr.cast::<E>().as_ptr().add(I)) })
        })
    }
}

mod sealed {
    pub trait Sealed {}
    impl<E, const N: usize> Sealed for [E; N] {}
    impl<E> Sealed for [E] {}
}

/// Arrays and slices: the things [Path::index] can step into.
pub trait Indexed: sealed::Sealed {
    type Elem;
    /// The length if the type fixes it.
    const BOUND: Option<usize>;
    fn len(ptr: NonNull<Self>) -> usize;
}

impl<E, const N: usize> Indexed for [E; N] {
    type Elem = E;
    const BOUND: Option<usize> = Some(N);
    fn len(_: NonNull<Self>) -> usize {
        N
    }
}

impl<E> Indexed for [E] {
    type Elem = E;
    const BOUND: Option<usize> = None;
    fn len(ptr: NonNull<Self>) -> usize {
        ptr.len()
    }
}

/// A field of `S` with type `F`: a name plus a pointer projection.
///
/// Use the [crate::member] macro rather than [Field::new].
pub struct Field<S: ?Sized, F: ?Sized> {
    name: &'static str,
    project: fn(NonNull<S>) -> NonNull<F>,
}

impl<S: ?Sized, F: ?Sized> Clone for Field<S, F> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<S: ?Sized, F: ?Sized> Copy for Field<S, F> {}

impl<S: ?Sized, F: ?Sized> fmt::Debug for Field<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({})", self.name)
    }
}

impl<S: ?Sized, F: ?Sized> Field<S, F> {
    /// # Safety
    ///
    /// `project` must return a pointer to a part of `*ptr` stored inline in it, computed from
    /// `ptr` without reading through it. The part then lives exactly as long as the whole.
    pub const unsafe fn new(name: &'static str, project: fn(NonNull<S>) -> NonNull<F>) -> Self {
        Self { name, project }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Names a field for [Path::field]: `member!(Type, field)`.
///
/// Only fields stored in `Type` itself are accepted. Something that merely looks like a field
/// because `Type` derefs to another struct is a compile error:
///
/// ```compile_fail
/// use unique_observer::member;
/// struct Inner { x: u8 }
/// struct Outer(Box<Inner>);
/// impl std::ops::Deref for Outer {
///     type Target = Inner;
///     fn deref(&self) -> &Inner { &self.0 }
/// }
/// let _ = member!(Outer, x);
/// ```
#[macro_export]
macro_rules! member {
    ($ty:path, $field:tt) => {{
        let _must_be_inline = |it: &$ty| {
            let $ty { $field: _, .. } = it;
        };
        let project = |ptr: ::core::ptr::NonNull<$ty>| {
            // Safety: a field place of a non-null pointer to $ty, never read.
            unsafe {
                ::core::ptr::NonNull::new_unchecked(::core::ptr::addr_of_mut!(
                    (*ptr.as_ptr()).$field
                ))
            }
        };
        // Safety: the projection is a field of $ty itself, checked by the pattern above.
        unsafe { $crate::Field::<$ty, _>::new(::core::stringify!($field), project) }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Owner;

    struct Pair {
        left: [u32; 3],
        right: String,
    }

    struct Wrapper(Pair);

    fn pair() -> Pair {
        Pair {
            left: [10, 20, 30],
            right: "r".into(),
        }
    }

    #[test]
    fn runtime_index_checks_bounds_on_resolve() {
        let owner = Owner::new([1u8, 2, 3, 4, 5]);
        assert_eq!(*owner.point_into(&Path::new().index(4)).unwrap().borrow(), 5);
        assert_eq!(
            owner.point_into(&Path::new().index(7)).err(),
            Some(Error::OutOfRange { index: 7, len: 5 })
        );
    }

    #[test]
    fn slices_index_by_their_runtime_length() {
        let owner: Owner<[u8]> = vec![1, 2, 3].into();
        let path = Path::<[u8], [u8]>::new().index(3);
        assert_eq!(path.steps(), [Step::Index { index: 3, bound: None }]);
        assert_eq!(
            owner.point_into(&path).err(),
            Some(Error::OutOfRange { index: 3, len: 3 })
        );
        *owner.point_into(&Path::new().index(0)).unwrap().borrow_mut() = 9;
        assert_eq!(&*owner.borrow(), [9, 2, 3]);
    }

    #[test]
    fn chains_of_fields_and_indices() {
        let owner = Owner::new(Wrapper(pair()));
        let path = Path::new()
            .field(member!(Wrapper, 0))
            .field(member!(Pair, left))
            .at::<2>();
        assert_eq!(path.len(), 3);
        assert_eq!(
            format!("{path:?}"),
            r#"[Field("0"), Field("left"), ConstIndex { index: 2, bound: 3 }]"#
        );
        let alias = owner.point_into(&path).unwrap();
        assert_eq!(*alias.borrow(), 30);
        let right = owner
            .point_into(&Path::new().field(member!(Wrapper, 0)).field(member!(Pair, right)))
            .unwrap();
        assert_eq!(&*right.borrow(), "r");
        assert_eq!(owner.attachment_count(), 2);
    }

    #[test]
    fn empty_path_is_the_object() {
        let owner = Owner::new(pair());
        let path = Path::new();
        assert!(path.is_empty());
        let same = owner.point_into(&path).unwrap();
        assert_eq!(same, owner);
    }
}
