use std::fmt::{self, Display};
use std::thread::ThreadId;

/// Everything that can go wrong when reaching through an [crate::Observer] or
/// [crate::Owner].
///
/// A failed [crate::Observer::downcast] is not in here: it yields a null observer.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Dereferenced an observer whose target is gone, or that never had one.
    NullDereference,
    /// An alias path indexed past the end of an array or slice.
    OutOfRange { index: usize, len: usize },
    /// A strict control block was checked from a thread that did not create it.
    ThreadAffinityViolation { origin: ThreadId, current: ThreadId },
    /// Asked for exclusive access while shared borrows were alive.
    AlreadyBorrowed,
    /// Asked for any access while an exclusive borrow was alive.
    AlreadyMutablyBorrowed,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullDereference => write!(f, "dereferenced a null or invalidated observer"),
            Self::OutOfRange { index, len } => write!(
                f,
                "alias path index {index} is out of range for a container of length {len}"
            ),
            Self::ThreadAffinityViolation { origin, current } => write!(
                f,
                "control block created on {origin:?} was checked from {current:?}"
            ),
            Self::AlreadyBorrowed => write!(f, "object is already borrowed"),
            Self::AlreadyMutablyBorrowed => write!(f, "object is already mutably borrowed"),
        }
    }
}

impl std::error::Error for Error {}

#[test]
fn display_out_of_range() {
    let err = Error::OutOfRange { index: 7, len: 5 };
    assert_eq!(
        err.to_string(),
        "alias path index 7 is out of range for a container of length 5"
    );
}
