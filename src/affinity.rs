//! Thread affinity checking for control blocks.
//!
//! Observers and owners hold `Rc`s, so the compiler already refuses to move them to another
//! thread. A [ThreadAffinity::Strict] block additionally remembers the thread that created it
//! and refuses to answer validity checks from anywhere else, so that a handle smuggled across
//! threads by `unsafe` code fails loudly instead of corrupting its counters.
//!
//! The default is picked by the `strict-affinity` cargo feature (on by default). Individual
//! owners can override it with [crate::Owner::with_affinity].

// Same trick as the sanitiser switch: only one of these files is ever parsed.
#[cfg_attr(feature = "strict-affinity", path = "affinity/strict.rs")]
#[cfg_attr(not(feature = "strict-affinity"), path = "affinity/unchecked.rs")]
mod implementation;

use std::thread::{self, ThreadId};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadAffinity {
    /// Record the creating thread and check it on every validity test.
    Strict,
    /// The minimal configuration: no thread bookkeeping at all.
    Unchecked,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        implementation::DEFAULT
    }
}

impl ThreadAffinity {
    pub(crate) fn origin(self) -> Option<ThreadId> {
        match self {
            Self::Strict => Some(thread::current().id()),
            Self::Unchecked => None,
        }
    }
}

pub(crate) fn check_origin(origin: Option<ThreadId>) -> Result<(), Error> {
    let Some(origin) = origin else {
        return Ok(());
    };
    let current = thread::current().id();
    if origin == current {
        Ok(())
    } else {
        Err(Error::ThreadAffinityViolation { origin, current })
    }
}
