use super::ThreadAffinity;

/// `strict-affinity` is disabled, so blocks skip the thread check unless an owner asks for it.
pub(super) const DEFAULT: ThreadAffinity = ThreadAffinity::Unchecked;
