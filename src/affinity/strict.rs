use super::ThreadAffinity;

/// `strict-affinity` is enabled.
pub(super) const DEFAULT: ThreadAffinity = ThreadAffinity::Strict;
