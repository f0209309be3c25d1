//! Consistency modes for reads.

use crate::types::Revision;

/// Controls which snapshot a read operation is pinned at.
///
/// When no consistency is specified, requests default to `FullyConsistent`.
///
/// # Examples
///
/// ```
/// use warrant::{Consistency, Revision};
///
/// // Strongest consistency — always read at the head
/// let c = Consistency::FullyConsistent;
///
/// // Read at least as fresh as a previous write
/// let rev = Revision::from_token("rev-7").unwrap();
/// let c = Consistency::AtLeastAsFresh(rev);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// All data must be at least as fresh as the given revision. The engine
    /// reads at the head, which is always at least that fresh.
    AtLeastAsFresh(Revision),
    /// All data must be at exactly the given revision's snapshot. Fails with
    /// `OutOfRange` if the snapshot has aged out of the GC window.
    AtExactSnapshot(Revision),
    /// All data must be at the most recent snapshot.
    FullyConsistent,
}
