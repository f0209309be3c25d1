//! Subject-set algebra with wildcards, exclusions, caveats, and provenance.
//!
//! [`BaseSubjectSet`] holds subjects of a single type key and implements
//! union, intersection, and difference with the full conditional-membership
//! semantics; [`TrackingSubjectSet`] composes those per-type sets into the
//! heterogeneous sets expand works with. Caveat conditions are carried as
//! [`CaveatExpression`] trees and only ever combined, never evaluated, here.

mod base;
mod expression;
mod found;
mod tracking;

pub use base::{BaseSubjectSet, SetElement};
pub use expression::{and, not, or, CaveatExpression};
pub use found::FoundSubject;
pub use tracking::{RelationReference, TrackingSubjectSet};
