//! Domain types for the warrant engine.
//!
//! These are the wire-independent core model types: references,
//! relationships, filters, revisions, and caveat context values.

mod consistency;
mod context;
mod filter;
pub(crate) mod reference;
mod relationship;
mod token;
#[cfg(feature = "watch")]
mod watch;

pub use consistency::Consistency;
pub use context::ContextValue;
pub use filter::{FilterFields, ReadRelationshipResult, RelationshipFilter};
pub use reference::{ObjectReference, SubjectReference, ELLIPSIS, WILDCARD_ID};
pub use relationship::{
    CaveatReference, Operation, Precondition, PreconditionOp, Relationship, RelationshipUpdate,
};
pub use token::Revision;
#[cfg(feature = "watch")]
pub use watch::WatchEvent;
