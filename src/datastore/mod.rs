//! The datastore contract consumed by the engine, an in-memory
//! implementation, and a read-only decorator.

mod memory;
mod proxy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::schema::{CaveatDefinition, NamespaceDefinition};
#[cfg(feature = "watch")]
use crate::types::WatchEvent;
use crate::types::{
    Precondition, Relationship, RelationshipFilter, RelationshipUpdate, Revision,
    SubjectReference,
};

pub use memory::MemoryDatastore;
pub use proxy::ReadOnly;

/// An iterator over relationships read at a snapshot.
pub type RelationshipIter = Box<dyn Iterator<Item = Relationship> + Send>;

/// A stream of watch events after a revision.
#[cfg(feature = "watch")]
pub type WatchStream =
    std::pin::Pin<Box<dyn futures_core::Stream<Item = Result<WatchEvent, Error>> + Send>>;

/// The narrow storage surface the engine consumes.
///
/// Revisions are opaque, totally ordered tokens; the engine inspects nothing
/// but their ordering and the GC-window check. All reads are snapshot reads
/// at a caller-supplied revision; all writes are atomic and yield the new
/// head revision.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// The current head revision.
    async fn head_revision(&self) -> Result<Revision, Error>;

    /// The latest revision observed by this handle. For a local store this
    /// is the head; a replicated store may lag it.
    async fn sync_revision(&self) -> Result<Revision, Error>;

    /// Checks that a revision is readable: not past the head, and not older
    /// than the garbage-collection window.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the revision falls outside the window.
    async fn check_revision(&self, revision: Revision) -> Result<(), Error>;

    /// Reads a namespace definition at a revision.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if the namespace does not exist at the
    /// revision.
    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<NamespaceDefinition>, Error>;

    /// Writes (upserts) a single namespace definition.
    async fn write_namespace(&self, definition: NamespaceDefinition) -> Result<Revision, Error>;

    /// Deletes a namespace definition.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if the namespace does not exist.
    async fn delete_namespace(&self, name: &str) -> Result<Revision, Error>;

    /// Lists all namespace definitions live at a revision.
    async fn list_namespaces(
        &self,
        revision: Revision,
    ) -> Result<Vec<Arc<NamespaceDefinition>>, Error>;

    /// Reads a caveat definition at a revision.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if the caveat does not exist at the
    /// revision.
    async fn read_caveat(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<CaveatDefinition>, Error>;

    /// Lists all caveat definitions live at a revision.
    async fn list_caveats(&self, revision: Revision)
        -> Result<Vec<Arc<CaveatDefinition>>, Error>;

    /// Atomically replaces the whole schema (namespaces and caveats),
    /// yielding one new revision.
    async fn write_schema(
        &self,
        namespaces: Vec<NamespaceDefinition>,
        caveats: Vec<CaveatDefinition>,
    ) -> Result<Revision, Error>;

    /// Queries relationships matching the filter at a revision.
    async fn query_relationships(
        &self,
        filter: &RelationshipFilter,
        revision: Revision,
    ) -> Result<RelationshipIter, Error>;

    /// Queries relationships whose subject equals the given subject.
    async fn reverse_query_from_subject(
        &self,
        subject: &SubjectReference,
        revision: Revision,
    ) -> Result<RelationshipIter, Error>;

    /// Queries relationships whose subject is any `namespace#relation`
    /// userset (pass [`crate::types::ELLIPSIS`] for terminal subjects).
    async fn reverse_query_from_subject_relation(
        &self,
        namespace: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<RelationshipIter, Error>;

    /// Atomically applies the mutations, after checking every precondition
    /// at the pre-write snapshot.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` — and applies nothing — if a
    /// precondition fails or a `Create` targets an existing relationship.
    async fn write_relationships(
        &self,
        preconditions: &[Precondition],
        updates: &[RelationshipUpdate],
    ) -> Result<Revision, Error>;

    /// Streams relationship changes committed after the given revision.
    #[cfg(feature = "watch")]
    fn watch(&self, after: Revision) -> WatchStream;
}
