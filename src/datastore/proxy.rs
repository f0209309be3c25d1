//! Read-only decorator over a datastore.

use std::sync::Arc;

use async_trait::async_trait;

use crate::datastore::{Datastore, RelationshipIter};
#[cfg(feature = "watch")]
use crate::datastore::WatchStream;
use crate::error::Error;
use crate::schema::{CaveatDefinition, NamespaceDefinition};
use crate::types::{
    Precondition, RelationshipFilter, RelationshipUpdate, Revision, SubjectReference,
};

/// A policy wrapper forbidding mutations on a delegate store.
///
/// Every read operation forwards unchanged; every mutation fails with
/// [`Error::ReadOnly`]. Forwarding is explicit per operation, so a new
/// mutating capability added to the contract is rejected here until someone
/// consciously forwards it.
///
/// # Examples
///
/// ```
/// use warrant::{Datastore, MemoryDatastore, ReadOnly};
///
/// # async fn example() {
/// let store = ReadOnly::new(MemoryDatastore::new());
/// let err = store.delete_namespace("document").await.unwrap_err();
/// assert!(matches!(err, warrant::Error::ReadOnly { .. }));
/// # }
/// ```
pub struct ReadOnly<D> {
    delegate: D,
}

impl<D> ReadOnly<D> {
    /// Wraps a delegate store.
    pub fn new(delegate: D) -> Self {
        Self { delegate }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> D {
        self.delegate
    }
}

#[async_trait]
impl<D: Datastore> Datastore for ReadOnly<D> {
    async fn head_revision(&self) -> Result<Revision, Error> {
        self.delegate.head_revision().await
    }

    async fn sync_revision(&self) -> Result<Revision, Error> {
        self.delegate.sync_revision().await
    }

    async fn check_revision(&self, revision: Revision) -> Result<(), Error> {
        self.delegate.check_revision(revision).await
    }

    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<NamespaceDefinition>, Error> {
        self.delegate.read_namespace(name, revision).await
    }

    async fn write_namespace(&self, _definition: NamespaceDefinition) -> Result<Revision, Error> {
        Err(Error::ReadOnly {
            operation: "write_namespace",
        })
    }

    async fn delete_namespace(&self, _name: &str) -> Result<Revision, Error> {
        Err(Error::ReadOnly {
            operation: "delete_namespace",
        })
    }

    async fn list_namespaces(
        &self,
        revision: Revision,
    ) -> Result<Vec<Arc<NamespaceDefinition>>, Error> {
        self.delegate.list_namespaces(revision).await
    }

    async fn read_caveat(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<CaveatDefinition>, Error> {
        self.delegate.read_caveat(name, revision).await
    }

    async fn list_caveats(
        &self,
        revision: Revision,
    ) -> Result<Vec<Arc<CaveatDefinition>>, Error> {
        self.delegate.list_caveats(revision).await
    }

    async fn write_schema(
        &self,
        _namespaces: Vec<NamespaceDefinition>,
        _caveats: Vec<CaveatDefinition>,
    ) -> Result<Revision, Error> {
        Err(Error::ReadOnly {
            operation: "write_schema",
        })
    }

    async fn query_relationships(
        &self,
        filter: &RelationshipFilter,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        self.delegate.query_relationships(filter, revision).await
    }

    async fn reverse_query_from_subject(
        &self,
        subject: &SubjectReference,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        self.delegate.reverse_query_from_subject(subject, revision).await
    }

    async fn reverse_query_from_subject_relation(
        &self,
        namespace: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        self.delegate
            .reverse_query_from_subject_relation(namespace, relation, revision)
            .await
    }

    async fn write_relationships(
        &self,
        _preconditions: &[Precondition],
        _updates: &[RelationshipUpdate],
    ) -> Result<Revision, Error> {
        Err(Error::ReadOnly {
            operation: "write_relationships",
        })
    }

    #[cfg(feature = "watch")]
    fn watch(&self, after: Revision) -> WatchStream {
        self.delegate.watch(after)
    }
}
