//! The service facade: validated entry points over a datastore.

mod permissions;
mod schema;
#[cfg(feature = "watch")]
mod watch;

use std::sync::Arc;

use crate::datastore::Datastore;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::types::{Consistency, Revision};

pub use permissions::{
    CheckPermissionRequest, CheckResponse, DeleteRelationshipsRequest, ExpandPermissionTreeRequest,
    ExpandResponse, ReadRelationshipsRequest, WriteRelationshipsRequest,
};

/// The engine facade.
///
/// Validates wire-shaped arguments, resolves consistency to a concrete
/// revision, and delegates to the dispatcher and datastore. `Engine` is
/// cheap to clone — it wraps shared handles. Clone it freely to share
/// across tasks.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use warrant::{Engine, MemoryDatastore, ObjectReference, SubjectReference};
///
/// # async fn example() -> Result<(), warrant::Error> {
/// let engine = Engine::new(Arc::new(MemoryDatastore::new()));
///
/// let response = engine
///     .check_permission(
///         &ObjectReference::new("document", "doc-123")?,
///         "view",
///         &SubjectReference::new(ObjectReference::new("user", "alice")?, None::<String>)?,
///     )
///     .await?;
/// if response.is_member() {
///     println!("access granted");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Datastore>,
    dispatcher: Arc<Dispatcher>,
}

impl Engine {
    /// Creates an engine over the given datastore.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(store.clone()));
        Self { store, dispatcher }
    }

    /// Creates an engine with a custom sub-query concurrency limit.
    pub fn with_concurrency_limit(store: Arc<dyn Datastore>, limit: usize) -> Self {
        let dispatcher = Arc::new(Dispatcher::with_concurrency_limit(store.clone(), limit));
        Self { store, dispatcher }
    }

    /// The datastore's current head revision.
    pub async fn head_revision(&self) -> Result<Revision, Error> {
        self.store.head_revision().await
    }

    pub(crate) fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resolves a consistency requirement to the revision reads will be
    /// pinned at.
    pub(crate) async fn resolve_revision(
        &self,
        consistency: Consistency,
    ) -> Result<Revision, Error> {
        match consistency {
            Consistency::FullyConsistent => self.store.head_revision().await,
            Consistency::AtLeastAsFresh(revision) => {
                let head = self.store.head_revision().await?;
                if revision > head {
                    return Err(Error::OutOfRange(format!(
                        "revision {} is newer than the head",
                        revision
                    )));
                }
                Ok(head)
            }
            Consistency::AtExactSnapshot(revision) => {
                self.store.check_revision(revision).await?;
                Ok(revision)
            }
        }
    }
}

// The facade must stay shareable across tasks.
#[cfg(test)]
mod trait_tests {
    use super::*;
    fn _assert_clone<T: Clone>() {}
    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}
    fn _assert_all() {
        _assert_clone::<Engine>();
        _assert_send::<Engine>();
        _assert_sync::<Engine>();
    }
}
