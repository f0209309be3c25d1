//! The check/expand evaluator over the rewrite tree.

mod check;
mod expand;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::datastore::Datastore;
use crate::error::Error;
use crate::types::reference::validate_relation_name;
use crate::types::{ObjectReference, Revision, SubjectReference};

use check::CheckContext;
use expand::ExpandContext;

pub use check::Membership;
pub use expand::{ExpandNode, ExpandTree};

/// Default bound on concurrent datastore sub-queries per dispatcher.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 50;

const DEFAULT_MEMO_LIMIT: usize = 10_000;

/// Evaluates permission checks and expansions against a datastore.
///
/// Sibling branches of a rewrite evaluate concurrently; datastore
/// sub-queries are bounded by a shared concurrency limit; and cancelling a
/// check (dropping its future) aborts all in-flight sub-checks.
pub struct Dispatcher {
    store: Arc<dyn Datastore>,
    concurrency: Arc<Semaphore>,
    memo_limit: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with the default concurrency limit.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self::with_concurrency_limit(store, DEFAULT_CONCURRENCY_LIMIT)
    }

    /// Creates a dispatcher bounding concurrent sub-queries to `limit`.
    pub fn with_concurrency_limit(store: Arc<dyn Datastore>, limit: usize) -> Self {
        Self {
            store,
            concurrency: Arc::new(Semaphore::new(limit.max(1))),
            memo_limit: DEFAULT_MEMO_LIMIT,
        }
    }

    /// Computes whether `subject` is a member of `permission` on `resource`
    /// at the given revision.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for malformed input, `FailedPrecondition` for an
    /// unknown namespace or relation, `OutOfRange` for an unreadable
    /// revision.
    pub async fn check(
        &self,
        resource: &ObjectReference,
        permission: &str,
        subject: &SubjectReference,
        revision: Revision,
    ) -> Result<Membership, Error> {
        validate_relation_name(permission)?;
        if subject.is_wildcard() {
            return Err(Error::InvalidArgument(
                "cannot check a wildcard subject".into(),
            ));
        }
        self.store.check_revision(revision).await?;

        let context = Arc::new(CheckContext::new(
            self.store.clone(),
            revision,
            subject.clone(),
            self.concurrency.clone(),
            self.memo_limit,
        ));
        check::check_internal(
            context,
            resource.clone(),
            permission.to_string(),
            HashSet::new(),
        )
        .await
    }

    /// Expands `permission` on `resource` into its full tree of subject
    /// sets at the given revision.
    pub async fn expand(
        &self,
        resource: &ObjectReference,
        permission: &str,
        revision: Revision,
    ) -> Result<ExpandTree, Error> {
        validate_relation_name(permission)?;
        self.store.check_revision(revision).await?;

        let context = Arc::new(ExpandContext {
            store: self.store.clone(),
            revision,
            concurrency: self.concurrency.clone(),
        });
        let node = expand::expand_internal(
            context,
            resource.clone(),
            permission.to_string(),
            HashSet::new(),
        )
        .await?;
        Ok(ExpandTree {
            resource: resource.clone(),
            relation: permission.to_string(),
            node,
        })
    }
}
