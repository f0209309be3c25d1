//! Check, read, write, delete, and expand entry points.

use futures_core::Stream;

use crate::dispatch::{ExpandTree, Membership};
use crate::error::Error;
use crate::types::{
    Consistency, ObjectReference, Operation, Precondition, ReadRelationshipResult,
    Relationship, RelationshipFilter, RelationshipUpdate, Revision, SubjectReference,
};

use super::Engine;

// ── CheckPermission ──────────────────────────────────────────────

/// The result of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct CheckResponse {
    /// Whether the subject is a member of the permission's subject set.
    pub membership: Membership,
    /// The revision at which the check was evaluated.
    pub checked_at: Revision,
}

impl CheckResponse {
    /// Returns `true` when the subject is a member.
    pub fn is_member(&self) -> bool {
        self.membership.is_member()
    }
}

/// Builder for a CheckPermission request.
pub struct CheckPermissionRequest<'a> {
    engine: &'a Engine,
    resource: ObjectReference,
    permission: String,
    subject: SubjectReference,
    consistency: Consistency,
}

impl<'a> CheckPermissionRequest<'a> {
    /// Sets the consistency mode for this request.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Pins the check at an exact revision.
    pub fn at_revision(mut self, revision: Revision) -> Self {
        self.consistency = Consistency::AtExactSnapshot(revision);
        self
    }
}

impl<'a> std::future::IntoFuture for CheckPermissionRequest<'a> {
    type Output = Result<CheckResponse, Error>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let revision = self.engine.resolve_revision(self.consistency).await?;
            let membership = self
                .engine
                .dispatcher()
                .check(&self.resource, &self.permission, &self.subject, revision)
                .await?;
            Ok(CheckResponse {
                membership,
                checked_at: revision,
            })
        })
    }
}

// ── WriteRelationships ──────────────────────────────────────────

/// Builder for a WriteRelationships request.
pub struct WriteRelationshipsRequest<'a> {
    engine: &'a Engine,
    updates: Vec<RelationshipUpdate>,
    preconditions: Vec<Precondition>,
}

impl<'a> WriteRelationshipsRequest<'a> {
    /// Adds preconditions that must hold at the pre-write snapshot.
    pub fn preconditions(mut self, preconditions: Vec<Precondition>) -> Self {
        self.preconditions = preconditions;
        self
    }
}

impl<'a> std::future::IntoFuture for WriteRelationshipsRequest<'a> {
    type Output = Result<Revision, Error>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            if self.updates.is_empty() {
                return Err(Error::InvalidArgument("updates must not be empty".into()));
            }

            let head = self.engine.store().head_revision().await?;
            for update in &self.updates {
                validate_update_against_schema(self.engine, update, head).await?;
            }

            self.engine
                .store()
                .write_relationships(&self.preconditions, &self.updates)
                .await
        })
    }
}

/// Checks that an update's namespace and relation exist, that the relation
/// is not a permission, and (for create/touch) that the subject is admitted
/// by the relation's allowed types.
async fn validate_update_against_schema(
    engine: &Engine,
    update: &RelationshipUpdate,
    revision: Revision,
) -> Result<(), Error> {
    let relationship = &update.relationship;
    let namespace = engine
        .store()
        .read_namespace(relationship.resource.namespace(), revision)
        .await?;
    let relation = namespace
        .relation(&relationship.relation)
        .ok_or_else(|| {
            Error::FailedPrecondition(format!(
                "relation `{}#{}` not found",
                relationship.resource.namespace(),
                relationship.relation
            ))
        })?;
    if relation.is_permission() {
        return Err(Error::FailedPrecondition(format!(
            "`{}#{}` is a permission and cannot hold direct relationships",
            relationship.resource.namespace(),
            relationship.relation
        )));
    }
    if update.operation != Operation::Delete {
        let admitted = relation.allowed.iter().any(|allowed| {
            allowed.matches(&relationship.subject, relationship.optional_caveat.as_ref())
        });
        if !admitted {
            return Err(Error::FailedPrecondition(format!(
                "subject `{}` is not allowed on relation `{}#{}`",
                relationship.subject,
                relationship.resource.namespace(),
                relationship.relation
            )));
        }
    }
    Ok(())
}

// ── DeleteRelationships ──────────────────────────────────────────

/// Builder for a DeleteRelationships request.
pub struct DeleteRelationshipsRequest<'a> {
    engine: &'a Engine,
    filter: RelationshipFilter,
    preconditions: Vec<Precondition>,
}

impl<'a> DeleteRelationshipsRequest<'a> {
    /// Adds preconditions that must hold at the pre-delete snapshot.
    pub fn preconditions(mut self, preconditions: Vec<Precondition>) -> Self {
        self.preconditions = preconditions;
        self
    }
}

impl<'a> std::future::IntoFuture for DeleteRelationshipsRequest<'a> {
    type Output = Result<Revision, Error>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            self.filter.validate()?;
            let head = self.engine.store().head_revision().await?;
            let doomed: Vec<RelationshipUpdate> = self
                .engine
                .store()
                .query_relationships(&self.filter, head)
                .await?
                .map(RelationshipUpdate::delete)
                .collect();
            self.engine
                .store()
                .write_relationships(&self.preconditions, &doomed)
                .await
        })
    }
}

// ── ReadRelationships ──────────────────────────────────────────────

/// Builder for a ReadRelationships streaming request.
pub struct ReadRelationshipsRequest<'a> {
    engine: &'a Engine,
    filter: RelationshipFilter,
    consistency: Consistency,
}

impl<'a> ReadRelationshipsRequest<'a> {
    /// Sets the consistency mode.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Pins the read at an exact revision.
    pub fn at_revision(mut self, revision: Revision) -> Self {
        self.consistency = Consistency::AtExactSnapshot(revision);
        self
    }

    /// Sends the request and returns a stream of results.
    pub async fn send(
        self,
    ) -> Result<impl Stream<Item = Result<ReadRelationshipResult, Error>> + std::fmt::Debug, Error>
    {
        self.filter.validate()?;
        let revision = self.engine.resolve_revision(self.consistency).await?;
        let rows: Vec<Relationship> = self
            .engine
            .store()
            .query_relationships(&self.filter, revision)
            .await?
            .collect();
        let results: Vec<Result<ReadRelationshipResult, Error>> = rows
            .into_iter()
            .map(|relationship| {
                Ok(ReadRelationshipResult {
                    relationship,
                    read_at: revision,
                })
            })
            .collect();
        Ok(tokio_stream::iter(results))
    }
}

// ── ExpandPermissionTree ──────────────────────────────────────────────

/// The result of expanding a permission.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ExpandResponse {
    /// The expansion tree.
    pub tree: ExpandTree,
    /// The revision at which the expansion was evaluated.
    pub expanded_at: Revision,
}

/// Builder for an ExpandPermissionTree request.
pub struct ExpandPermissionTreeRequest<'a> {
    engine: &'a Engine,
    resource: ObjectReference,
    permission: String,
    consistency: Consistency,
}

impl<'a> ExpandPermissionTreeRequest<'a> {
    /// Sets the consistency mode.
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Pins the expansion at an exact revision.
    pub fn at_revision(mut self, revision: Revision) -> Self {
        self.consistency = Consistency::AtExactSnapshot(revision);
        self
    }
}

impl<'a> std::future::IntoFuture for ExpandPermissionTreeRequest<'a> {
    type Output = Result<ExpandResponse, Error>;
    type IntoFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let revision = self.engine.resolve_revision(self.consistency).await?;
            let tree = self
                .engine
                .dispatcher()
                .expand(&self.resource, &self.permission, revision)
                .await?;
            Ok(ExpandResponse {
                tree,
                expanded_at: revision,
            })
        })
    }
}

// ── Engine methods ──────────────────────────────────────────────

impl Engine {
    /// Checks whether a subject has a permission on a resource.
    ///
    /// Use `.consistency()` or `.at_revision()` on the returned builder.
    pub fn check_permission(
        &self,
        resource: &ObjectReference,
        permission: impl Into<String>,
        subject: &SubjectReference,
    ) -> CheckPermissionRequest<'_> {
        CheckPermissionRequest {
            engine: self,
            resource: resource.clone(),
            permission: permission.into(),
            subject: subject.clone(),
            consistency: Consistency::FullyConsistent,
        }
    }

    /// Checks a permission at the head revision, for callers deciding
    /// whether a content change is allowed. Identical semantics to
    /// [`Engine::check_permission`], but never pinned to a caller-supplied
    /// revision.
    pub async fn content_change_check(
        &self,
        resource: &ObjectReference,
        permission: impl Into<String>,
        subject: &SubjectReference,
    ) -> Result<CheckResponse, Error> {
        self.check_permission(resource, permission, subject)
            .consistency(Consistency::FullyConsistent)
            .await
    }

    /// Writes a batch of relationship updates atomically.
    ///
    /// Returns `Err(InvalidArgument)` if `updates` is empty, and
    /// `Err(FailedPrecondition)` if an update does not fit the schema or a
    /// precondition fails.
    pub fn write_relationships(
        &self,
        updates: Vec<RelationshipUpdate>,
    ) -> WriteRelationshipsRequest<'_> {
        WriteRelationshipsRequest {
            engine: self,
            updates,
            preconditions: vec![],
        }
    }

    /// Deletes all relationships matching the given filter.
    pub fn delete_relationships(
        &self,
        filter: RelationshipFilter,
    ) -> DeleteRelationshipsRequest<'_> {
        DeleteRelationshipsRequest {
            engine: self,
            filter,
            preconditions: vec![],
        }
    }

    /// Reads relationships matching the given filter.
    ///
    /// Returns a streaming builder. Call `.send().await?` to get the stream.
    pub fn read_relationships(&self, filter: RelationshipFilter) -> ReadRelationshipsRequest<'_> {
        ReadRelationshipsRequest {
            engine: self,
            filter,
            consistency: Consistency::FullyConsistent,
        }
    }

    /// Expands the permission tree for a resource and permission.
    pub fn expand_permission_tree(
        &self,
        resource: &ObjectReference,
        permission: impl Into<String>,
    ) -> ExpandPermissionTreeRequest<'_> {
        ExpandPermissionTreeRequest {
            engine: self,
            resource: resource.clone(),
            permission: permission.into(),
            consistency: Consistency::FullyConsistent,
        }
    }
}
