//! Recursive membership evaluation over userset rewrites.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::datastore::Datastore;
use crate::error::Error;
use crate::schema::{RewriteChild, SetOperator, UsersetRewrite};
use crate::types::{
    ObjectReference, Relationship, RelationshipFilter, Revision, SubjectReference,
};

/// The two-valued result of a membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// The subject is a member of the permission's subject set.
    Member,
    /// The subject is not a member.
    NotMember,
}

impl Membership {
    /// Returns `true` for [`Membership::Member`].
    pub fn is_member(self) -> bool {
        self == Membership::Member
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type CheckKey = (ObjectReference, String);

/// State shared across one top-level check. The subject is fixed; the memo
/// table holds completed sub-results and is bounded; cycle detection is
/// per-path, so parallel sibling branches never poison each other.
pub(crate) struct CheckContext {
    pub(crate) store: Arc<dyn Datastore>,
    pub(crate) revision: Revision,
    pub(crate) subject: SubjectReference,
    pub(crate) concurrency: Arc<Semaphore>,
    pub(crate) memo_limit: usize,
    memo: Mutex<HashMap<CheckKey, Membership>>,
}

impl CheckContext {
    pub(crate) fn new(
        store: Arc<dyn Datastore>,
        revision: Revision,
        subject: SubjectReference,
        concurrency: Arc<Semaphore>,
        memo_limit: usize,
    ) -> Self {
        Self {
            store,
            revision,
            subject,
            concurrency,
            memo_limit,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one datastore sub-query under the concurrency limit. The permit
    /// covers only the query itself, never recursive evaluation, so deep
    /// rewrites cannot starve the limiter.
    async fn query(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>, Error> {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| Error::internal("concurrency limiter closed"))?;
        let rows = self.store.query_relationships(filter, self.revision).await?;
        Ok(rows.collect())
    }
}

pub(crate) fn check_internal(
    context: Arc<CheckContext>,
    resource: ObjectReference,
    relation: String,
    path: HashSet<CheckKey>,
) -> BoxFuture<Result<Membership, Error>> {
    Box::pin(async move {
        let key = (resource.clone(), relation.clone());
        // A repeated entry along this path is a cycle, broken as NotMember.
        if path.contains(&key) {
            trace!(resource = %resource, relation = %relation, "cycle broken");
            return Ok(Membership::NotMember);
        }
        {
            let memo = context.memo.lock();
            if let Some(membership) = memo.get(&key) {
                return Ok(*membership);
            }
            if memo.len() >= context.memo_limit {
                return Err(Error::internal("check memoization table exceeded its bound"));
            }
        }

        let mut path = path;
        path.insert(key.clone());
        let result = evaluate_relation(&context, &resource, &relation, &path).await;
        if let Ok(membership) = &result {
            context.memo.lock().insert(key, *membership);
        }
        result
    })
}

async fn evaluate_relation(
    context: &Arc<CheckContext>,
    resource: &ObjectReference,
    relation: &str,
    path: &HashSet<CheckKey>,
) -> Result<Membership, Error> {
    let namespace = context
        .store
        .read_namespace(resource.namespace(), context.revision)
        .await?;
    let relation_def = namespace.relation(relation).ok_or_else(|| {
        Error::FailedPrecondition(format!(
            "relation `{}#{}` not found",
            resource.namespace(),
            relation
        ))
    })?;

    debug!(resource = %resource, relation = %relation, subject = %context.subject, "checking");
    match relation_def.rewrite.clone() {
        Some(rewrite) => {
            evaluate_rewrite(
                context.clone(),
                resource.clone(),
                relation.to_string(),
                rewrite,
                path.clone(),
            )
            .await
        }
        // A pure relation behaves as `Union(_this)`.
        None => {
            evaluate_this(
                context.clone(),
                resource.clone(),
                relation.to_string(),
                path.clone(),
            )
            .await
        }
    }
}

fn evaluate_rewrite(
    context: Arc<CheckContext>,
    resource: ObjectReference,
    relation: String,
    rewrite: UsersetRewrite,
    path: HashSet<CheckKey>,
) -> BoxFuture<Result<Membership, Error>> {
    Box::pin(async move {
        let mut children = rewrite.children.into_iter().map(|child| {
            evaluate_child(
                context.clone(),
                resource.clone(),
                relation.clone(),
                child,
                path.clone(),
            )
        });
        match rewrite.operator {
            SetOperator::Union => any_member(children.collect()).await,
            SetOperator::Intersection => {
                let futures: Vec<_> = children.collect();
                if futures.is_empty() {
                    return Ok(Membership::NotMember);
                }
                all_members(futures).await
            }
            SetOperator::Exclusion => {
                // The base operand gates everything and is evaluated first.
                let Some(base) = children.next() else {
                    return Ok(Membership::NotMember);
                };
                if base.await? == Membership::NotMember {
                    return Ok(Membership::NotMember);
                }
                match any_member(children.collect()).await? {
                    Membership::Member => Ok(Membership::NotMember),
                    Membership::NotMember => Ok(Membership::Member),
                }
            }
        }
    })
}

fn evaluate_child(
    context: Arc<CheckContext>,
    resource: ObjectReference,
    relation: String,
    child: RewriteChild,
    path: HashSet<CheckKey>,
) -> BoxFuture<Result<Membership, Error>> {
    match child {
        RewriteChild::This => Box::pin(evaluate_this(context, resource, relation, path)),
        RewriteChild::Nil => Box::pin(async { Ok(Membership::NotMember) }),
        RewriteChild::ComputedUserset(computed) => {
            check_internal(context, resource, computed, path)
        }
        RewriteChild::TupleToUserset { tupleset, computed } => {
            Box::pin(evaluate_tuple_to_userset(context, resource, tupleset, computed, path))
        }
        RewriteChild::Rewrite(nested) => {
            evaluate_rewrite(context, resource, relation, nested, path)
        }
    }
}

/// Direct relationship lookup: a hit on the subject itself, on a matching
/// public wildcard, or transitively through a userset subject.
async fn evaluate_this(
    context: Arc<CheckContext>,
    resource: ObjectReference,
    relation: String,
    path: HashSet<CheckKey>,
) -> Result<Membership, Error> {
    let filter = RelationshipFilter::new(resource.namespace())
        .object_id(resource.object_id())
        .relation(&relation);
    let rows = context.query(&filter).await?;

    let mut usersets: Vec<(ObjectReference, String)> = Vec::new();
    for row in rows {
        if row.subject == context.subject {
            return Ok(Membership::Member);
        }
        if row.subject.is_wildcard()
            && !context.subject.is_userset()
            && row.subject.object().namespace() == context.subject.object().namespace()
        {
            return Ok(Membership::Member);
        }
        if let Some(subject_relation) = row.subject.optional_relation() {
            usersets.push((row.subject.object().clone(), subject_relation.to_string()));
        }
    }

    let futures: Vec<_> = usersets
        .into_iter()
        .map(|(object, subject_relation)| {
            check_internal(context.clone(), object, subject_relation, path.clone())
        })
        .collect();
    any_member(futures).await
}

/// Walks the tupleset relation and OR-combines the computed relation on
/// every walked object.
async fn evaluate_tuple_to_userset(
    context: Arc<CheckContext>,
    resource: ObjectReference,
    tupleset: String,
    computed: String,
    path: HashSet<CheckKey>,
) -> Result<Membership, Error> {
    let filter = RelationshipFilter::new(resource.namespace())
        .object_id(resource.object_id())
        .relation(&tupleset);
    let rows = context.query(&filter).await?;

    let mut walked = Vec::new();
    for row in rows {
        if row.subject.is_wildcard() {
            return Err(Error::FailedPrecondition(format!(
                "wildcard subject is not allowed in tupleset relation `{}#{}`",
                resource.namespace(),
                tupleset
            )));
        }
        walked.push(row.subject.object().clone());
    }

    let futures: Vec<_> = walked
        .into_iter()
        .map(|object| check_internal(context.clone(), object, computed.clone(), path.clone()))
        .collect();
    any_member(futures).await
}

/// Evaluates the futures concurrently, short-circuiting (and cancelling the
/// rest) on the first `Member`.
async fn any_member(
    futures: Vec<BoxFuture<Result<Membership, Error>>>,
) -> Result<Membership, Error> {
    if futures.is_empty() {
        return Ok(Membership::NotMember);
    }

    let mut join_set = JoinSet::new();
    for future in futures {
        join_set.spawn(future);
    }
    while let Some(joined) = join_set.join_next().await {
        let membership = joined
            .map_err(|cause| Error::Internal {
                reason: "check sub-task failed".into(),
                cause: Some(Box::new(cause)),
            })??;
        if membership == Membership::Member {
            return Ok(Membership::Member);
        }
    }
    Ok(Membership::NotMember)
}

/// Evaluates the futures concurrently, short-circuiting (and cancelling the
/// rest) on the first `NotMember`.
async fn all_members(
    futures: Vec<BoxFuture<Result<Membership, Error>>>,
) -> Result<Membership, Error> {
    let mut join_set = JoinSet::new();
    for future in futures {
        join_set.spawn(future);
    }
    while let Some(joined) = join_set.join_next().await {
        let membership = joined
            .map_err(|cause| Error::Internal {
                reason: "check sub-task failed".into(),
                cause: Some(Box::new(cause)),
            })??;
        if membership == Membership::NotMember {
            return Ok(Membership::NotMember);
        }
    }
    Ok(Membership::Member)
}
