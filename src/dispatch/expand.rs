//! Expansion of a permission into its tree of subject sets.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::datastore::Datastore;
use crate::error::Error;
use crate::schema::{RewriteChild, SetOperator, UsersetRewrite};
use crate::subjectset::{CaveatExpression, FoundSubject, RelationReference, TrackingSubjectSet};
use crate::types::{ObjectReference, Relationship, RelationshipFilter, Revision};

/// The result of expanding a permission on a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandTree {
    /// The expanded resource.
    pub resource: ObjectReference,
    /// The expanded relation or permission.
    pub relation: String,
    /// The root node, mirroring the rewrite structure.
    pub node: ExpandNode,
}

impl ExpandTree {
    /// Folds the tree bottom-up with the subject-set algebra into the
    /// overall reachable subject set.
    pub fn simplify(&self) -> TrackingSubjectSet {
        self.node.simplify()
    }
}

/// A node of an [`ExpandTree`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandNode {
    /// A flattened subject set: direct subjects, wildcards, and the members
    /// reached through userset subjects or tupleset walks.
    Leaf {
        /// The subjects at this leaf.
        subjects: TrackingSubjectSet,
    },
    /// An internal set operation mirroring the rewrite.
    Operation {
        /// The operator applied over `children`.
        operator: SetOperator,
        /// The child nodes, in rewrite order.
        children: Vec<ExpandNode>,
    },
}

impl ExpandNode {
    fn empty_leaf() -> Self {
        ExpandNode::Leaf {
            subjects: TrackingSubjectSet::new(),
        }
    }

    /// Applies the subject-set algebra bottom-up.
    pub fn simplify(&self) -> TrackingSubjectSet {
        match self {
            ExpandNode::Leaf { subjects } => subjects.clone(),
            ExpandNode::Operation { operator, children } => {
                let mut sets = children.iter().map(ExpandNode::simplify);
                let Some(mut result) = sets.next() else {
                    return TrackingSubjectSet::new();
                };
                for set in sets {
                    match operator {
                        SetOperator::Union => result.union_with(&set),
                        SetOperator::Intersection => result.intersect_with(&set),
                        SetOperator::Exclusion => result.subtract(&set),
                    }
                }
                result
            }
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type VisitKey = (ObjectReference, String);

pub(crate) struct ExpandContext {
    pub(crate) store: Arc<dyn Datastore>,
    pub(crate) revision: Revision,
    pub(crate) concurrency: Arc<Semaphore>,
}

impl ExpandContext {
    /// Runs one datastore sub-query under the concurrency limit. The permit
    /// covers only the query itself, never recursive expansion, so deep
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

pub(crate) fn expand_internal(
    context: Arc<ExpandContext>,
    resource: ObjectReference,
    relation: String,
    path: HashSet<VisitKey>,
) -> BoxFuture<Result<ExpandNode, Error>> {
    Box::pin(async move {
        let key = (resource.clone(), relation.clone());
        // A rewrite cycle along this path expands to the empty set.
        if path.contains(&key) {
            return Ok(ExpandNode::empty_leaf());
        }
        let mut path = path;
        path.insert(key);

        let namespace = context
            .store
            .read_namespace(resource.namespace(), context.revision)
            .await?;
        let relation_def = namespace.relation(&relation).ok_or_else(|| {
            Error::FailedPrecondition(format!(
                "relation `{}#{}` not found",
                resource.namespace(),
                relation
            ))
        })?;

        debug!(resource = %resource, relation = %relation, "expanding");
        match relation_def.rewrite.clone() {
            Some(rewrite) => expand_rewrite(context, resource, relation, rewrite, path).await,
            None => expand_this(context, resource, relation, path).await,
        }
    })
}

async fn expand_rewrite(
    context: Arc<ExpandContext>,
    resource: ObjectReference,
    relation: String,
    rewrite: UsersetRewrite,
    path: HashSet<VisitKey>,
) -> Result<ExpandNode, Error> {
    let mut join_set = JoinSet::new();
    let child_count = rewrite.children.len();
    for (index, child) in rewrite.children.into_iter().enumerate() {
        let future = expand_child(
            context.clone(),
            resource.clone(),
            relation.clone(),
            child,
            path.clone(),
        );
        join_set.spawn(async move { (index, future.await) });
    }

    let mut children: Vec<Option<ExpandNode>> = vec![None; child_count];
    while let Some(joined) = join_set.join_next().await {
        let (index, result) = joined.map_err(|cause| Error::Internal {
            reason: "expand sub-task failed".into(),
            cause: Some(Box::new(cause)),
        })?;
        children[index] = Some(result?);
    }

    Ok(ExpandNode::Operation {
        operator: rewrite.operator,
        children: children.into_iter().flatten().collect(),
    })
}

fn expand_child(
    context: Arc<ExpandContext>,
    resource: ObjectReference,
    relation: String,
    child: RewriteChild,
    path: HashSet<VisitKey>,
) -> BoxFuture<Result<ExpandNode, Error>> {
    match child {
        RewriteChild::This => Box::pin(expand_this(context, resource, relation, path)),
        RewriteChild::Nil => Box::pin(async { Ok(ExpandNode::empty_leaf()) }),
        RewriteChild::ComputedUserset(computed) => {
            expand_internal(context, resource, computed, path)
        }
        RewriteChild::TupleToUserset { tupleset, computed } => {
            Box::pin(expand_tuple_to_userset(context, resource, tupleset, computed, path))
        }
        RewriteChild::Rewrite(nested) => {
            Box::pin(expand_rewrite(context, resource, relation, nested, path))
        }
    }
}

fn caveat_of(relationship: &Relationship) -> Option<CaveatExpression> {
    relationship
        .optional_caveat
        .as_ref()
        .map(|caveat| CaveatExpression::leaf(caveat.clone()))
}

/// Expands the direct relationships of a relation into a leaf, flattening
/// through userset subjects.
async fn expand_this(
    context: Arc<ExpandContext>,
    resource: ObjectReference,
    relation: String,
    path: HashSet<VisitKey>,
) -> Result<ExpandNode, Error> {
    let filter = RelationshipFilter::new(resource.namespace())
        .object_id(resource.object_id())
        .relation(&relation);
    let rows = context.query(&filter).await?;

    let mut subjects = TrackingSubjectSet::new();
    let mut usersets: Vec<(ObjectReference, String, Relationship)> = Vec::new();
    for row in rows {
        let namespace = row.subject.object().namespace().to_string();
        if row.subject.is_wildcard() {
            let found = FoundSubject::wildcard(&namespace)?
                .with_caveat(caveat_of(&row))
                .with_relationship(row.clone());
            subjects.add(RelationReference::terminal(&namespace), found);
        } else if let Some(subject_relation) = row.subject.optional_relation() {
            usersets.push((
                row.subject.object().clone(),
                subject_relation.to_string(),
                row.clone(),
            ));
        } else {
            let found = FoundSubject::concrete(row.subject.object().clone())
                .with_caveat(caveat_of(&row))
                .with_relationship(row.clone());
            subjects.add(RelationReference::terminal(&namespace), found);
        }
    }

    for (object, subject_relation, row) in usersets {
        let node = expand_internal(
            context.clone(),
            object,
            subject_relation,
            path.clone(),
        )
        .await?;
        let mut nested = node.simplify();
        // Membership through a caveated userset relationship inherits its
        // condition.
        if let Some(expression) = caveat_of(&row) {
            nested = nested.with_parent_caveat_expression(&expression);
        }
        subjects.union_with(&nested);
    }

    Ok(ExpandNode::Leaf { subjects })
}

/// Walks the tupleset relation and unions the expansion of the computed
/// relation on every walked object into one leaf.
async fn expand_tuple_to_userset(
    context: Arc<ExpandContext>,
    resource: ObjectReference,
    tupleset: String,
    computed: String,
    path: HashSet<VisitKey>,
) -> Result<ExpandNode, Error> {
    let filter = RelationshipFilter::new(resource.namespace())
        .object_id(resource.object_id())
        .relation(&tupleset);
    let rows = context.query(&filter).await?;

    let mut subjects = TrackingSubjectSet::new();
    for row in rows {
        if row.subject.is_wildcard() {
            return Err(Error::FailedPrecondition(format!(
                "wildcard subject is not allowed in tupleset relation `{}#{}`",
                resource.namespace(),
                tupleset
            )));
        }
        let node = expand_internal(
            context.clone(),
            row.subject.object().clone(),
            computed.clone(),
            path.clone(),
        )
        .await?;
        let mut nested = node.simplify();
        if let Some(expression) = caveat_of(&row) {
            nested = nested.with_parent_caveat_expression(&expression);
        }
        subjects.union_with(&nested);
    }

    Ok(ExpandNode::Leaf { subjects })
}
