//! Namespace definitions: relations, permissions, allowed types, and
//! userset rewrites.

use core::fmt;

use crate::error::Error;
use crate::types::reference::{validate_namespace, validate_relation_name};
use crate::types::{CaveatReference, SubjectReference};

/// Comments and other source-level metadata preserved through a round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Source comments, each carrying its own delimiter (`// …` or `/* … */`).
    pub comments: Vec<String>,
}

impl Metadata {
    /// Metadata holding a single comment.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            comments: vec![text.into()],
        }
    }
}

/// The set operator of a [`UsersetRewrite`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    /// Members of any child.
    Union,
    /// Members of every child.
    Intersection,
    /// Members of the first child, minus members of every later child.
    /// Left-associative and non-commutative.
    Exclusion,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOperator::Union => "+",
            SetOperator::Intersection => "&",
            SetOperator::Exclusion => "-",
        })
    }
}

/// One child of a set operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteChild {
    /// Direct relationship lookup on the enclosing relation.
    This,
    /// The empty set.
    Nil,
    /// Another relation or permission on the same object.
    ComputedUserset(String),
    /// Walk the relationships of `tupleset` and evaluate `computed` on each
    /// walked object.
    TupleToUserset {
        /// The relation whose relationships are walked.
        tupleset: String,
        /// The relation evaluated on each walked object.
        computed: String,
    },
    /// A nested set operation.
    Rewrite(UsersetRewrite),
}

/// A userset rewrite: a tree of set operations over rewrite children.
///
/// Child order is semantically irrelevant for union and intersection but is
/// preserved for canonical emission; for exclusion it is load-bearing.
#[derive(Debug, Clone, PartialEq)]
pub struct UsersetRewrite {
    /// The operator applied over `children`.
    pub operator: SetOperator,
    /// The ordered children.
    pub children: Vec<RewriteChild>,
}

impl UsersetRewrite {
    /// A union over the given children.
    pub fn union(children: Vec<RewriteChild>) -> Self {
        Self {
            operator: SetOperator::Union,
            children,
        }
    }

    /// An intersection over the given children.
    pub fn intersection(children: Vec<RewriteChild>) -> Self {
        Self {
            operator: SetOperator::Intersection,
            children,
        }
    }

    /// An exclusion: the first child minus every later child.
    pub fn exclusion(children: Vec<RewriteChild>) -> Self {
        Self {
            operator: SetOperator::Exclusion,
            children,
        }
    }

    /// Returns `true` if any leaf of this rewrite is `This`.
    pub fn contains_this(&self) -> bool {
        self.children.iter().any(|child| match child {
            RewriteChild::This => true,
            RewriteChild::Rewrite(nested) => nested.contains_this(),
            _ => false,
        })
    }

    /// Returns `true` if this rewrite is a union whose nested rewrites are
    /// all themselves all-union.
    pub(crate) fn is_all_union(&self) -> bool {
        self.operator == SetOperator::Union
            && self.children.iter().all(|child| match child {
                RewriteChild::Rewrite(nested) => nested.is_all_union(),
                _ => true,
            })
    }
}

/// The subject shape admitted by an [`AllowedRelation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AllowedTarget {
    /// Terminal subjects of the namespace (the ellipsis relation).
    Ellipsis,
    /// Userset subjects through the named relation.
    Relation(String),
    /// The public wildcard of the namespace.
    Wildcard,
}

/// One allowed direct subject type on a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedRelation {
    /// The subject namespace.
    pub namespace: String,
    /// The admitted subject shape.
    pub target: AllowedTarget,
    /// When set, a direct relationship is admitted only if it carries a
    /// caveat of this name.
    pub required_caveat: Option<String>,
}

impl AllowedRelation {
    /// Admits terminal subjects of `namespace`.
    pub fn terminal(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: AllowedTarget::Ellipsis,
            required_caveat: None,
        }
    }

    /// Admits userset subjects `namespace#relation`.
    pub fn userset(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: AllowedTarget::Relation(relation.into()),
            required_caveat: None,
        }
    }

    /// Admits the public wildcard `namespace:*`.
    pub fn wildcard(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: AllowedTarget::Wildcard,
            required_caveat: None,
        }
    }

    /// Requires relationships of this type to carry the named caveat.
    pub fn with_caveat(mut self, name: impl Into<String>) -> Self {
        self.required_caveat = Some(name.into());
        self
    }

    /// Returns `true` if a relationship with this subject and caveat is
    /// admitted by this entry.
    pub fn matches(
        &self,
        subject: &SubjectReference,
        caveat: Option<&CaveatReference>,
    ) -> bool {
        if subject.object().namespace() != self.namespace {
            return false;
        }
        let shape_ok = match &self.target {
            AllowedTarget::Ellipsis => !subject.is_wildcard() && !subject.is_userset(),
            AllowedTarget::Relation(rel) => subject.optional_relation() == Some(rel.as_str()),
            AllowedTarget::Wildcard => subject.is_wildcard(),
        };
        shape_ok && self.required_caveat.as_deref() == caveat.map(|c| c.name.as_str())
    }
}

/// A relation or permission within a namespace definition.
///
/// A relation is a *permission* iff it has a rewrite and that rewrite never
/// reaches a `This` leaf; otherwise it is a plain *relation* and must carry
/// at least one allowed direct subject type.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// The relation name.
    pub name: String,
    /// Allowed direct subject types. Empty for permissions.
    pub allowed: Vec<AllowedRelation>,
    /// The userset rewrite, when one is defined.
    pub rewrite: Option<UsersetRewrite>,
    /// Source metadata.
    pub metadata: Metadata,
}

impl Relation {
    /// A plain relation admitting the given direct subject types.
    pub fn direct(name: impl Into<String>, allowed: Vec<AllowedRelation>) -> Self {
        Self {
            name: name.into(),
            allowed,
            rewrite: None,
            metadata: Metadata::default(),
        }
    }

    /// A permission computed by the given rewrite.
    pub fn permission(name: impl Into<String>, rewrite: UsersetRewrite) -> Self {
        Self {
            name: name.into(),
            allowed: Vec::new(),
            rewrite: Some(rewrite),
            metadata: Metadata::default(),
        }
    }

    /// Attaches a rewrite to a relation (direct relationships plus the
    /// rewrite's members).
    pub fn with_rewrite(mut self, rewrite: UsersetRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Attaches a source comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.metadata.comments.push(comment.into());
        self
    }

    /// Returns `true` if this relation is a permission.
    pub fn is_permission(&self) -> bool {
        matches!(&self.rewrite, Some(rewrite) if !rewrite.contains_this())
    }
}

/// A namespace definition: an ordered list of relations and permissions.
///
/// A namespace with zero relations is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDefinition {
    /// The namespace name.
    pub name: String,
    /// The relations and permissions, in source order.
    pub relations: Vec<Relation>,
    /// Source metadata.
    pub metadata: Metadata,
}

impl NamespaceDefinition {
    /// Creates an empty namespace definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: Vec::new(),
            metadata: Metadata::default(),
        }
    }

    /// Appends a relation, preserving source order.
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Attaches a source comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.metadata.comments.push(comment.into());
        self
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Validates the definition's shape.
    ///
    /// Checks identifier rules, duplicate relation names, that permissions
    /// carry no allowed types, and that non-permissions carry at least one.
    pub fn validate(&self) -> Result<(), Error> {
        validate_namespace(&self.name)?;

        let mut seen = std::collections::HashSet::new();
        for relation in &self.relations {
            validate_relation_name(&relation.name)?;
            if !seen.insert(relation.name.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate relation `{}` in definition `{}`",
                    relation.name, self.name
                )));
            }

            for allowed in &relation.allowed {
                validate_namespace(&allowed.namespace)?;
                if let AllowedTarget::Relation(rel) = &allowed.target {
                    validate_relation_name(rel)?;
                }
            }

            if relation.is_permission() {
                if !relation.allowed.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "permission `{}#{}` must not declare allowed subject types",
                        self.name, relation.name
                    )));
                }
            } else if relation.allowed.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "relation `{}#{}` must declare at least one allowed subject type",
                    self.name, relation.name
                )));
            }
        }
        Ok(())
    }
}
