//! Relationship, RelationshipUpdate, CaveatReference, and Precondition types.

use core::fmt;
use std::collections::HashMap;

use crate::types::{ContextValue, ObjectReference, SubjectReference};

/// A caveat attached to a relationship: the name of a schema-defined caveat
/// plus context bindings captured when the relationship was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CaveatReference {
    /// The caveat name as defined in the schema.
    pub name: String,
    /// Key-value context pairs for caveat evaluation.
    pub context: HashMap<String, ContextValue>,
}

impl CaveatReference {
    /// Creates a new caveat reference with the given name and context.
    pub fn new(name: impl Into<String>, context: HashMap<String, ContextValue>) -> Self {
        Self {
            name: name.into(),
            context,
        }
    }
}

impl fmt::Display for CaveatReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A relationship between a resource and a subject via a relation.
///
/// Relationships are uniquely keyed by (resource, relation, subject, caveat
/// name); two relationships differing only in caveat context are the same
/// row, and a write replaces the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    /// The resource side of the relationship.
    pub resource: ObjectReference,
    /// The relation name (e.g., `"viewer"`, `"owner"`).
    pub relation: String,
    /// The subject side of the relationship.
    pub subject: SubjectReference,
    /// An optional caveat on this relationship.
    pub optional_caveat: Option<CaveatReference>,
}

impl Relationship {
    /// Creates a new relationship without a caveat.
    pub fn new(
        resource: ObjectReference,
        relation: impl Into<String>,
        subject: SubjectReference,
    ) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
            optional_caveat: None,
        }
    }

    /// Attaches a caveat to this relationship.
    pub fn with_caveat(mut self, caveat: CaveatReference) -> Self {
        self.optional_caveat = Some(caveat);
        self
    }

    /// The unique storage key: caveat context is not part of identity.
    pub(crate) fn key(&self) -> (&ObjectReference, &str, &SubjectReference, Option<&str>) {
        (
            &self.resource,
            &self.relation,
            &self.subject,
            self.optional_caveat.as_ref().map(|c| c.name.as_str()),
        )
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.resource, self.relation, self.subject)?;
        if let Some(caveat) = &self.optional_caveat {
            write!(f, "[{}]", caveat)?;
        }
        Ok(())
    }
}

/// The operation to perform on a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create the relationship; error if it already exists.
    Create,
    /// Upsert the relationship; no error if it already exists.
    Touch,
    /// Delete the relationship; no-op if it doesn't exist.
    Delete,
}

/// A relationship mutation (create, touch, or delete).
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipUpdate {
    /// The operation to perform.
    pub operation: Operation,
    /// The relationship to mutate.
    pub relationship: Relationship,
}

impl RelationshipUpdate {
    /// Creates a CREATE update for the given relationship.
    pub fn create(relationship: Relationship) -> Self {
        Self {
            operation: Operation::Create,
            relationship,
        }
    }

    /// Creates a TOUCH (upsert) update for the given relationship.
    pub fn touch(relationship: Relationship) -> Self {
        Self {
            operation: Operation::Touch,
            relationship,
        }
    }

    /// Creates a DELETE update for the given relationship.
    pub fn delete(relationship: Relationship) -> Self {
        Self {
            operation: Operation::Delete,
            relationship,
        }
    }
}

/// The operation for a precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreconditionOp {
    /// The filter must match at least one existing relationship.
    MustExist,
    /// The filter must not match any existing relationships.
    MustNotExist,
}

/// A precondition on a write or delete operation, evaluated at the pre-write
/// snapshot. A failed precondition aborts the whole write.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    /// The precondition operation.
    pub operation: PreconditionOp,
    /// The filter that must (or must not) match.
    pub filter: crate::types::RelationshipFilter,
}

impl Precondition {
    /// Creates a precondition that requires matching relationships to exist.
    pub fn must_exist(filter: crate::types::RelationshipFilter) -> Self {
        Self {
            operation: PreconditionOp::MustExist,
            filter,
        }
    }

    /// Creates a precondition that requires no matching relationships to exist.
    pub fn must_not_exist(filter: crate::types::RelationshipFilter) -> Self {
        Self {
            operation: PreconditionOp::MustNotExist,
            filter,
        }
    }
}
