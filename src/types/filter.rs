//! Relationship filters with explicit active-field markers.

use crate::error::Error;
use crate::types::reference::{validate_namespace, validate_relation_name};
use crate::types::{Relationship, SubjectReference};

/// The set of optional filter criteria that are in use.
///
/// A field participates in matching only when its marker is set; this keeps
/// "no criterion" distinct from "criterion with no value", and lets
/// [`RelationshipFilter::validate`] reject filters where the two disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FilterFields {
    /// Match on the resource object ID.
    pub object_id: bool,
    /// Match on the relation name.
    pub relation: bool,
    /// Match on the subject userset.
    pub subject: bool,
}

/// A filter for selecting relationships by namespace, resource ID, relation,
/// and/or subject. The namespace is mandatory; every other criterion applies
/// only when marked active in [`FilterFields`].
///
/// # Examples
///
/// ```
/// use warrant::RelationshipFilter;
///
/// let filter = RelationshipFilter::new("document")
///     .object_id("healthplan")
///     .relation("parent");
/// assert!(filter.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipFilter {
    /// Resource namespace to filter on. Mandatory.
    pub namespace: String,
    /// Optional resource ID; used only when `active.object_id` is set.
    pub optional_object_id: Option<String>,
    /// Optional relation name; used only when `active.relation` is set.
    pub optional_relation: Option<String>,
    /// Optional subject userset; used only when `active.subject` is set.
    pub optional_subject: Option<SubjectReference>,
    /// Which optional criteria are in use.
    pub active: FilterFields,
}

impl RelationshipFilter {
    /// Creates a new filter for the given namespace, with no other criteria.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            optional_object_id: None,
            optional_relation: None,
            optional_subject: None,
            active: FilterFields::default(),
        }
    }

    /// Adds a resource ID criterion and marks it active.
    pub fn object_id(mut self, id: impl Into<String>) -> Self {
        self.optional_object_id = Some(id.into());
        self.active.object_id = true;
        self
    }

    /// Adds a relation criterion and marks it active.
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.optional_relation = Some(relation.into());
        self.active.relation = true;
        self
    }

    /// Adds a subject criterion and marks it active.
    pub fn subject(mut self, subject: SubjectReference) -> Self {
        self.optional_subject = Some(subject);
        self.active.subject = true;
        self
    }

    /// Checks the filter's shape: the namespace must be a valid identifier,
    /// and each optional criterion must be present exactly when marked.
    pub fn validate(&self) -> Result<(), Error> {
        validate_namespace(&self.namespace)?;

        match (self.active.object_id, &self.optional_object_id) {
            (true, None) => {
                return Err(Error::InvalidArgument(
                    "filter marks object_id active but carries no value".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(Error::InvalidArgument(
                    "filter carries an object_id but does not mark it active".into(),
                ));
            }
            (true, Some(id)) if id.is_empty() => {
                return Err(Error::InvalidArgument(
                    "filter object_id must not be empty".into(),
                ));
            }
            _ => {}
        }

        match (self.active.relation, &self.optional_relation) {
            (true, None) => {
                return Err(Error::InvalidArgument(
                    "filter marks relation active but carries no value".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(Error::InvalidArgument(
                    "filter carries a relation but does not mark it active".into(),
                ));
            }
            (true, Some(rel)) => validate_relation_name(rel)?,
            _ => {}
        }

        match (self.active.subject, &self.optional_subject) {
            (true, None) => {
                return Err(Error::InvalidArgument(
                    "filter marks subject active but carries no value".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(Error::InvalidArgument(
                    "filter carries a subject but does not mark it active".into(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns `true` if the relationship satisfies every active criterion.
    pub fn matches(&self, relationship: &Relationship) -> bool {
        if relationship.resource.namespace() != self.namespace {
            return false;
        }
        if self.active.object_id {
            if self.optional_object_id.as_deref() != Some(relationship.resource.object_id()) {
                return false;
            }
        }
        if self.active.relation {
            if self.optional_relation.as_deref() != Some(relationship.relation.as_str()) {
                return false;
            }
        }
        if self.active.subject {
            if self.optional_subject.as_ref() != Some(&relationship.subject) {
                return false;
            }
        }
        true
    }
}

/// A relationship with the revision at which it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRelationshipResult {
    /// The relationship.
    pub relationship: Relationship,
    /// The revision at which this relationship was read.
    pub read_at: crate::types::Revision,
}
