//! Subjects found by expansion, with exclusions, caveats, and provenance.

use core::fmt;

use crate::error::Error;
use crate::subjectset::{CaveatExpression, SetElement};
use crate::types::{ObjectReference, Relationship, WILDCARD_ID};

/// A subject produced by the evaluator.
///
/// Carries the subject's identity, the exclusion list (meaningful only for
/// wildcards), the caveat expression under which membership holds (`None`
/// for unconditional), and the relationships that contributed to its
/// presence. Provenance is append-only and never part of identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundSubject {
    subject: ObjectReference,
    excluded: Vec<FoundSubject>,
    caveat: Option<CaveatExpression>,
    relationships: Vec<Relationship>,
}

impl FoundSubject {
    /// A concrete subject with no caveat and no provenance.
    pub fn concrete(subject: ObjectReference) -> Self {
        Self {
            subject,
            excluded: Vec::new(),
            caveat: None,
            relationships: Vec::new(),
        }
    }

    /// The wildcard subject for a namespace.
    pub fn wildcard(namespace: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            subject: ObjectReference::wildcard(namespace)?,
            excluded: Vec::new(),
            caveat: None,
            relationships: Vec::new(),
        })
    }

    /// Replaces the caveat expression.
    pub fn with_caveat(mut self, caveat: Option<CaveatExpression>) -> Self {
        self.caveat = caveat;
        self
    }

    /// Appends a contributing relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// The subject reference.
    pub fn subject(&self) -> &ObjectReference {
        &self.subject
    }

    /// The subject's object ID (`*` for wildcards).
    pub fn subject_id(&self) -> &str {
        self.subject.object_id()
    }

    /// Subjects excluded from a wildcard match.
    pub fn excluded_subjects(&self) -> &[FoundSubject] {
        &self.excluded
    }

    /// The caveat expression under which membership holds.
    pub fn caveat_expression(&self) -> Option<&CaveatExpression> {
        self.caveat.as_ref()
    }

    /// The relationships that contributed this subject.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Returns `true` if this is a wildcard subject.
    pub fn is_wildcard(&self) -> bool {
        self.subject_id() == WILDCARD_ID
    }
}

impl fmt::Display for FoundSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)?;
        if !self.excluded.is_empty() {
            let ids: Vec<&str> = self.excluded.iter().map(|e| e.subject_id()).collect();
            write!(f, " - {{{}}}", ids.join(", "))?;
        }
        if self.caveat.is_some() {
            write!(f, "[...]")?;
        }
        Ok(())
    }
}

impl SetElement for FoundSubject {
    fn id(&self) -> &str {
        self.subject.object_id()
    }

    fn caveat(&self) -> Option<&CaveatExpression> {
        self.caveat.as_ref()
    }

    fn excluded(&self) -> &[Self] {
        &self.excluded
    }

    fn sources(&self) -> &[Relationship] {
        &self.relationships
    }

    fn with_parts(
        &self,
        caveat: Option<CaveatExpression>,
        excluded: Vec<Self>,
        sources: Vec<Relationship>,
    ) -> Self {
        Self {
            subject: self.subject.clone(),
            excluded,
            caveat,
            relationships: sources,
        }
    }
}
