//! Heterogeneous subject sets, keyed by subject type.

use core::fmt;
use std::collections::BTreeMap;

use crate::subjectset::{BaseSubjectSet, CaveatExpression, FoundSubject};
use crate::types::ELLIPSIS;

/// A subject type key: `namespace#relation`, with `...` for terminal
/// subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationReference {
    /// The subject namespace.
    pub namespace: String,
    /// The subject relation; [`ELLIPSIS`] for terminal subjects.
    pub relation: String,
}

impl RelationReference {
    /// A key for userset subjects `namespace#relation`.
    pub fn new(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: relation.into(),
        }
    }

    /// A key for terminal subjects of a namespace.
    pub fn terminal(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: ELLIPSIS.to_string(),
        }
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.relation)
    }
}

/// A map from subject type key to [`BaseSubjectSet`], composing single-type
/// sets into the heterogeneous sets produced by expand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSubjectSet {
    sets: BTreeMap<RelationReference, BaseSubjectSet<FoundSubject>>,
}

impl TrackingSubjectSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a found subject under the given type key.
    pub fn add(&mut self, key: RelationReference, subject: FoundSubject) {
        self.sets.entry(key).or_default().add(subject);
    }

    /// The single-type set for a key, when present.
    pub fn get(&self, key: &RelationReference) -> Option<&BaseSubjectSet<FoundSubject>> {
        self.sets.get(key)
    }

    /// Returns `true` if no key holds any member.
    pub fn is_empty(&self) -> bool {
        self.sets.values().all(BaseSubjectSet::is_empty)
    }

    /// Total number of members across all keys.
    pub fn subject_count(&self) -> usize {
        self.sets.values().map(BaseSubjectSet::len).sum()
    }

    /// Iterates over the type keys and their sets.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&RelationReference, &BaseSubjectSet<FoundSubject>)> {
        self.sets.iter()
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Self) {
        for (key, set) in &other.sets {
            match self.sets.get_mut(key) {
                Some(existing) => existing.union_with(set),
                None => {
                    self.sets.insert(key.clone(), set.clone());
                }
            }
        }
    }

    /// In-place intersection: keys missing from either side are dropped.
    pub fn intersect_with(&mut self, other: &Self) {
        let sets = std::mem::take(&mut self.sets);
        for (key, mut set) in sets {
            if let Some(right) = other.sets.get(&key) {
                set.intersection_difference(right);
                if !set.is_empty() {
                    self.sets.insert(key, set);
                }
            }
        }
    }

    /// In-place difference on matching keys.
    pub fn subtract(&mut self, other: &Self) {
        let sets = std::mem::take(&mut self.sets);
        for (key, mut set) in sets {
            if let Some(right) = other.sets.get(&key) {
                set.subtract(right);
            }
            if !set.is_empty() {
                self.sets.insert(key, set);
            }
        }
    }

    /// Returns a copy with every member conjoined with the expression.
    pub fn with_parent_caveat_expression(&self, expression: &CaveatExpression) -> Self {
        Self {
            sets: self
                .sets
                .iter()
                .map(|(key, set)| {
                    (key.clone(), set.with_parent_caveat_expression(expression))
                })
                .collect(),
        }
    }
}
