//! The single-type subject-set with wildcard, exclusion, and caveat
//! semantics.

use std::collections::BTreeMap;

use crate::subjectset::expression::{and, not, or, CaveatExpression};
use crate::types::{Relationship, WILDCARD_ID};

/// An element of a [`BaseSubjectSet`].
///
/// Identity is the element's `id`; the caveat, exclusion list, and
/// provenance are carried alongside and recombined by the algebra via
/// [`SetElement::with_parts`], which preserves identity while replacing the
/// rest.
pub trait SetElement: Clone {
    /// The element's object ID (`*` for a wildcard element).
    fn id(&self) -> &str;

    /// The caveat expression under which membership holds; `None` is
    /// unconditional.
    fn caveat(&self) -> Option<&CaveatExpression>;

    /// Subjects excluded from a wildcard element.
    fn excluded(&self) -> &[Self];

    /// The relationships that contributed this element.
    fn sources(&self) -> &[Relationship];

    /// Rebuilds this element with the same identity and new parts.
    fn with_parts(
        &self,
        caveat: Option<CaveatExpression>,
        excluded: Vec<Self>,
        sources: Vec<Relationship>,
    ) -> Self;
}

fn merge_sources(lhs: &[Relationship], rhs: &[Relationship]) -> Vec<Relationship> {
    let mut merged = lhs.to_vec();
    for relationship in rhs {
        if !merged.contains(relationship) {
            merged.push(relationship.clone());
        }
    }
    merged
}

/// Whether (and under which condition) a wildcard element covers an ID.
enum Cover {
    Always,
    Never,
    When(CaveatExpression),
}

fn wildcard_cover<S: SetElement>(wildcard: &S, id: &str) -> Cover {
    match wildcard.excluded().iter().find(|entry| entry.id() == id) {
        Some(entry) => match entry.caveat() {
            // Unconditionally excluded: never covered.
            None => Cover::Never,
            // Covered when the wildcard applies and the exclusion does not.
            Some(exclusion) => {
                match and(wildcard.caveat().cloned(), Some(not(exclusion.clone()))) {
                    Some(expression) => Cover::When(expression),
                    None => Cover::Always,
                }
            }
        },
        None => match wildcard.caveat() {
            None => Cover::Always,
            Some(expression) => Cover::When(expression.clone()),
        },
    }
}

/// A set of subjects of a single type key `namespace#relation`, supporting
/// union, intersection, and difference over concrete, wildcarded, and
/// caveated members.
///
/// Concrete members are kept in ID order for deterministic iteration; at
/// most one wildcard member exists per set and carries the exclusion list.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseSubjectSet<S> {
    concrete: BTreeMap<String, S>,
    wildcard: Option<S>,
}

impl<S> Default for BaseSubjectSet<S> {
    fn default() -> Self {
        Self {
            concrete: BTreeMap::new(),
            wildcard: None,
        }
    }
}

impl<S: SetElement> BaseSubjectSet<S> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.concrete.is_empty() && self.wildcard.is_none()
    }

    /// Number of members, counting a wildcard as one.
    pub fn len(&self) -> usize {
        self.concrete.len() + usize::from(self.wildcard.is_some())
    }

    /// Looks up a member by object ID; `*` returns the wildcard member.
    pub fn get(&self, object_id: &str) -> Option<&S> {
        if object_id == WILDCARD_ID {
            self.wildcard.as_ref()
        } else {
            self.concrete.get(object_id)
        }
    }

    /// The wildcard member, when present.
    pub fn wildcard(&self) -> Option<&S> {
        self.wildcard.as_ref()
    }

    /// All members: concretes in ID order, then the wildcard.
    pub fn as_slice(&self) -> Vec<S> {
        let mut members: Vec<S> = self.concrete.values().cloned().collect();
        if let Some(wildcard) = &self.wildcard {
            members.push(wildcard.clone());
        }
        members
    }

    /// Inserts a member, merging with any member of the same identity.
    ///
    /// Same-ID merges are unions: caveats combine with OR (an uncaveated
    /// side absorbs), provenance is appended, and wildcard exclusion lists
    /// are intersected.
    pub fn add(&mut self, element: S) {
        if element.id() == WILDCARD_ID {
            self.add_wildcard(element);
        } else {
            self.add_concrete(element);
        }
    }

    fn add_concrete(&mut self, element: S) {
        let id = element.id().to_string();

        // An unconditional wildcard already covering this ID absorbs it.
        if let Some(wildcard) = &self.wildcard {
            if matches!(wildcard_cover(wildcard, &id), Cover::Always) {
                let sources = merge_sources(wildcard.sources(), element.sources());
                let updated = wildcard.with_parts(
                    wildcard.caveat().cloned(),
                    wildcard.excluded().to_vec(),
                    sources,
                );
                self.wildcard = Some(updated);
                return;
            }
        }

        match self.concrete.remove(&id) {
            Some(existing) => {
                let caveat = or(existing.caveat().cloned(), element.caveat().cloned());
                let sources = merge_sources(existing.sources(), element.sources());
                self.concrete
                    .insert(id, existing.with_parts(caveat, Vec::new(), sources));
            }
            None => {
                self.concrete.insert(id, element);
            }
        }
    }

    fn add_wildcard(&mut self, element: S) {
        let merged = match self.wildcard.take() {
            Some(existing) => {
                let caveat = or(existing.caveat().cloned(), element.caveat().cloned());
                // An ID stays excluded only if both sides exclude it.
                let mut excluded = Vec::new();
                for left in existing.excluded() {
                    if let Some(right) = element
                        .excluded()
                        .iter()
                        .find(|entry| entry.id() == left.id())
                    {
                        let entry_caveat = and(left.caveat().cloned(), right.caveat().cloned());
                        let sources = merge_sources(left.sources(), right.sources());
                        excluded.push(left.with_parts(entry_caveat, Vec::new(), sources));
                    }
                }
                let sources = merge_sources(existing.sources(), element.sources());
                existing.with_parts(caveat, excluded, sources)
            }
            None => element,
        };

        // Absorb concretes the merged wildcard now unconditionally covers.
        let mut absorbed_sources: Vec<Relationship> = Vec::new();
        let concrete = std::mem::take(&mut self.concrete);
        for (id, member) in concrete {
            if matches!(wildcard_cover(&merged, &id), Cover::Always) {
                absorbed_sources = merge_sources(&absorbed_sources, member.sources());
            } else {
                self.concrete.insert(id, member);
            }
        }
        let sources = merge_sources(merged.sources(), &absorbed_sources);
        self.wildcard = Some(merged.with_parts(
            merged.caveat().cloned(),
            merged.excluded().to_vec(),
            sources,
        ));
    }

    /// In-place union with another set.
    pub fn union_with(&mut self, other: &Self) {
        if let Some(wildcard) = &other.wildcard {
            self.add(wildcard.clone());
        }
        for element in other.concrete.values() {
            self.add(element.clone());
        }
    }

    /// In-place intersection with another set.
    ///
    /// Concrete∩concrete conjoins caveats; a wildcard admits the other
    /// side's non-excluded concretes; two wildcards intersect into one whose
    /// exclusion list is the union of both (the wildcard is kept alongside
    /// the concrete intersections).
    pub fn intersection_difference(&mut self, other: &Self) {
        let mut result: BTreeMap<String, S> = BTreeMap::new();

        for (id, left) in &self.concrete {
            if let Some(right) = other.concrete.get(id) {
                let caveat = and(left.caveat().cloned(), right.caveat().cloned());
                let sources = merge_sources(left.sources(), right.sources());
                result.insert(id.clone(), left.with_parts(caveat, Vec::new(), sources));
            } else if let Some(wildcard) = &other.wildcard {
                match wildcard_cover(wildcard, id) {
                    Cover::Always => {
                        let sources = merge_sources(left.sources(), wildcard.sources());
                        result.insert(
                            id.clone(),
                            left.with_parts(left.caveat().cloned(), Vec::new(), sources),
                        );
                    }
                    Cover::Never => {}
                    Cover::When(expression) => {
                        let caveat = and(left.caveat().cloned(), Some(expression));
                        let sources = merge_sources(left.sources(), wildcard.sources());
                        result.insert(id.clone(), left.with_parts(caveat, Vec::new(), sources));
                    }
                }
            }
        }

        for (id, right) in &other.concrete {
            if result.contains_key(id) || self.concrete.contains_key(id) {
                continue;
            }
            if let Some(wildcard) = &self.wildcard {
                match wildcard_cover(wildcard, id) {
                    Cover::Always => {
                        let sources = merge_sources(right.sources(), wildcard.sources());
                        result.insert(
                            id.clone(),
                            right.with_parts(right.caveat().cloned(), Vec::new(), sources),
                        );
                    }
                    Cover::Never => {}
                    Cover::When(expression) => {
                        let caveat = and(right.caveat().cloned(), Some(expression));
                        let sources = merge_sources(right.sources(), wildcard.sources());
                        result.insert(id.clone(), right.with_parts(caveat, Vec::new(), sources));
                    }
                }
            }
        }

        let wildcard = match (self.wildcard.take(), &other.wildcard) {
            (Some(left), Some(right)) => {
                let caveat = and(left.caveat().cloned(), right.caveat().cloned());
                // An ID is excluded from the intersection if either side
                // excludes it.
                let mut excluded: Vec<S> = left.excluded().to_vec();
                for entry in right.excluded() {
                    if let Some(position) =
                        excluded.iter().position(|existing| existing.id() == entry.id())
                    {
                        let entry_caveat =
                            or(excluded[position].caveat().cloned(), entry.caveat().cloned());
                        let sources = merge_sources(excluded[position].sources(), entry.sources());
                        excluded[position] =
                            excluded[position].with_parts(entry_caveat, Vec::new(), sources);
                    } else {
                        excluded.push(entry.clone());
                    }
                }
                let sources = merge_sources(left.sources(), right.sources());
                Some(left.with_parts(caveat, excluded, sources))
            }
            _ => None,
        };

        self.concrete = result;
        self.wildcard = wildcard;
    }

    /// In-place difference: removes the other set's members from this one.
    pub fn subtract(&mut self, other: &Self) {
        for (id, removed) in &other.concrete {
            if let Some(left) = self.concrete.get(id) {
                match removed.caveat() {
                    None => {
                        self.concrete.remove(id);
                    }
                    Some(condition) => {
                        // The removal may not apply; the survivor stays,
                        // conditioned on the removal's caveat failing.
                        let caveat =
                            and(left.caveat().cloned(), Some(not(condition.clone())));
                        let updated =
                            left.with_parts(caveat, Vec::new(), left.sources().to_vec());
                        self.concrete.insert(id.clone(), updated);
                    }
                }
            }

            if let Some(wildcard) = self.wildcard.take() {
                let mut excluded = wildcard.excluded().to_vec();
                match excluded.iter().position(|entry| entry.id() == removed.id()) {
                    Some(position) => {
                        let entry_caveat =
                            or(excluded[position].caveat().cloned(), removed.caveat().cloned());
                        let sources =
                            merge_sources(excluded[position].sources(), removed.sources());
                        excluded[position] =
                            excluded[position].with_parts(entry_caveat, Vec::new(), sources);
                    }
                    None => excluded.push(removed.with_parts(
                        removed.caveat().cloned(),
                        Vec::new(),
                        removed.sources().to_vec(),
                    )),
                }
                self.wildcard = Some(wildcard.with_parts(
                    wildcard.caveat().cloned(),
                    excluded,
                    wildcard.sources().to_vec(),
                ));
            }
        }

        if let Some(removed_wildcard) = &other.wildcard {
            let concrete = std::mem::take(&mut self.concrete);
            for (id, left) in concrete {
                match wildcard_cover(removed_wildcard, &id) {
                    Cover::Always => {}
                    Cover::Never => {
                        self.concrete.insert(id, left);
                    }
                    Cover::When(expression) => {
                        let caveat = and(left.caveat().cloned(), Some(not(expression)));
                        let updated =
                            left.with_parts(caveat, Vec::new(), left.sources().to_vec());
                        self.concrete.insert(id, updated);
                    }
                }
            }

            if let Some(left_wildcard) = self.wildcard.take() {
                match removed_wildcard.caveat() {
                    None => {
                        // Everything the right wildcard covers is gone; what
                        // remains are the right side's exclusions, where the
                        // left wildcard still covers them.
                        for entry in removed_wildcard.excluded() {
                            let cover = match wildcard_cover(&left_wildcard, entry.id()) {
                                Cover::Always => None,
                                Cover::Never => continue,
                                Cover::When(expression) => Some(expression),
                            };
                            let caveat = and(cover, entry.caveat().cloned());
                            let sources =
                                merge_sources(left_wildcard.sources(), entry.sources());
                            let member = entry.with_parts(caveat, Vec::new(), sources);
                            self.add_concrete(member);
                        }
                    }
                    Some(condition) => {
                        let caveat = and(
                            left_wildcard.caveat().cloned(),
                            Some(not(condition.clone())),
                        );
                        self.wildcard = Some(left_wildcard.with_parts(
                            caveat,
                            left_wildcard.excluded().to_vec(),
                            left_wildcard.sources().to_vec(),
                        ));
                    }
                }
            }
        }
    }

    /// Returns a copy of this set with every member's caveat conjoined with
    /// the given expression. Exclusion entries are left untouched.
    pub fn with_parent_caveat_expression(&self, expression: &CaveatExpression) -> Self {
        let concrete = self
            .concrete
            .iter()
            .map(|(id, element)| {
                let caveat = and(element.caveat().cloned(), Some(expression.clone()));
                (
                    id.clone(),
                    element.with_parts(caveat, element.excluded().to_vec(), element.sources().to_vec()),
                )
            })
            .collect();
        let wildcard = self.wildcard.as_ref().map(|wildcard| {
            let caveat = and(wildcard.caveat().cloned(), Some(expression.clone()));
            wildcard.with_parts(caveat, wildcard.excluded().to_vec(), wildcard.sources().to_vec())
        });
        Self { concrete, wildcard }
    }
}
