//! Watch event types (behind `watch` feature).

use crate::types::{RelationshipUpdate, Revision};

/// An event from the relationship watch stream.
///
/// Contains the updates committed at one revision and that revision as a
/// checkpoint for resumption.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    /// The relationship updates in this event.
    pub updates: Vec<RelationshipUpdate>,
    /// Checkpoint revision for resuming the watch stream.
    pub checkpoint: Revision,
}
