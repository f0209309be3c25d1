//! Schema model and canonical text generation.
//!
//! Namespace definitions describe relations (holding direct relationships),
//! permissions (computed by userset rewrites), and the subject types each
//! relation admits. Caveat definitions name parameterized predicates whose
//! expressions stay opaque to the engine. [`generate`] renders both back to
//! canonical schema text.

mod caveat;
mod definition;
mod generator;

pub use caveat::{CaveatDefinition, CaveatEngine, CaveatOutcome, CompiledExpression};
pub use definition::{
    AllowedRelation, AllowedTarget, Metadata, NamespaceDefinition, Relation, RewriteChild,
    SetOperator, UsersetRewrite,
};
pub use generator::generate;

/// One top-level schema definition: a namespace or a caveat.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDefinition {
    /// A namespace definition.
    Namespace(NamespaceDefinition),
    /// A caveat definition.
    Caveat(CaveatDefinition),
}

impl SchemaDefinition {
    /// The definition's name.
    pub fn name(&self) -> &str {
        match self {
            SchemaDefinition::Namespace(namespace) => &namespace.name,
            SchemaDefinition::Caveat(caveat) => &caveat.name,
        }
    }
}
