//! Caveat definitions and the opaque caveat module contract.
//!
//! The engine never inspects caveat expression internals. Expressions are
//! opaque bytes interpreted by an external module implementing
//! [`CaveatEngine`]; the core only builds Boolean combinations over them
//! (see [`crate::subjectset::CaveatExpression`]) and stringifies them for
//! schema generation.

use std::collections::HashMap;

use crate::error::Error;
use crate::schema::Metadata;
use crate::types::reference::validate_relation_name;
use crate::types::ContextValue;

/// A named, parameterized Boolean predicate.
///
/// Parameter types are stored as the caveat module's canonical type strings
/// (e.g. `"int"`, `"list<string>"`); the map is unordered in semantics and
/// emitted sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct CaveatDefinition {
    /// The caveat name.
    pub name: String,
    /// Parameter name to canonical type string.
    pub parameters: HashMap<String, String>,
    /// The serialized expression, opaque to the engine.
    pub expression: Vec<u8>,
    /// Source metadata.
    pub metadata: Metadata,
}

impl CaveatDefinition {
    /// Creates a new caveat definition.
    pub fn new(
        name: impl Into<String>,
        parameters: HashMap<String, String>,
        expression: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            expression,
            metadata: Metadata::default(),
        }
    }

    /// Attaches a source comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.metadata.comments.push(comment.into());
        self
    }

    /// Validates the definition's shape.
    pub fn validate(&self) -> Result<(), Error> {
        validate_relation_name(&self.name)?;
        for name in self.parameters.keys() {
            if name.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "caveat `{}` has an unnamed parameter",
                    self.name
                )));
            }
        }
        if self.expression.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "caveat `{}` has an empty expression",
                self.name
            )));
        }
        Ok(())
    }
}

/// The result of evaluating a compiled caveat expression against a context.
pub enum CaveatOutcome {
    /// The expression evaluated to a definite Boolean.
    Value(bool),
    /// Some required context was missing; the residual expression still
    /// depends on the named fields.
    Partial(Box<dyn CompiledExpression>),
}

/// A deserialized caveat expression.
///
/// Implementations live outside the engine; the core calls these four
/// capabilities and nothing else.
pub trait CompiledExpression: Send + Sync {
    /// The trimmed textual form of the expression, used by the schema
    /// generator.
    fn expr_string(&self) -> String;

    /// Evaluates the expression against the given context bindings.
    fn evaluate(&self, context: &HashMap<String, ContextValue>)
        -> Result<CaveatOutcome, Error>;

    /// Serializes the expression back to opaque bytes.
    fn serialize(&self) -> Vec<u8>;
}

/// The external caveat module: turns opaque expression bytes back into a
/// [`CompiledExpression`].
pub trait CaveatEngine: Send + Sync {
    /// Deserializes expression bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid serialized expression.
    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn CompiledExpression>, Error>;
}
