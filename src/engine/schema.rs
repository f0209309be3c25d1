//! Schema read/write entry points.

use tracing::warn;

use crate::error::Error;
use crate::schema::{generate, CaveatEngine, SchemaDefinition};
use crate::types::Revision;

use super::Engine;

impl Engine {
    /// Reads the current schema as canonical text.
    ///
    /// Returns the generated text and the revision at which it was read.
    /// Generation is best-effort: a schema with issues still yields text,
    /// with the problem marked inline.
    pub async fn read_schema(
        &self,
        caveats: &dyn CaveatEngine,
    ) -> Result<(String, Revision), Error> {
        let revision = self.store().head_revision().await?;
        let mut definitions: Vec<SchemaDefinition> = Vec::new();
        for namespace in self.store().list_namespaces(revision).await? {
            definitions.push(SchemaDefinition::Namespace((*namespace).clone()));
        }
        for caveat in self.store().list_caveats(revision).await? {
            definitions.push(SchemaDefinition::Caveat((*caveat).clone()));
        }

        let (text, ok) = generate(&definitions, caveats);
        if !ok {
            warn!("generated schema text carries issue markers");
        }
        Ok((text, revision))
    }

    /// Atomically replaces the schema with the given definitions.
    ///
    /// Returns `Err(InvalidArgument)` if the definition list is empty or
    /// any definition is malformed.
    pub async fn write_schema(
        &self,
        definitions: Vec<SchemaDefinition>,
    ) -> Result<Revision, Error> {
        if definitions.is_empty() {
            return Err(Error::InvalidArgument(
                "schema must contain at least one definition".into(),
            ));
        }

        let mut namespaces = Vec::new();
        let mut caveats = Vec::new();
        for definition in definitions {
            match definition {
                SchemaDefinition::Namespace(namespace) => {
                    namespace.validate()?;
                    namespaces.push(namespace);
                }
                SchemaDefinition::Caveat(caveat) => {
                    caveat.validate()?;
                    caveats.push(caveat);
                }
            }
        }
        self.store().write_schema(namespaces, caveats).await
    }
}
