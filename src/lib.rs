//! # Warrant
//!
//! An embeddable, [Zanzibar](https://research.google/pubs/pub48190/)-inspired
//! relationship-based access control (ReBAC) engine.
//!
//! Warrant stores *relationships* between objects and answers authorization
//! queries against them, using a schema that defines *relations*,
//! *permissions* composed via set algebra, and *caveats* — named
//! parameterized predicates that admit membership conditionally.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use warrant::schema::{
//!     AllowedRelation, NamespaceDefinition, Relation, RewriteChild, SchemaDefinition,
//!     UsersetRewrite,
//! };
//! use warrant::{
//!     Engine, MemoryDatastore, ObjectReference, Relationship, RelationshipUpdate,
//!     SubjectReference,
//! };
//!
//! # async fn example() -> Result<(), warrant::Error> {
//! let engine = Engine::new(Arc::new(MemoryDatastore::new()));
//!
//! // definition document { relation viewer: user; permission view = viewer }
//! engine
//!     .write_schema(vec![
//!         SchemaDefinition::Namespace(NamespaceDefinition::new("user")),
//!         SchemaDefinition::Namespace(
//!             NamespaceDefinition::new("document")
//!                 .with_relation(Relation::direct(
//!                     "viewer",
//!                     vec![AllowedRelation::terminal("user")],
//!                 ))
//!                 .with_relation(Relation::permission(
//!                     "view",
//!                     UsersetRewrite::union(vec![RewriteChild::ComputedUserset(
//!                         "viewer".into(),
//!                     )]),
//!                 )),
//!         ),
//!     ])
//!     .await?;
//!
//! let doc = ObjectReference::new("document", "doc-123")?;
//! let alice = SubjectReference::new(ObjectReference::new("user", "alice")?, None::<String>)?;
//! engine
//!     .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
//!         doc.clone(),
//!         "viewer",
//!         alice.clone(),
//!     ))])
//!     .await?;
//!
//! let response = engine.check_permission(&doc, "view", &alice).await?;
//! assert!(response.is_member());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `watch` | No | Streaming relationship changes on the datastore contract and the facade |
//! | `serde` | No | Serialize/Deserialize on domain types; JSON conversions for caveat context |

pub mod datastore;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod schema;
pub mod subjectset;
pub mod types;

pub use datastore::{Datastore, MemoryDatastore, ReadOnly};
pub use dispatch::{Dispatcher, ExpandNode, ExpandTree, Membership};
pub use engine::{CheckResponse, Engine, ExpandResponse};
pub use error::{Code, Error};
pub use subjectset::{
    BaseSubjectSet, CaveatExpression, FoundSubject, RelationReference, TrackingSubjectSet,
};
pub use types::*;
