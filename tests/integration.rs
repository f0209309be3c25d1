//! End-to-end tests over the in-memory datastore.
//!
//! The fixture schema:
//!
//! ```text
//! definition user {}
//!
//! definition folder {
//!     relation viewer: user
//!     permission view = viewer
//! }
//!
//! definition document {
//!     relation parent: folder
//!     relation owner: user
//!     relation viewer: user
//!     permission view = viewer + owner + parent->view
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use warrant::schema::{
    AllowedRelation, NamespaceDefinition, Relation, RewriteChild, SchemaDefinition,
    UsersetRewrite,
};
use warrant::{
    Consistency, Engine, Error, MemoryDatastore, ObjectReference, Precondition, ReadOnly,
    RelationReference, Relationship, RelationshipFilter, RelationshipUpdate, Revision,
    SubjectReference,
};

fn object(namespace: &str, id: &str) -> ObjectReference {
    ObjectReference::new(namespace, id).unwrap()
}

fn user(id: &str) -> SubjectReference {
    SubjectReference::new(object("user", id), None::<String>).unwrap()
}

fn folder(id: &str) -> SubjectReference {
    SubjectReference::new(object("folder", id), None::<String>).unwrap()
}

fn computed(relation: &str) -> RewriteChild {
    RewriteChild::ComputedUserset(relation.into())
}

fn fixture_schema() -> Vec<SchemaDefinition> {
    vec![
        SchemaDefinition::Namespace(NamespaceDefinition::new("user")),
        SchemaDefinition::Namespace(
            NamespaceDefinition::new("folder")
                .with_relation(Relation::direct(
                    "viewer",
                    vec![AllowedRelation::terminal("user")],
                ))
                .with_relation(Relation::permission(
                    "view",
                    UsersetRewrite::union(vec![computed("viewer")]),
                )),
        ),
        SchemaDefinition::Namespace(
            NamespaceDefinition::new("document")
                .with_relation(Relation::direct(
                    "parent",
                    vec![AllowedRelation::terminal("folder")],
                ))
                .with_relation(Relation::direct(
                    "owner",
                    vec![AllowedRelation::terminal("user")],
                ))
                .with_relation(Relation::direct(
                    "viewer",
                    vec![AllowedRelation::terminal("user")],
                ))
                .with_relation(Relation::permission(
                    "view",
                    UsersetRewrite::union(vec![
                        computed("viewer"),
                        computed("owner"),
                        RewriteChild::TupleToUserset {
                            tupleset: "parent".into(),
                            computed: "view".into(),
                        },
                    ]),
                )),
        ),
    ]
}

const MASTERPLAN_VIEWERS: [&str; 7] = [
    "auditor", "cfo_assistant", "chief_financial_officer", "eng_lead", "legal",
    "product_manager", "vp_product",
];

async fn seeded_engine(store: MemoryDatastore) -> (Engine, Revision) {
    let engine = Engine::new(Arc::new(store));
    engine.write_schema(fixture_schema()).await.unwrap();

    let mut updates = vec![
        RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "owner",
            user("product_manager"),
        )),
        RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "parent",
            folder("plans"),
        )),
        RelationshipUpdate::create(Relationship::new(
            object("document", "healthplan"),
            "parent",
            folder("plans"),
        )),
        RelationshipUpdate::create(Relationship::new(
            object("folder", "plans"),
            "viewer",
            user("cfo"),
        )),
    ];
    for viewer in MASTERPLAN_VIEWERS {
        updates.push(RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "viewer",
            user(viewer),
        )));
    }
    let revision = engine.write_relationships(updates).await.unwrap();
    (engine, revision)
}

async fn engine() -> (Engine, Revision) {
    seeded_engine(MemoryDatastore::new()).await
}

// ── Check ─────────────────────────────────────────────────────

#[tokio::test]
async fn owner_check() {
    let (engine, revision) = engine().await;
    let masterplan = object("document", "masterplan");

    let response = engine
        .check_permission(&masterplan, "owner", &user("product_manager"))
        .at_revision(revision)
        .await
        .unwrap();
    assert!(response.is_member());
    assert_eq!(response.checked_at, revision);

    let response = engine
        .check_permission(&masterplan, "owner", &user("villain"))
        .at_revision(revision)
        .await
        .unwrap();
    assert!(!response.is_member());
}

#[tokio::test]
async fn view_through_parent_folder() {
    let (engine, revision) = engine().await;
    let response = engine
        .check_permission(&object("document", "masterplan"), "view", &user("cfo"))
        .at_revision(revision)
        .await
        .unwrap();
    assert!(response.is_member());
}

#[tokio::test]
async fn content_change_check_uses_head() {
    let (engine, _revision) = engine().await;
    let masterplan = object("document", "masterplan");

    let response = engine
        .content_change_check(&masterplan, "view", &user("product_manager"))
        .await
        .unwrap();
    assert!(response.is_member());

    // A write after the seed is visible immediately.
    engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            masterplan.clone(),
            "viewer",
            user("newcomer"),
        ))])
        .await
        .unwrap();
    let response = engine
        .content_change_check(&masterplan, "view", &user("newcomer"))
        .await
        .unwrap();
    assert!(response.is_member());
}

#[tokio::test]
async fn check_unknown_permission_fails() {
    let (engine, revision) = engine().await;
    let err = engine
        .check_permission(&object("document", "masterplan"), "annotate", &user("cfo"))
        .at_revision(revision)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));
}

// ── Read ──────────────────────────────────────────────────────

#[tokio::test]
async fn read_by_object_id_marker() {
    let (engine, revision) = engine().await;
    let filter = RelationshipFilter::new("document").object_id("healthplan");
    let mut stream = engine
        .read_relationships(filter)
        .at_revision(revision)
        .send()
        .await
        .unwrap();

    let mut found = Vec::new();
    while let Some(result) = stream.next().await {
        let item = result.unwrap();
        assert_eq!(item.read_at, revision);
        found.push(item.relationship);
    }
    assert_eq!(
        found,
        vec![Relationship::new(
            object("document", "healthplan"),
            "parent",
            folder("plans"),
        )]
    );
}

#[tokio::test]
async fn read_rejects_unmarked_filter_value() {
    let (engine, _revision) = engine().await;
    let mut filter = RelationshipFilter::new("document");
    filter.optional_object_id = Some("healthplan".into());
    let err = engine.read_relationships(filter).send().await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

// ── Write ─────────────────────────────────────────────────────

#[tokio::test]
async fn write_with_precondition_then_delete() {
    let (engine, _revision) = engine().await;
    let totallynew = Relationship::new(
        object("document", "totallynew"),
        "parent",
        folder("plans"),
    );

    let precondition = Precondition::must_exist(
        RelationshipFilter::new("document")
            .object_id("masterplan")
            .relation("owner")
            .subject(user("product_manager")),
    );
    let written = engine
        .write_relationships(vec![RelationshipUpdate::create(totallynew.clone())])
        .preconditions(vec![precondition])
        .await
        .unwrap();

    let filter = RelationshipFilter::new("document").object_id("totallynew");
    let found: Vec<_> = engine
        .read_relationships(filter.clone())
        .at_revision(written)
        .send()
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(found.len(), 1);

    engine
        .write_relationships(vec![RelationshipUpdate::delete(totallynew)])
        .await
        .unwrap();
    let found: Vec<_> = engine
        .read_relationships(filter)
        .send()
        .await
        .unwrap()
        .collect()
        .await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn missing_precondition_applies_nothing() {
    let (engine, _revision) = engine().await;
    let precondition = Precondition::must_exist(
        RelationshipFilter::new("document")
            .object_id("masterplan")
            .relation("owner")
            .subject(user("nobody")),
    );
    let err = engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "totallynew"),
            "parent",
            folder("plans"),
        ))])
        .preconditions(vec![precondition])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));

    let found: Vec<_> = engine
        .read_relationships(RelationshipFilter::new("document").object_id("totallynew"))
        .send()
        .await
        .unwrap()
        .collect()
        .await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn write_empty_updates_rejected() {
    let (engine, _revision) = engine().await;
    let err = engine.write_relationships(vec![]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn write_rejects_schema_violations() {
    let (engine, _revision) = engine().await;

    // Unknown relation.
    let err = engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "scribbler",
            user("alice"),
        ))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));

    // Writing to a permission.
    let err = engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "view",
            user("alice"),
        ))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));

    // Subject type the schema does not admit: a folder as a viewer.
    let err = engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "viewer",
            folder("plans"),
        ))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));
}

#[tokio::test]
async fn delete_relationships_by_filter() {
    let (engine, _revision) = engine().await;
    let deleted = engine
        .delete_relationships(
            RelationshipFilter::new("document")
                .object_id("masterplan")
                .relation("viewer"),
        )
        .await
        .unwrap();
    let remaining: Vec<_> = engine
        .read_relationships(
            RelationshipFilter::new("document")
                .object_id("masterplan")
                .relation("viewer"),
        )
        .at_revision(deleted)
        .send()
        .await
        .unwrap()
        .collect()
        .await;
    assert!(remaining.is_empty());
}

// ── Revisions ─────────────────────────────────────────────────

#[tokio::test]
async fn reads_outside_gc_window_fail() {
    let (engine, old) = seeded_engine(MemoryDatastore::with_gc_window(Duration::ZERO)).await;
    // Advance the head so the seed revision is no longer current.
    let head = engine
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "viewer",
            user("late_arrival"),
        ))])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;

    // Older than the window.
    let err = engine
        .read_relationships(RelationshipFilter::new("document"))
        .at_revision(old)
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfRange(_)));

    // Past the head.
    let future = Revision::from_token(format!("rev-{}", u64::MAX)).unwrap();
    let err = engine
        .read_relationships(RelationshipFilter::new("document"))
        .at_revision(future)
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutOfRange(_)));

    // The head itself stays readable.
    let found: Vec<_> = engine
        .read_relationships(RelationshipFilter::new("document"))
        .at_revision(head)
        .send()
        .await
        .unwrap()
        .collect()
        .await;
    assert!(!found.is_empty());
}

#[tokio::test]
async fn at_least_as_fresh_resolves_to_head() {
    let (engine, revision) = engine().await;
    let response = engine
        .check_permission(
            &object("document", "masterplan"),
            "view",
            &user("product_manager"),
        )
        .consistency(Consistency::AtLeastAsFresh(revision))
        .await
        .unwrap();
    assert!(response.is_member());
    assert!(response.checked_at >= revision);
}

// ── Expand ────────────────────────────────────────────────────

#[tokio::test]
async fn expand_viewer_has_seven_subjects() {
    let (engine, revision) = engine().await;
    let response = engine
        .expand_permission_tree(&object("document", "masterplan"), "viewer")
        .at_revision(revision)
        .await
        .unwrap();

    let subjects = response.tree.simplify();
    assert_eq!(subjects.subject_count(), 7);
    let users = subjects.get(&RelationReference::terminal("user")).unwrap();
    for viewer in MASTERPLAN_VIEWERS {
        assert!(users.get(viewer).is_some(), "missing viewer `{}`", viewer);
    }
}

#[tokio::test]
async fn expand_view_includes_indirect_subjects() {
    let (engine, revision) = engine().await;
    let response = engine
        .expand_permission_tree(&object("document", "masterplan"), "view")
        .at_revision(revision)
        .await
        .unwrap();
    let users = response
        .tree
        .simplify()
        .get(&RelationReference::terminal("user"))
        .cloned()
        .unwrap();
    // The folder viewer arrives through parent->view.
    assert!(users.get("cfo").is_some());
    assert!(users.get("product_manager").is_some());
}

#[tokio::test]
async fn expand_unknown_relation_fails() {
    let (engine, revision) = engine().await;
    let err = engine
        .expand_permission_tree(&object("document", "masterplan"), "annotate")
        .at_revision(revision)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FailedPrecondition(_)));
}

// ── Caveats ───────────────────────────────────────────────────

#[tokio::test]
async fn caveated_relationship_carries_expression_through_expand() {
    use std::collections::HashMap;
    use warrant::schema::CaveatDefinition;
    use warrant::subjectset::CaveatExpression;
    use warrant::CaveatReference;

    let engine = Engine::new(Arc::new(MemoryDatastore::new()));
    let mut parameters = HashMap::new();
    parameters.insert("day".to_string(), "string".to_string());
    engine
        .write_schema(vec![
            SchemaDefinition::Namespace(NamespaceDefinition::new("user")),
            SchemaDefinition::Caveat(CaveatDefinition::new(
                "on_tuesday",
                parameters,
                b"day == 'tuesday'".to_vec(),
            )),
            SchemaDefinition::Namespace(NamespaceDefinition::new("document").with_relation(
                Relation::direct(
                    "viewer",
                    vec![
                        AllowedRelation::terminal("user"),
                        AllowedRelation::terminal("user").with_caveat("on_tuesday"),
                    ],
                ),
            )),
        ])
        .await
        .unwrap();

    let caveated = Relationship::new(object("document", "plan"), "viewer", user("alice"))
        .with_caveat(CaveatReference::new("on_tuesday", HashMap::new()));
    let revision = engine
        .write_relationships(vec![RelationshipUpdate::create(caveated)])
        .await
        .unwrap();

    let response = engine
        .expand_permission_tree(&object("document", "plan"), "viewer")
        .at_revision(revision)
        .await
        .unwrap();
    let subjects = response.tree.simplify();
    let alice = subjects
        .get(&RelationReference::terminal("user"))
        .unwrap()
        .get("alice")
        .cloned()
        .unwrap();
    match alice.caveat_expression() {
        Some(CaveatExpression::Leaf(reference)) => assert_eq!(reference.name, "on_tuesday"),
        other => panic!("expected caveat leaf, got {:?}", other),
    }
    assert_eq!(alice.relationships().len(), 1);
}

// ── Read-only proxy ───────────────────────────────────────────

#[tokio::test]
async fn read_only_engine_serves_reads_and_rejects_writes() {
    let store = MemoryDatastore::new();
    let (engine, revision) = seeded_engine(store.clone()).await;
    drop(engine);

    let frozen = Engine::new(Arc::new(ReadOnly::new(store)));
    let response = frozen
        .check_permission(
            &object("document", "masterplan"),
            "view",
            &user("product_manager"),
        )
        .at_revision(revision)
        .await
        .unwrap();
    assert!(response.is_member());

    let err = frozen
        .write_relationships(vec![RelationshipUpdate::create(Relationship::new(
            object("document", "masterplan"),
            "viewer",
            user("intruder"),
        ))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadOnly { .. }));
}

// ── Schema round-trip ─────────────────────────────────────────

#[tokio::test]
async fn read_schema_emits_canonical_text() {
    use std::collections::HashMap;
    use warrant::schema::{CaveatEngine, CaveatOutcome, CompiledExpression};
    use warrant::ContextValue;

    struct TextCaveats;

    struct TextExpression(String);

    impl CompiledExpression for TextExpression {
        fn expr_string(&self) -> String {
            self.0.clone()
        }

        fn evaluate(
            &self,
            _context: &HashMap<String, ContextValue>,
        ) -> Result<CaveatOutcome, Error> {
            Ok(CaveatOutcome::Value(true))
        }

        fn serialize(&self) -> Vec<u8> {
            self.0.clone().into_bytes()
        }
    }

    impl CaveatEngine for TextCaveats {
        fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn CompiledExpression>, Error> {
            Ok(Box::new(TextExpression(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| Error::InvalidArgument("expression is not UTF-8".into()))?,
            )))
        }
    }

    let (engine, _revision) = engine().await;
    let (text, _read_at) = engine.read_schema(&TextCaveats).await.unwrap();
    assert!(text.contains("definition user {}"));
    assert!(text.contains("definition folder {"));
    assert!(text.contains("permission view = viewer + owner + parent->view"));
    assert!(text.contains("relation parent: folder"));
}

// ── Watch ─────────────────────────────────────────────────────

#[cfg(feature = "watch")]
#[tokio::test]
async fn watch_receives_updates() {
    let (engine, seeded) = engine().await;
    let mut stream = engine.watch(seeded);

    let written = Relationship::new(
        object("document", "masterplan"),
        "viewer",
        user("watcher"),
    );
    engine
        .write_relationships(vec![RelationshipUpdate::create(written.clone())])
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for watch event")
        .expect("stream ended")
        .expect("watch event error");
    assert_eq!(event.updates.len(), 1);
    assert_eq!(event.updates[0].relationship, written);
}
