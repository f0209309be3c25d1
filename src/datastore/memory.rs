//! In-memory datastore with MVCC rows and revision history.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::datastore::{Datastore, RelationshipIter};
#[cfg(feature = "watch")]
use crate::datastore::WatchStream;
use crate::error::Error;
use crate::schema::{CaveatDefinition, NamespaceDefinition};
#[cfg(feature = "watch")]
use crate::types::WatchEvent;
use crate::types::{
    Operation, Precondition, PreconditionOp, Relationship, RelationshipFilter,
    RelationshipUpdate, Revision, SubjectReference, ELLIPSIS,
};

const DEFAULT_GC_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
#[cfg(feature = "watch")]
const WATCH_CHANNEL_CAPACITY: usize = 1024;

struct TupleRow {
    relationship: Relationship,
    created: u64,
    deleted: Option<u64>,
}

impl TupleRow {
    fn live_at(&self, revision: u64) -> bool {
        self.created <= revision && self.deleted.map_or(true, |deleted| deleted > revision)
    }
}

struct DefinitionRow<T> {
    definition: Arc<T>,
    created: u64,
    deleted: Option<u64>,
}

impl<T> DefinitionRow<T> {
    fn live_at(&self, revision: u64) -> bool {
        self.created <= revision && self.deleted.map_or(true, |deleted| deleted > revision)
    }
}

struct State {
    head: u64,
    revision_times: HashMap<u64, Instant>,
    tuples: Vec<TupleRow>,
    namespaces: Vec<DefinitionRow<NamespaceDefinition>>,
    caveats: Vec<DefinitionRow<CaveatDefinition>>,
    #[cfg(feature = "watch")]
    changelog: Vec<WatchEvent>,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.head += 1;
        self.revision_times.insert(self.head, Instant::now());
        self.head
    }
}

/// An in-memory [`Datastore`].
///
/// Rows are multi-versioned: every mutation stamps a new revision, and reads
/// at older revisions see the data as of that snapshot, until the revision
/// ages out of the configured garbage-collection window.
///
/// `MemoryDatastore` is cheap to clone — clones share the same state.
#[derive(Clone)]
pub struct MemoryDatastore {
    state: Arc<RwLock<State>>,
    gc_window: Duration,
    #[cfg(feature = "watch")]
    changes: tokio::sync::broadcast::Sender<WatchEvent>,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    /// Creates an empty store with the default 24-hour GC window.
    pub fn new() -> Self {
        Self::with_gc_window(DEFAULT_GC_WINDOW)
    }

    /// Creates an empty store with the given GC window. A zero window makes
    /// every revision but the head unreadable, which is useful for testing
    /// out-of-range handling.
    pub fn with_gc_window(gc_window: Duration) -> Self {
        let mut revision_times = HashMap::new();
        revision_times.insert(0, Instant::now());
        Self {
            state: Arc::new(RwLock::new(State {
                head: 0,
                revision_times,
                tuples: Vec::new(),
                namespaces: Vec::new(),
                caveats: Vec::new(),
                #[cfg(feature = "watch")]
                changelog: Vec::new(),
            })),
            gc_window,
            #[cfg(feature = "watch")]
            changes: tokio::sync::broadcast::channel(WATCH_CHANNEL_CAPACITY).0,
        }
    }

    fn check_readable(&self, state: &State, revision: Revision) -> Result<(), Error> {
        let sequence = revision.sequence();
        if sequence > state.head {
            return Err(Error::OutOfRange(format!(
                "revision {} is newer than the head",
                revision
            )));
        }
        if sequence == state.head {
            return Ok(());
        }
        match state.revision_times.get(&sequence) {
            Some(stamped) if stamped.elapsed() <= self.gc_window => Ok(()),
            _ => Err(Error::OutOfRange(format!(
                "revision {} is older than the garbage-collection window",
                revision
            ))),
        }
    }

    fn collect(
        &self,
        state: &State,
        revision: u64,
        predicate: impl Fn(&Relationship) -> bool,
    ) -> Vec<Relationship> {
        state
            .tuples
            .iter()
            .filter(|row| row.live_at(revision) && predicate(&row.relationship))
            .map(|row| row.relationship.clone())
            .collect()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn head_revision(&self) -> Result<Revision, Error> {
        Ok(Revision::new(self.state.read().head))
    }

    async fn sync_revision(&self) -> Result<Revision, Error> {
        // A local store never lags its own head.
        Ok(Revision::new(self.state.read().head))
    }

    async fn check_revision(&self, revision: Revision) -> Result<(), Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)
    }

    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<NamespaceDefinition>, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        state
            .namespaces
            .iter()
            .find(|row| row.live_at(revision.sequence()) && row.definition.name == name)
            .map(|row| Arc::clone(&row.definition))
            .ok_or_else(|| {
                Error::FailedPrecondition(format!("namespace `{}` not found", name))
            })
    }

    async fn write_namespace(&self, definition: NamespaceDefinition) -> Result<Revision, Error> {
        definition.validate()?;
        let mut state = self.state.write();
        let revision = state.bump();
        for row in &mut state.namespaces {
            if row.deleted.is_none() && row.definition.name == definition.name {
                row.deleted = Some(revision);
            }
        }
        info!(namespace = %definition.name, %revision, "wrote namespace definition");
        state.namespaces.push(DefinitionRow {
            definition: Arc::new(definition),
            created: revision,
            deleted: None,
        });
        Ok(Revision::new(revision))
    }

    async fn delete_namespace(&self, name: &str) -> Result<Revision, Error> {
        let mut state = self.state.write();
        let head = state.head;
        let found = state
            .namespaces
            .iter()
            .any(|row| row.live_at(head) && row.definition.name == name);
        if !found {
            return Err(Error::FailedPrecondition(format!(
                "namespace `{}` not found",
                name
            )));
        }
        let revision = state.bump();
        for row in &mut state.namespaces {
            if row.deleted.is_none() && row.definition.name == name {
                row.deleted = Some(revision);
            }
        }
        info!(namespace = %name, %revision, "deleted namespace definition");
        Ok(Revision::new(revision))
    }

    async fn list_namespaces(
        &self,
        revision: Revision,
    ) -> Result<Vec<Arc<NamespaceDefinition>>, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        Ok(state
            .namespaces
            .iter()
            .filter(|row| row.live_at(revision.sequence()))
            .map(|row| Arc::clone(&row.definition))
            .collect())
    }

    async fn read_caveat(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<Arc<CaveatDefinition>, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        state
            .caveats
            .iter()
            .find(|row| row.live_at(revision.sequence()) && row.definition.name == name)
            .map(|row| Arc::clone(&row.definition))
            .ok_or_else(|| Error::FailedPrecondition(format!("caveat `{}` not found", name)))
    }

    async fn list_caveats(
        &self,
        revision: Revision,
    ) -> Result<Vec<Arc<CaveatDefinition>>, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        Ok(state
            .caveats
            .iter()
            .filter(|row| row.live_at(revision.sequence()))
            .map(|row| Arc::clone(&row.definition))
            .collect())
    }

    async fn write_schema(
        &self,
        namespaces: Vec<NamespaceDefinition>,
        caveats: Vec<CaveatDefinition>,
    ) -> Result<Revision, Error> {
        for namespace in &namespaces {
            namespace.validate()?;
        }
        for caveat in &caveats {
            caveat.validate()?;
        }

        let mut state = self.state.write();
        let revision = state.bump();
        // WriteSchema replaces the whole schema at one revision.
        for row in &mut state.namespaces {
            if row.deleted.is_none() {
                row.deleted = Some(revision);
            }
        }
        for row in &mut state.caveats {
            if row.deleted.is_none() {
                row.deleted = Some(revision);
            }
        }
        info!(
            namespaces = namespaces.len(),
            caveats = caveats.len(),
            %revision,
            "wrote schema"
        );
        for definition in namespaces {
            state.namespaces.push(DefinitionRow {
                definition: Arc::new(definition),
                created: revision,
                deleted: None,
            });
        }
        for definition in caveats {
            state.caveats.push(DefinitionRow {
                definition: Arc::new(definition),
                created: revision,
                deleted: None,
            });
        }
        Ok(Revision::new(revision))
    }

    async fn query_relationships(
        &self,
        filter: &RelationshipFilter,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        filter.validate()?;
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        let items = self.collect(&state, revision.sequence(), |relationship| {
            filter.matches(relationship)
        });
        debug!(filter = ?filter, count = items.len(), "queried relationships");
        Ok(Box::new(items.into_iter()))
    }

    async fn reverse_query_from_subject(
        &self,
        subject: &SubjectReference,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        let subject = subject.clone();
        let items = self.collect(&state, revision.sequence(), |relationship| {
            relationship.subject == subject
        });
        Ok(Box::new(items.into_iter()))
    }

    async fn reverse_query_from_subject_relation(
        &self,
        namespace: &str,
        relation: &str,
        revision: Revision,
    ) -> Result<RelationshipIter, Error> {
        let state = self.state.read();
        self.check_readable(&state, revision)?;
        let wanted_relation = (relation != ELLIPSIS).then(|| relation.to_string());
        let items = self.collect(&state, revision.sequence(), |relationship| {
            relationship.subject.object().namespace() == namespace
                && relationship.subject.optional_relation() == wanted_relation.as_deref()
        });
        Ok(Box::new(items.into_iter()))
    }

    async fn write_relationships(
        &self,
        preconditions: &[Precondition],
        updates: &[RelationshipUpdate],
    ) -> Result<Revision, Error> {
        let mut state = self.state.write();
        let head = state.head;

        for precondition in preconditions {
            precondition.filter.validate()?;
            let matched = state.tuples.iter().any(|row| {
                row.live_at(head) && precondition.filter.matches(&row.relationship)
            });
            match precondition.operation {
                PreconditionOp::MustExist if !matched => {
                    return Err(Error::FailedPrecondition(format!(
                        "precondition not satisfied: no relationship matches filter on `{}`",
                        precondition.filter.namespace
                    )));
                }
                PreconditionOp::MustNotExist if matched => {
                    return Err(Error::FailedPrecondition(format!(
                        "precondition not satisfied: a relationship matches filter on `{}`",
                        precondition.filter.namespace
                    )));
                }
                _ => {}
            }
        }

        // Validate every CREATE before mutating anything.
        for (index, update) in updates.iter().enumerate() {
            if update.operation != Operation::Create {
                continue;
            }
            let key = update.relationship.key();
            let exists_live = state
                .tuples
                .iter()
                .any(|row| row.live_at(head) && row.relationship.key() == key);
            let duplicated_in_batch = updates[..index].iter().any(|prior| {
                prior.operation != Operation::Delete && prior.relationship.key() == key
            });
            if exists_live || duplicated_in_batch {
                return Err(Error::FailedPrecondition(format!(
                    "relationship `{}` already exists",
                    update.relationship
                )));
            }
        }

        let revision = state.bump();
        for update in updates {
            let key_owner = update.relationship.clone();
            let key = key_owner.key();
            match update.operation {
                Operation::Create => {
                    state.tuples.push(TupleRow {
                        relationship: update.relationship.clone(),
                        created: revision,
                        deleted: None,
                    });
                }
                Operation::Touch => {
                    for row in &mut state.tuples {
                        if row.deleted.is_none() && row.relationship.key() == key {
                            row.deleted = Some(revision);
                        }
                    }
                    state.tuples.push(TupleRow {
                        relationship: update.relationship.clone(),
                        created: revision,
                        deleted: None,
                    });
                }
                Operation::Delete => {
                    for row in &mut state.tuples {
                        if row.deleted.is_none() && row.relationship.key() == key {
                            row.deleted = Some(revision);
                        }
                    }
                }
            }
        }
        info!(updates = updates.len(), %revision, "applied relationship updates");

        #[cfg(feature = "watch")]
        {
            let event = WatchEvent {
                updates: updates.to_vec(),
                checkpoint: Revision::new(revision),
            };
            state.changelog.push(event.clone());
            let _ = self.changes.send(event);
        }

        Ok(Revision::new(revision))
    }

    #[cfg(feature = "watch")]
    fn watch(&self, after: Revision) -> WatchStream {
        // Subscribe before snapshotting the backlog so nothing is missed;
        // the checkpoint guard below drops the overlap.
        let mut receiver = self.changes.subscribe();
        let backlog: Vec<WatchEvent> = {
            let state = self.state.read();
            state
                .changelog
                .iter()
                .filter(|event| event.checkpoint > after)
                .cloned()
                .collect()
        };
        let mut last = backlog.last().map(|event| event.checkpoint).unwrap_or(after);

        Box::pin(async_stream::stream! {
            for event in backlog {
                yield Ok(event);
            }
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.checkpoint > last {
                            last = event.checkpoint;
                            yield Ok(event);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(Error::internal(format!(
                            "watch stream lagged by {} events",
                            skipped
                        )));
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectReference;

    fn store() -> MemoryDatastore {
        MemoryDatastore::new()
    }

    fn rel(resource_id: &str, relation: &str, user: &str) -> Relationship {
        Relationship::new(
            ObjectReference::new("document", resource_id).unwrap(),
            relation,
            SubjectReference::new(ObjectReference::new("user", user).unwrap(), None::<String>)
                .unwrap(),
        )
    }

    async fn read_all(store: &MemoryDatastore, filter: RelationshipFilter) -> Vec<Relationship> {
        let revision = store.head_revision().await.unwrap();
        store
            .query_relationships(&filter, revision)
            .await
            .unwrap()
            .collect()
    }

    #[tokio::test]
    async fn write_and_query() {
        let store = store();
        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        let found = read_all(&store, RelationshipFilter::new("document")).await;
        assert_eq!(found, vec![rel("plan", "viewer", "alice")]);
    }

    #[tokio::test]
    async fn create_duplicate_fails() {
        let store = store();
        let update = RelationshipUpdate::create(rel("plan", "viewer", "alice"));
        store.write_relationships(&[], &[update.clone()]).await.unwrap();
        let err = store
            .write_relationships(&[], &[update])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn create_duplicate_within_batch_fails() {
        let store = store();
        let update = RelationshipUpdate::create(rel("plan", "viewer", "alice"));
        let err = store
            .write_relationships(&[], &[update.clone(), update])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn touch_upserts() {
        let store = store();
        let update = RelationshipUpdate::touch(rel("plan", "viewer", "alice"));
        store.write_relationships(&[], &[update.clone()]).await.unwrap();
        store.write_relationships(&[], &[update]).await.unwrap();
        let found = read_all(&store, RelationshipFilter::new("document")).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store();
        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        store
            .write_relationships(&[], &[RelationshipUpdate::delete(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        assert!(read_all(&store, RelationshipFilter::new("document")).await.is_empty());
        // Deleting again is a no-op.
        store
            .write_relationships(&[], &[RelationshipUpdate::delete(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_precondition_applies_nothing() {
        let store = store();
        let precondition = Precondition::must_exist(
            RelationshipFilter::new("document").object_id("missing"),
        );
        let err = store
            .write_relationships(
                &[precondition],
                &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
        assert!(read_all(&store, RelationshipFilter::new("document")).await.is_empty());
    }

    #[tokio::test]
    async fn must_not_exist_precondition() {
        let store = store();
        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        let precondition = Precondition::must_not_exist(
            RelationshipFilter::new("document").object_id("plan"),
        );
        let err = store
            .write_relationships(
                &[precondition],
                &[RelationshipUpdate::create(rel("plan", "viewer", "bob"))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn snapshot_reads_see_old_data() {
        let store = store();
        let before = store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        store
            .write_relationships(&[], &[RelationshipUpdate::delete(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();

        let at_before: Vec<Relationship> = store
            .query_relationships(&RelationshipFilter::new("document"), before)
            .await
            .unwrap()
            .collect();
        assert_eq!(at_before.len(), 1);
        assert!(read_all(&store, RelationshipFilter::new("document")).await.is_empty());
    }

    #[tokio::test]
    async fn revision_past_head_is_out_of_range() {
        let store = store();
        let err = store.check_revision(Revision::new(99)).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
    }

    #[tokio::test]
    async fn revision_outside_gc_window_is_out_of_range() {
        let store = MemoryDatastore::with_gc_window(Duration::ZERO);
        let old = store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();
        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "bob"))])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        // With a zero window only the head stays readable.
        let err = store.check_revision(old).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange(_)));
        let head = store.head_revision().await.unwrap();
        store.check_revision(head).await.unwrap();
    }

    #[tokio::test]
    async fn namespace_roundtrip() {
        use crate::schema::{AllowedRelation, Relation};
        let store = store();
        let definition = NamespaceDefinition::new("document").with_relation(Relation::direct(
            "viewer",
            vec![AllowedRelation::terminal("user")],
        ));
        let revision = store.write_namespace(definition.clone()).await.unwrap();
        let read = store.read_namespace("document", revision).await.unwrap();
        assert_eq!(*read, definition);

        store.delete_namespace("document").await.unwrap();
        let head = store.head_revision().await.unwrap();
        let err = store.read_namespace("document", head).await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
        // Still visible at the pre-delete revision.
        assert!(store.read_namespace("document", revision).await.is_ok());
    }

    #[tokio::test]
    async fn delete_unknown_namespace_fails() {
        let store = store();
        let err = store.delete_namespace("ghost").await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn write_schema_replaces_everything() {
        let store = store();
        store
            .write_namespace(NamespaceDefinition::new("stale"))
            .await
            .unwrap();
        let revision = store
            .write_schema(
                vec![
                    NamespaceDefinition::new("user"),
                    NamespaceDefinition::new("document"),
                ],
                vec![],
            )
            .await
            .unwrap();
        let names: Vec<String> = store
            .list_namespaces(revision)
            .await
            .unwrap()
            .iter()
            .map(|definition| definition.name.clone())
            .collect();
        assert_eq!(names, vec!["user".to_string(), "document".to_string()]);
    }

    #[tokio::test]
    async fn reverse_queries() {
        let store = store();
        let userset = Relationship::new(
            ObjectReference::new("document", "plan").unwrap(),
            "viewer",
            SubjectReference::new(
                ObjectReference::new("group", "eng").unwrap(),
                Some("member"),
            )
            .unwrap(),
        );
        store
            .write_relationships(
                &[],
                &[
                    RelationshipUpdate::create(rel("plan", "viewer", "alice")),
                    RelationshipUpdate::create(userset.clone()),
                ],
            )
            .await
            .unwrap();
        let revision = store.head_revision().await.unwrap();

        let subject = SubjectReference::new(
            ObjectReference::new("user", "alice").unwrap(),
            None::<String>,
        )
        .unwrap();
        let from_subject: Vec<Relationship> = store
            .reverse_query_from_subject(&subject, revision)
            .await
            .unwrap()
            .collect();
        assert_eq!(from_subject.len(), 1);

        let from_relation: Vec<Relationship> = store
            .reverse_query_from_subject_relation("group", "member", revision)
            .await
            .unwrap()
            .collect();
        assert_eq!(from_relation, vec![userset]);

        let terminals: Vec<Relationship> = store
            .reverse_query_from_subject_relation("user", ELLIPSIS, revision)
            .await
            .unwrap()
            .collect();
        assert_eq!(terminals.len(), 1);
    }

    #[cfg(feature = "watch")]
    #[tokio::test]
    async fn watch_replays_and_follows() {
        use tokio_stream::StreamExt;

        let store = store();
        let start = store.head_revision().await.unwrap();
        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "alice"))])
            .await
            .unwrap();

        let mut stream = store.watch(start);
        let replayed = stream.next().await.unwrap().unwrap();
        assert_eq!(replayed.updates.len(), 1);

        store
            .write_relationships(&[], &[RelationshipUpdate::create(rel("plan", "viewer", "bob"))])
            .await
            .unwrap();
        let live = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timed out waiting for watch event")
            .unwrap()
            .unwrap();
        assert_eq!(live.updates[0].relationship, rel("plan", "viewer", "bob"));
    }
}
