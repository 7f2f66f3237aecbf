//! Synchronization engine
//!
//! Owns the canonical note collection and the server clock. Local intents
//! are applied optimistically and reconciled with the server's response;
//! push messages are folded into the same collection.
//!
//! Every mutation is a single synchronous closure on a `watch` sender, so
//! writes are totally ordered and never interleave, whichever task issues
//! them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::message::PushMessage;
use crate::error::{SyncError, SyncResult};
use crate::models::{parse_timestamp, Note, NoteCollection, NotePatch};
use crate::remote::NotesApi;

/// Remote operation that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The collection was replaced by a full load
    Reloaded { count: usize },
    /// A remote call failed
    Failed { operation: Operation, message: String },
}

/// The client-side synchronization engine
pub struct SyncEngine {
    api: Arc<dyn NotesApi>,
    notes: watch::Sender<NoteCollection>,
    clock: watch::Sender<Option<String>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create an engine with an empty collection
    pub fn new(api: Arc<dyn NotesApi>) -> Self {
        let (notes, _) = watch::channel(NoteCollection::new());
        let (clock, _) = watch::channel(None);
        let (events, _) = broadcast::channel(64);

        Self {
            api,
            notes,
            clock,
            events,
        }
    }

    /// Current collection snapshot
    pub fn notes(&self) -> NoteCollection {
        self.notes.borrow().clone()
    }

    /// Look up one note in the current snapshot
    pub fn note(&self, id: &str) -> Option<Note> {
        self.notes.borrow().get(id).cloned()
    }

    /// Subscribe to collection changes
    ///
    /// The receiver starts marked as changed, so the first `changed()`
    /// resolves immediately with the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<NoteCollection> {
        let mut rx = self.notes.subscribe();
        rx.mark_changed();
        rx
    }

    /// Latest server clock value
    pub fn clock(&self) -> Option<String> {
        self.clock.borrow().clone()
    }

    /// Latest server clock, parsed
    pub fn clock_time(&self) -> Option<DateTime<Utc>> {
        self.clock.borrow().as_deref().and_then(parse_timestamp)
    }

    /// Subscribe to clock ticks, replaying the current value first
    pub fn subscribe_clock(&self) -> watch::Receiver<Option<String>> {
        let mut rx = self.clock.subscribe();
        rx.mark_changed();
        rx
    }

    /// Subscribe to load and failure events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch every note and replace the local snapshot
    ///
    /// On failure the previous snapshot is kept as is.
    pub async fn load_all(&self) -> SyncResult<usize> {
        match self.api.list().await {
            Ok(list) => {
                let collection = NoteCollection::from_notes(list);
                let count = collection.len();
                self.notes.send_replace(collection);
                info!(count, "Loaded notes");
                self.emit(SyncEvent::Reloaded { count });
                Ok(count)
            }
            Err(e) => Err(self.fail(Operation::Load, e.into())),
        }
    }

    /// Create a note on the server
    ///
    /// Nothing is added locally until the server assigns an id; the returned
    /// note is then merged unless a push message already delivered it.
    pub async fn create(&self, draft: Note) -> SyncResult<Note> {
        let created = match self.api.create(&draft).await {
            Ok(note) => note,
            Err(e) => return Err(self.fail(Operation::Create, e.into())),
        };

        if created.is_draft() {
            return Err(self.fail(Operation::Create, SyncError::MissingId));
        }

        let inserted = self
            .notes
            .send_if_modified(|notes| notes.insert_if_absent(created.clone()));
        debug!(id = created.id(), inserted, "Created note");
        Ok(created)
    }

    /// Patch a note locally, then confirm it with the server
    ///
    /// The patch is visible to subscribers before the remote call starts. A
    /// failed call leaves the optimistic write in place.
    pub async fn update(&self, id: &str, patch: NotePatch) -> SyncResult<Note> {
        let id = require_id(id)?;

        let mut merged = None;
        self.notes.send_if_modified(|notes| match notes.get_mut(id) {
            Some(note) => {
                let changed = patch.apply_to(note);
                merged = Some(note.clone());
                changed
            }
            None => false,
        });

        let Some(local) = merged else {
            return Err(SyncError::UnknownNote(id.to_string()));
        };
        self.confirm(&local).await
    }

    /// Write a note's full state locally without contacting the server
    ///
    /// Used by editors ahead of the coalescer. Returns false for drafts and
    /// notes that are not in the collection.
    pub fn apply_local(&self, note: &Note) -> bool {
        if note.is_draft() {
            return false;
        }
        let mut known = false;
        self.notes.send_if_modified(|notes| {
            known = notes.contains(note.id().unwrap_or_default());
            notes.replace(note.clone())
        });
        known
    }

    /// Send a note's full state to the server and adopt the response
    ///
    /// The server's copy replaces the local entry, unless the note was
    /// removed in the meantime.
    pub async fn confirm(&self, note: &Note) -> SyncResult<Note> {
        let Some(id) = note.id() else {
            return Err(SyncError::MissingId);
        };

        let mut confirmed = match self.api.update(id, note).await {
            Ok(confirmed) => confirmed,
            Err(e) => return Err(self.fail(Operation::Update, e.into())),
        };
        if confirmed.is_draft() {
            confirmed.id = Some(id.to_string());
        }

        self.notes
            .send_if_modified(|notes| notes.replace(confirmed.clone()));
        Ok(confirmed)
    }

    /// Remove a note locally, then delete it on the server
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let id = require_id(id)?;

        self.notes
            .send_if_modified(|notes| notes.remove(id).is_some());

        self.api
            .delete(id)
            .await
            .map_err(|e| self.fail(Operation::Delete, e.into()))
    }

    /// Apply one push-channel message
    pub fn handle_message(&self, message: PushMessage) {
        debug!(action = message.action(), "Applying push message");
        match message {
            PushMessage::Sync { notes } => {
                self.notes.send_replace(NoteCollection::from_notes(notes));
            }
            PushMessage::Create { note } => {
                self.notes
                    .send_if_modified(|notes| notes.insert_if_absent(note));
            }
            PushMessage::Update { note } => {
                self.notes
                    .send_if_modified(|notes| notes.apply_patch(&note.id, &note.changes));
            }
            PushMessage::Delete { note } => {
                self.notes
                    .send_if_modified(|notes| notes.remove(&note.id).is_some());
            }
            PushMessage::Tick { now } => {
                self.clock.send_replace(Some(now));
            }
        }
    }

    /// Decode a raw push payload and apply it
    ///
    /// Malformed payloads are logged and dropped. Returns whether the
    /// payload was applied.
    pub fn handle_text(&self, text: &str) -> bool {
        match PushMessage::decode(text) {
            Ok(message) => {
                self.handle_message(message);
                true
            }
            Err(e) => {
                warn!(error = %e, "Dropping push message");
                false
            }
        }
    }

    fn fail(&self, operation: Operation, error: SyncError) -> SyncError {
        warn!(%operation, error = %error, "Remote call failed");
        self.emit(SyncEvent::Failed {
            operation,
            message: error.to_string(),
        });
        error
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn require_id(id: &str) -> SyncResult<&str> {
    if id.is_empty() {
        Err(SyncError::MissingId)
    } else {
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteStatus;
    use crate::sync::message::NoteRef;
    use crate::sync::testing::{note, MockNotesApi};

    fn engine_with(api: &Arc<MockNotesApi>) -> SyncEngine {
        SyncEngine::new(api.clone())
    }

    fn sync_message(notes: Vec<Note>) -> PushMessage {
        PushMessage::Sync { notes }
    }

    #[tokio::test]
    async fn test_load_all_replaces_snapshot() {
        let api = Arc::new(MockNotesApi::with_notes(vec![note("a", "A"), note("b", "B")]));
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("stale", "old")]));

        assert_eq!(engine.load_all().await.unwrap(), 2);
        let notes = engine.notes();
        assert_eq!(notes.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_load_all_failure_keeps_snapshot() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        let mut events = engine.subscribe_events();
        engine.handle_message(sync_message(vec![note("a", "A")]));

        api.fail_next();
        assert!(engine.load_all().await.is_err());

        assert_eq!(engine.notes().len(), 1);
        assert!(engine.notes().contains("a"));
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::Failed {
                operation: Operation::Load,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_inserts_exactly_once() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);

        let draft = Note::draft("x").with_content("y").with_priority(1);
        let created = engine.create(draft).await.unwrap();
        assert_eq!(created.id(), Some("n1"));

        // Push echo of the same creation
        engine.handle_message(PushMessage::Create {
            note: created.clone(),
        });

        let notes = engine.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes.get("n1").unwrap().title, "x");
        assert!(notes.iter().all(|n| !n.is_draft()));
    }

    #[tokio::test]
    async fn test_create_after_push_does_not_duplicate() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);

        // The broadcast can beat the direct response
        engine.handle_message(PushMessage::Create {
            note: note("n1", "from push"),
        });
        engine.create(Note::draft("x")).await.unwrap();

        let notes = engine.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes.get("n1").unwrap().title, "from push");
    }

    #[tokio::test]
    async fn test_create_failure_leaves_collection_untouched() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        let mut rx = engine.subscribe();
        rx.borrow_and_update();

        api.fail_next();
        let err = engine.create(Note::draft("x")).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));

        assert!(engine.notes().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_update_is_optimistic_then_authoritative() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A")]));

        let mut rx = engine.subscribe();
        rx.borrow_and_update();

        let hold = api.hold_updates();
        let pending = {
            let engine = &engine;
            async move {
                engine
                    .update("a", NotePatch::default().status(NoteStatus::Hold))
                    .await
            }
        };
        tokio::pin!(pending);

        // Drive the update until it blocks on the server
        tokio::select! {
            biased;
            _ = &mut pending => panic!("update finished before the server answered"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(rx.has_changed().unwrap());
        assert_eq!(engine.note("a").unwrap().status, NoteStatus::Hold);
        assert!(engine.note("a").unwrap().updated_at.is_none());

        hold.release();
        let confirmed = pending.await.unwrap();
        assert_eq!(confirmed.updated_at.as_deref(), Some("rev-1"));
        assert_eq!(engine.note("a").unwrap(), confirmed);
    }

    #[tokio::test]
    async fn test_final_state_is_last_confirmed() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A")]));

        let mut last = None;
        for i in 0..5 {
            let patch = NotePatch::default()
                .content(format!("draft {}", i))
                .priority(i);
            last = Some(engine.update("a", patch).await.unwrap());
        }

        let last = last.unwrap();
        assert_eq!(last.updated_at.as_deref(), Some("rev-5"));
        assert_eq!(engine.note("a").unwrap(), last);
        assert_eq!(api.update_calls().len(), 5);
    }

    #[tokio::test]
    async fn test_update_failure_keeps_optimistic_write() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A")]));

        api.fail_next();
        let err = engine
            .update("a", NotePatch::default().title("renamed"))
            .await
            .unwrap_err();

        assert!(err.needs_reload());
        assert_eq!(engine.note("a").unwrap().title, "renamed");
    }

    #[tokio::test]
    async fn test_update_requires_known_id() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);

        assert!(matches!(
            engine.update("", NotePatch::default().title("t")).await,
            Err(SyncError::MissingId)
        ));
        assert!(matches!(
            engine.update("ghost", NotePatch::default().title("t")).await,
            Err(SyncError::UnknownNote(_))
        ));
        assert!(api.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_after_delete_does_not_resurrect() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A")]));

        let stale = engine.note("a").unwrap();
        engine.handle_message(PushMessage::Delete {
            note: NoteRef { id: "a".into() },
        });
        engine.confirm(&stale).await.unwrap();

        assert!(engine.notes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_optimistic() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A"), note("b", "B")]));

        api.fail_next();
        let err = engine.delete("a").await.unwrap_err();
        assert!(err.needs_reload());
        assert!(!engine.notes().contains("a"));

        engine.delete("b").await.unwrap();
        assert!(engine.notes().is_empty());
        assert_eq!(api.delete_calls(), vec!["a".to_string(), "b".to_string()]);

        assert!(matches!(engine.delete("").await, Err(SyncError::MissingId)));
    }

    #[tokio::test]
    async fn test_apply_local_skips_drafts_and_unknown() {
        let api = Arc::new(MockNotesApi::new());
        let engine = engine_with(&api);
        engine.handle_message(sync_message(vec![note("a", "A")]));

        assert!(!engine.apply_local(&Note::draft("draft")));
        assert!(!engine.apply_local(&note("ghost", "G")));
        assert!(engine.apply_local(&note("a", "A").with_content("typing")));

        assert_eq!(engine.notes().len(), 1);
        assert_eq!(engine.note("a").unwrap().content, "typing");
        assert!(api.update_calls().is_empty());
    }

    #[test]
    fn test_push_create_is_idempotent() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        let message = PushMessage::Create {
            note: note("a", "A"),
        };

        engine.handle_message(message.clone());
        engine.handle_message(message);

        assert_eq!(engine.notes().len(), 1);
    }

    #[test]
    fn test_push_unknown_id_is_noop() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        engine.handle_message(sync_message(vec![note("a", "A"), note("b", "B")]));
        let before = engine.notes();
        let mut rx = engine.subscribe();
        rx.borrow_and_update();

        assert!(engine.handle_text(r#"{"action":"update","note":{"id":"zzz","title":"x"}}"#));
        assert!(engine.handle_text(r#"{"action":"delete","note":{"id":"zzz"}}"#));

        assert_eq!(engine.notes(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_push_update_merges_fields() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        engine.handle_message(sync_message(vec![note("a", "A").with_content("body")]));

        engine.handle_text(r#"{"action":"update","note":{"id":"a","priority":7}}"#);

        let a = engine.note("a").unwrap();
        assert_eq!(a.priority, 7);
        assert_eq!(a.title, "A");
        assert_eq!(a.content, "body");
    }

    #[test]
    fn test_push_sync_replaces_everything() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        engine.handle_message(sync_message(vec![note("a", "A"), note("b", "B")]));

        engine.handle_message(sync_message(vec![note("c", "C")]));

        let notes = engine.notes();
        assert_eq!(notes.ids().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_push_malformed_is_dropped() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        engine.handle_message(sync_message(vec![note("a", "A")]));

        assert!(!engine.handle_text("{not json"));
        assert!(!engine.handle_text(r#"{"action":"sync"}"#));
        assert!(!engine.handle_text(r#"{"action":"create","note":{"title":"no id"}}"#));

        assert_eq!(engine.notes().ids().collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_tick_updates_clock() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        let mut clock = engine.subscribe_clock();
        assert!(clock.has_changed().unwrap());
        assert_eq!(*clock.borrow_and_update(), None);

        engine.handle_text(r#"{"action":"tick","now":"2024-05-01T10:00:00"}"#);

        clock.changed().await.unwrap();
        assert_eq!(clock.borrow().as_deref(), Some("2024-05-01T10:00:00"));
        assert_eq!(engine.clock_time(), parse_timestamp("2024-05-01T10:00:00Z"));
        assert!(engine.notes().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_replays_current_value() {
        let engine = SyncEngine::new(Arc::new(MockNotesApi::new()));
        engine.handle_message(sync_message(vec![note("a", "A")]));

        let mut rx = engine.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
