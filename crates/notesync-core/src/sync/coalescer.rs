//! Edit coalescing
//!
//! Debounces bursts of edits into one remote update per note. Each note has
//! at most one pending timer; a new edit cancels it and starts over, and
//! only the latest full state is sent once the note has been quiet for the
//! whole window.
//!
//! The local collection is not touched here. Editors apply their changes
//! with [`SyncEngine::apply_local`] before handing them over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::SyncEngine;
use crate::models::Note;

/// Default inactivity window
pub const DEFAULT_EDIT_WINDOW: Duration = Duration::from_millis(1500);

struct PendingEdit {
    generation: u64,
    note: Note,
    timer: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingEdit>>>;

/// Held for reading by every send whose window has closed
type InFlight = Arc<RwLock<()>>;

/// Per-note debouncer in front of [`SyncEngine::confirm`]
pub struct EditCoalescer {
    engine: Arc<SyncEngine>,
    window: Duration,
    pending: PendingMap,
    in_flight: InFlight,
    next_generation: AtomicU64,
}

impl EditCoalescer {
    pub fn new(engine: Arc<SyncEngine>, window: Duration) -> Self {
        Self {
            engine,
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(RwLock::new(())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an edit and restart the note's window
    ///
    /// Drafts are ignored, since they cannot be updated. Returns whether
    /// the edit was queued.
    pub async fn edit(&self, note: Note) -> bool {
        let Some(id) = note.id().map(str::to_owned) else {
            debug!(title = %note.title, "Ignoring edit to unsaved draft");
            return false;
        };
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(&id) {
            previous.timer.abort();
        }

        let timer = tokio::spawn(fire_after(
            self.window,
            id.clone(),
            generation,
            self.pending.clone(),
            self.in_flight.clone(),
            self.engine.clone(),
        ));
        pending.insert(
            id,
            PendingEdit {
                generation,
                note,
                timer,
            },
        );
        true
    }

    /// Number of notes waiting for their window to close
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send every pending edit now
    ///
    /// Also waits for sends whose window already closed, so nothing is
    /// still on the wire when this returns.
    pub async fn flush(&self) {
        let drained: Vec<PendingEdit> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, edit)| edit).collect()
        };

        for edit in drained {
            edit.timer.abort();
            // Failures are logged and reported by the engine
            let _ = self.engine.confirm(&edit.note).await;
        }

        let _idle = self.in_flight.write().await;
    }
}

impl Drop for EditCoalescer {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_lock() {
            let mut dropped: Vec<String> = Vec::new();
            for (id, edit) in pending.drain() {
                edit.timer.abort();
                dropped.push(id);
            }
            if !dropped.is_empty() {
                dropped.sort();
                warn!(ids = ?dropped, "Dropping unsent edits");
            }
        }
    }
}

/// Wait out the window, then send the edit if it is still the latest
async fn fire_after(
    window: Duration,
    id: String,
    generation: u64,
    pending: PendingMap,
    in_flight: InFlight,
    engine: Arc<SyncEngine>,
) {
    tokio::time::sleep(window).await;

    // The read guard is taken before the entry leaves the map, so a flush
    // that no longer sees the entry still waits for this send.
    let sending = {
        let mut pending = pending.lock().await;
        match pending.get(&id) {
            Some(edit) if edit.generation == generation => {
                let guard = in_flight.read_owned().await;
                pending.remove(&id).map(|e| (e.note, guard))
            }
            _ => None,
        }
    };

    if let Some((note, _guard)) = sending {
        debug!(%id, "Sending coalesced edit");
        let _ = engine.confirm(&note).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::message::PushMessage;
    use crate::sync::testing::{note, MockNotesApi};
    use tokio::time::{sleep, Instant};

    fn setup(window: Duration) -> (Arc<MockNotesApi>, Arc<SyncEngine>, EditCoalescer) {
        let api = Arc::new(MockNotesApi::new());
        let engine = Arc::new(SyncEngine::new(api.clone()));
        engine.handle_message(PushMessage::Sync {
            notes: vec![note("a", "A"), note("b", "B")],
        });
        let coalescer = EditCoalescer::new(engine.clone(), window);
        (api, engine, coalescer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_only_last_edit() {
        let (api, _engine, coalescer) = setup(DEFAULT_EDIT_WINDOW);
        let start = Instant::now();

        assert!(coalescer.edit(note("a", "A").with_content("E1")).await);
        sleep(Duration::from_millis(500)).await;
        assert!(coalescer.edit(note("a", "A").with_content("E2")).await);

        // 1900ms: the window restarted at 500ms, nothing sent yet
        sleep(Duration::from_millis(1400)).await;
        assert!(api.update_calls().is_empty());
        assert_eq!(coalescer.pending_count().await, 1);

        sleep(Duration::from_millis(200)).await;
        let calls = api.update_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].note.content, "E2");
        assert!(calls[0].at - start >= Duration::from_millis(2000));
        assert_eq!(coalescer.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notes_are_coalesced_independently() {
        let (api, _engine, coalescer) = setup(Duration::from_millis(3000));

        coalescer.edit(note("a", "A").with_content("a1")).await;
        sleep(Duration::from_millis(1000)).await;
        coalescer.edit(note("b", "B").with_content("b1")).await;
        coalescer.edit(note("a", "A").with_content("a2")).await;

        sleep(Duration::from_millis(3500)).await;

        let mut sent: Vec<(String, String)> = api
            .update_calls()
            .into_iter()
            .map(|c| (c.id, c.note.content))
            .collect();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("a".to_string(), "a2".to_string()),
                ("b".to_string(), "b1".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_edits_each_send() {
        let (api, _engine, coalescer) = setup(Duration::from_millis(100));

        coalescer.edit(note("a", "A").with_content("one")).await;
        sleep(Duration::from_millis(150)).await;
        coalescer.edit(note("a", "A").with_content("two")).await;
        sleep(Duration::from_millis(150)).await;

        let contents: Vec<String> = api
            .update_calls()
            .into_iter()
            .map(|c| c.note.content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drafts_are_ignored() {
        let (api, _engine, coalescer) = setup(DEFAULT_EDIT_WINDOW);

        assert!(!coalescer.edit(Note::draft("unsaved")).await);
        assert_eq!(coalescer.pending_count().await, 0);

        sleep(Duration::from_secs(5)).await;
        assert!(api.update_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_sends_pending_immediately() {
        let (api, engine, coalescer) = setup(Duration::from_secs(60));

        let edited = note("a", "A").with_content("typed");
        assert!(engine.apply_local(&edited));
        coalescer.edit(edited).await;
        coalescer.flush().await;

        assert_eq!(api.update_calls().len(), 1);
        assert_eq!(coalescer.pending_count().await, 0);
        assert_eq!(engine.note("a").unwrap().updated_at.as_deref(), Some("rev-1"));

        // The aborted timer never fires a second call
        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.update_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_send_already_under_way() {
        let (api, _engine, coalescer) = setup(Duration::from_millis(100));
        let hold = api.hold_updates();

        coalescer.edit(note("a", "A").with_content("trailing")).await;
        sleep(Duration::from_millis(150)).await;

        // The window closed and the send is parked on the server
        assert_eq!(coalescer.pending_count().await, 0);
        assert!(api.update_calls().is_empty());

        let flush = coalescer.flush();
        tokio::pin!(flush);
        tokio::select! {
            biased;
            _ = &mut flush => panic!("flush returned before the trailing edit was sent"),
            _ = sleep(Duration::from_millis(50)) => {}
        }

        hold.release();
        flush.await;

        let calls = api.update_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].note.content, "trailing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_with_nothing_pending_returns() {
        let (api, _engine, coalescer) = setup(Duration::from_millis(100));

        tokio::time::timeout(Duration::from_millis(10), coalescer.flush())
            .await
            .expect("idle flush should not wait");
        assert!(api.update_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_discards_pending_edits() {
        let (api, _engine, coalescer) = setup(Duration::from_millis(100));

        coalescer.edit(note("a", "A").with_content("lost")).await;
        coalescer.edit(note("b", "B").with_content("lost too")).await;
        drop(coalescer);

        sleep(Duration::from_millis(500)).await;
        assert!(api.update_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_is_reported() {
        let (api, engine, coalescer) = setup(Duration::from_millis(100));
        let mut events = engine.subscribe_events();

        api.fail_next();
        coalescer.edit(note("a", "A").with_content("lost")).await;
        sleep(Duration::from_millis(200)).await;

        assert!(matches!(
            events.try_recv().unwrap(),
            crate::sync::SyncEvent::Failed { .. }
        ));
        assert_eq!(coalescer.pending_count().await, 0);
    }
}
