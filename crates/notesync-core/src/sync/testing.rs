//! In-memory notes server used by the sync tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{RemoteError, RemoteResult};
use crate::models::Note;
use crate::remote::NotesApi;

/// A confirmed note with the given id and title
pub(crate) fn note(id: &str, title: &str) -> Note {
    Note {
        id: Some(id.to_string()),
        ..Note::draft(title)
    }
}

/// One update call as the server saw it
#[derive(Debug, Clone)]
pub(crate) struct UpdateCall {
    pub id: String,
    pub note: Note,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    notes: Vec<Note>,
    next_id: u64,
    revision: u64,
    fail_next: bool,
    list_calls: usize,
    updates: Vec<UpdateCall>,
    deletes: Vec<String>,
}

impl MockState {
    fn take_failure(&mut self) -> RemoteResult<()> {
        if std::mem::take(&mut self.fail_next) {
            Err(RemoteError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Releases updates held by [`MockNotesApi::hold_updates`]
pub(crate) struct UpdateGate(Arc<Notify>);

impl UpdateGate {
    pub fn release(&self) {
        self.0.notify_one();
    }
}

/// Fake remote authority
///
/// Assigns ids `n1`, `n2`, ... on create and stamps every confirmed update
/// with `updated_at = "rev-N"`.
#[derive(Default)]
pub(crate) struct MockNotesApi {
    state: Mutex<MockState>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockNotesApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        let api = Self::new();
        api.state.lock().unwrap().notes = notes;
        api
    }

    /// Make the next call fail with a 503
    pub fn fail_next(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    /// Block update calls until the returned gate is released
    pub fn hold_updates(&self) -> UpdateGate {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        UpdateGate(notify)
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl NotesApi for MockNotesApi {
    async fn list(&self) -> RemoteResult<Vec<Note>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        state.take_failure()?;
        Ok(state.notes.clone())
    }

    async fn create(&self, note: &Note) -> RemoteResult<Note> {
        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state.next_id += 1;
        let created = Note {
            id: Some(format!("n{}", state.next_id)),
            reminder_time: note.reminder_time.clone().filter(|r| !r.is_empty()),
            created_at: Some("rev-0".to_string()),
            updated_at: Some("rev-0".to_string()),
            ..note.clone()
        };
        state.notes.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, note: &Note) -> RemoteResult<Note> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.take_failure()?;
        state.revision += 1;
        let confirmed = Note {
            id: Some(id.to_string()),
            updated_at: Some(format!("rev-{}", state.revision)),
            ..note.clone()
        };
        state.updates.push(UpdateCall {
            id: id.to_string(),
            note: note.clone(),
            at: Instant::now(),
        });
        Ok(confirmed)
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(id.to_string());
        state.take_failure()?;
        state.notes.retain(|n| n.id() != Some(id));
        Ok(())
    }
}
