//! Remote client for the notes server
//!
//! Translates list/create/update/delete into HTTP calls:
//!
//! - `GET /notes`
//! - `POST /notes`
//! - `PUT /notes/{id}`
//! - `DELETE /notes/{id}`
//!
//! Payloads are sanitized before they leave the client: an empty
//! `reminder_time` is sent as `null`, which is the only "no reminder" value
//! the server schema accepts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::models::{Note, NoteStatus};

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// Operations the engine needs from the remote authority
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// Fetch every note
    async fn list(&self) -> RemoteResult<Vec<Note>>;

    /// Create a note; the response carries the assigned id
    async fn create(&self, note: &Note) -> RemoteResult<Note>;

    /// Overwrite a note; the response is the server's authoritative copy
    async fn update(&self, id: &str, note: &Note) -> RemoteResult<Note>;

    async fn delete(&self, id: &str) -> RemoteResult<()>;
}

/// Body sent on create and update
///
/// Server-assigned fields (`id`, timestamps) are never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotePayload {
    pub title: String,
    pub content: String,
    pub priority: i64,
    pub status: NoteStatus,
    pub reminder_time: Option<String>,
}

impl From<&Note> for NotePayload {
    fn from(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
            priority: note.priority,
            status: note.status,
            reminder_time: note.reminder_time.clone().filter(|r| !r.is_empty()),
        }
    }
}

/// [`NotesApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpNotesApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpNotesApi {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str) -> RemoteResult<Self> {
        let parsed = Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("notesync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: parsed,
            client,
        })
    }

    /// The server address, without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn notes_url(&self) -> Url {
        self.url_with(&["notes"])
    }

    /// Note address; the id is percent-encoded as a single path segment
    fn note_url(&self, id: &str) -> Url {
        self.url_with(&["notes", id])
    }

    fn url_with(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: a base URL always has path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Check the status and return the body text
    async fn read_body(response: reqwest::Response) -> RemoteResult<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> RemoteResult<T> {
        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl NotesApi for HttpNotesApi {
    async fn list(&self) -> RemoteResult<Vec<Note>> {
        debug!("GET {}", self.notes_url());
        let response = self.client.get(self.notes_url()).send().await?;
        Self::read_json(response).await
    }

    async fn create(&self, note: &Note) -> RemoteResult<Note> {
        debug!("POST {}", self.notes_url());
        let response = self
            .client
            .post(self.notes_url())
            .json(&NotePayload::from(note))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn update(&self, id: &str, note: &Note) -> RemoteResult<Note> {
        debug!("PUT {}", self.note_url(id));
        let response = self
            .client
            .put(self.note_url(id))
            .json(&NotePayload::from(note))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        debug!("DELETE {}", self.note_url(id));
        let response = self.client.delete(self.note_url(id)).send().await?;
        Self::read_body(response).await.map(|_| ())
    }
}
