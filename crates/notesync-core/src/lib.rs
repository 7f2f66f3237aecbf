//! notesync core library
//!
//! Client-side synchronization for a shared collection of notes held by a
//! remote notes server. The server is the authority; this crate keeps a
//! local replica consistent with it.
//!
//! # Architecture
//!
//! - **HTTP API**: create, update and delete requests, plus full reloads
//! - **Push channel**: a WebSocket carrying snapshots, per-note changes and
//!   clock ticks
//!
//! Local changes are shown immediately and replaced by the server's copy once
//! it answers. Push messages are applied to the same collection.
//!
//! # Modules
//!
//! - `models`: notes, partial changes and the collection
//! - `remote`: the `NotesApi` trait and its HTTP implementation
//! - `sync`: engine, push connection and edit coalescer
//! - `error`: error types
//! - `config`: application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;

pub use config::Config;
pub use error::{MessageError, RemoteError, SyncError, SyncResult};
pub use models::{Note, NoteCollection, NotePatch, NoteStatus};
pub use remote::{HttpNotesApi, NotesApi};
pub use sync::{EditCoalescer, SyncEngine, SyncEvent};
