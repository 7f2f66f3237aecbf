//! Client-side synchronization
//!
//! ## Components
//!
//! - [`SyncEngine`]: owns the note collection and server clock, applies
//!   local intents optimistically and folds push messages into them
//! - [`spawn_connection`]: keeps the `/ws` push channel open, reloading on
//!   every open and reconnecting at a fixed interval
//! - [`EditCoalescer`]: debounces bursts of edits into one update per note
//!
//! ## Usage
//!
//! ```ignore
//! let api = Arc::new(HttpNotesApi::new(&config.api_url)?);
//! let engine = Arc::new(SyncEngine::new(api));
//! let connection = spawn_connection(config.connection_config(), engine.clone());
//!
//! let mut notes = engine.subscribe();
//! while notes.changed().await.is_ok() {
//!     render(&notes.borrow_and_update());
//! }
//! ```

mod coalescer;
mod connection;
mod engine;
mod message;
#[cfg(test)]
mod testing;

pub use coalescer::{EditCoalescer, DEFAULT_EDIT_WINDOW};
pub use connection::{
    spawn_connection, ConnectionCommand, ConnectionConfig, ConnectionHandle, ConnectionStatus,
};
pub use engine::{Operation, SyncEngine, SyncEvent};
pub use message::{NoteRef, NoteUpdate, PushMessage};
