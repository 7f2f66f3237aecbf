//! Command handlers

pub mod config;
pub mod edit;
pub mod notes;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};

use notesync_core::{Config, HttpNotesApi, SyncEngine, SyncError};

/// Build an engine talking to the configured notes server
pub fn open_engine(config: &Config) -> Result<Arc<SyncEngine>> {
    let api = HttpNotesApi::new(&config.api_url)
        .with_context(|| format!("Failed to create client for {}", config.api_url))?;
    Ok(Arc::new(SyncEngine::new(Arc::new(api))))
}

/// Convert an engine error, attaching its recovery hint
pub fn with_hint(error: SyncError) -> anyhow::Error {
    match error.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", error, hint),
        None => error.into(),
    }
}
