//! Note command handlers
//!
//! One-shot commands: each runs a single engine operation against the
//! server and prints the result.

use anyhow::{bail, Result};

use notesync_core::{Config, Note, NotePatch, NoteStatus};

use super::{open_engine, with_hint};
use crate::output::Output;

/// Fields accepted by `add` and `update`
#[derive(Debug, Default)]
pub struct NoteFields {
    pub title: Option<String>,
    pub content: Option<String>,
    pub priority: Option<i64>,
    pub status: Option<NoteStatus>,
    pub reminder: Option<String>,
    pub clear_reminder: bool,
}

impl NoteFields {
    fn into_draft(self, title: String) -> Note {
        let mut draft = Note::draft(title);
        if let Some(content) = self.content {
            draft = draft.with_content(content);
        }
        if let Some(priority) = self.priority {
            draft = draft.with_priority(priority);
        }
        if let Some(status) = self.status {
            draft = draft.with_status(status);
        }
        if let Some(reminder) = self.reminder {
            draft = draft.with_reminder(reminder);
        }
        draft
    }

    fn into_patch(self) -> NotePatch {
        let mut patch = NotePatch::default();
        if let Some(title) = self.title {
            patch = patch.title(title);
        }
        if let Some(content) = self.content {
            patch = patch.content(content);
        }
        if let Some(priority) = self.priority {
            patch = patch.priority(priority);
        }
        if let Some(status) = self.status {
            patch = patch.status(status);
        }
        if self.clear_reminder {
            patch = patch.reminder(None);
        } else if let Some(reminder) = self.reminder {
            patch = patch.reminder(Some(reminder));
        }
        patch
    }
}

/// List notes grouped by status
pub async fn list(config: &Config, status: Option<NoteStatus>, output: &Output) -> Result<()> {
    let engine = open_engine(config)?;
    engine.load_all().await.map_err(with_hint)?;
    output.print_notes(&engine.notes(), status);
    Ok(())
}

/// Create a note
pub async fn add(config: &Config, title: String, fields: NoteFields, output: &Output) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Note title cannot be empty");
    }

    let engine = open_engine(config)?;
    let created = engine
        .create(fields.into_draft(title))
        .await
        .map_err(with_hint)?;

    if output.is_quiet() || output.is_json() {
        output.print_note(&created);
    } else {
        output.success(&format!(
            "Created note: {} ({})",
            created.title,
            created.id().unwrap_or_default()
        ));
    }
    Ok(())
}

/// Patch an existing note
pub async fn update(config: &Config, id: String, fields: NoteFields, output: &Output) -> Result<()> {
    let patch = fields.into_patch();
    if patch.is_empty() {
        bail!("Nothing to update. Pass at least one field to change.");
    }

    let engine = open_engine(config)?;
    engine.load_all().await.map_err(with_hint)?;
    let confirmed = engine.update(&id, patch).await.map_err(with_hint)?;

    if output.is_json() {
        output.print_note(&confirmed);
    } else {
        output.success(&format!("Updated note: {}", confirmed.title));
    }
    Ok(())
}

/// Delete a note
pub async fn delete(config: &Config, id: String, output: &Output) -> Result<()> {
    let engine = open_engine(config)?;
    engine.delete(&id).await.map_err(with_hint)?;
    output.success(&format!("Deleted note: {}", id));
    Ok(())
}
