//! Live edit command
//!
//! Reads stdin line by line; each line becomes the note's new content. Lines
//! are shown locally at once and sent through the edit coalescer, so a fast
//! typist produces one update per pause rather than one per line.

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;

use notesync_core::{Config, EditCoalescer, SyncEvent};

use super::{open_engine, with_hint};
use crate::output::Output;

pub async fn edit(config: &Config, id: String, output: &Output) -> Result<()> {
    let engine = open_engine(config)?;
    engine.load_all().await.map_err(with_hint)?;

    let mut note = engine
        .note(&id)
        .ok_or_else(|| anyhow!("Note not found: {}", id))?;
    let mut events = engine.subscribe_events();
    let coalescer = EditCoalescer::new(engine.clone(), config.edit_window());

    if !output.is_quiet() && !output.is_json() {
        eprintln!(
            "Editing '{}'. Each line replaces the content; Ctrl-D to finish.",
            note.title
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut edits = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        note.content = line;
        engine.apply_local(&note);
        coalescer.edit(note.clone()).await;
        edits += 1;
    }
    coalescer.flush().await;

    let mut failures = 0usize;
    loop {
        match events.try_recv() {
            Ok(SyncEvent::Failed { message, .. }) => {
                output.warn(&message);
                failures += 1;
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    if failures > 0 {
        bail!("{} update(s) failed; the server may not have the latest content", failures);
    }

    if edits == 0 {
        output.message("No changes.");
        return Ok(());
    }

    match engine.note(&id) {
        Some(saved) if output.is_json() => output.print_note(&saved),
        Some(saved) => output.success(&format!("Saved '{}' ({} edit(s))", saved.title, edits)),
        None => output.warn(&format!("Note {} was deleted while editing", id)),
    }
    Ok(())
}
