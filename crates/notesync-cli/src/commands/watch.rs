//! Watch command
//!
//! Keeps the push channel open and prints every collection change, clock
//! tick and connection status change until Ctrl-C. Reminders that fall due
//! by the server's clock are announced once.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use notesync_core::sync::{spawn_connection, ConnectionStatus};
use notesync_core::{Config, NoteCollection, SyncEvent};

use super::open_engine;
use crate::output::Output;

pub async fn watch(config: &Config, output: &Output) -> Result<()> {
    let engine = open_engine(config)?;
    let connection_config = config.connection_config();
    output.message(&format!("Watching {} (Ctrl-C to stop)", connection_config.url));

    let connection = spawn_connection(connection_config, engine.clone());
    let mut status = connection.subscribe_status();
    let mut notes = engine.subscribe();
    let mut clock = engine.subscribe_clock();
    let mut events = engine.subscribe_events();

    // Nothing is loaded before the first open
    notes.borrow_and_update();
    clock.borrow_and_update();

    let mut announced = HashSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }

            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                output.event(
                    "status",
                    serde_json::json!(status_name(current)),
                    &format!("[{}]", status_name(current)),
                );
            }

            Ok(()) = notes.changed() => {
                let snapshot = notes.borrow_and_update().clone();
                output.event(
                    "notes",
                    serde_json::json!(snapshot.iter().collect::<Vec<_>>()),
                    &format!("── {} note(s) ──", snapshot.len()),
                );
                if !output.is_json() && !output.is_quiet() {
                    output.print_notes(&snapshot, None);
                }
            }

            Ok(()) = clock.changed() => {
                let now = clock.borrow_and_update().clone();
                if let Some(now) = now {
                    output.event("tick", serde_json::json!(now), &format!("Server time: {}", now));
                }
                if let Some(now) = engine.clock_time() {
                    announce_due(&engine.notes(), now, &mut announced, output);
                }
            }

            event = events.recv() => match event {
                Ok(SyncEvent::Failed { operation, message }) => {
                    output.warn(&format!("{} failed: {}", operation, message));
                }
                Ok(SyncEvent::Reloaded { count }) => debug!(count, "Reloaded"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed sync events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    connection.shutdown().await;
    Ok(())
}

fn status_name(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
    }
}

/// Announce reminders that are due and not yet announced
fn announce_due(
    notes: &NoteCollection,
    now: DateTime<Utc>,
    announced: &mut HashSet<String>,
    output: &Output,
) {
    for (id, title) in due_reminders(notes, now) {
        if announced.insert(id.clone()) {
            output.event(
                "reminder",
                serde_json::json!({"id": id, "title": title}),
                &format!("⏰ Reminder: {}", title),
            );
        }
    }
}

fn due_reminders(notes: &NoteCollection, now: DateTime<Utc>) -> Vec<(String, String)> {
    notes
        .iter()
        .filter(|note| {
            note.reminder_countdown(now)
                .is_some_and(|left| left <= chrono::Duration::zero())
        })
        .filter_map(|note| note.id().map(|id| (id.to_string(), note.title.clone())))
        .collect()
}
