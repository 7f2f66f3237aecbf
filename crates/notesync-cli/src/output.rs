//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use notesync_core::{Note, NoteCollection, NoteStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single note
    pub fn print_note(&self, note: &Note) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", note.id().unwrap_or("(draft)"));
                println!("Title:    {}", note.title);
                println!("Status:   {}", note.status);
                println!("Priority: {}", note.priority);
                if let Some(ref reminder) = note.reminder_time {
                    println!("Reminder: {}", reminder);
                }
                if let Some(ref created) = note.created_at {
                    println!("Created:  {}", created);
                }
                if let Some(ref updated) = note.updated_at {
                    println!("Updated:  {}", updated);
                }
                if !note.content.is_empty() {
                    println!();
                    println!("{}", note.content);
                }
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => {
                println!("{}", note.id().unwrap_or_default());
            }
        }
    }

    /// Print notes grouped by status, lowest priority first
    pub fn print_notes(&self, notes: &NoteCollection, only: Option<NoteStatus>) {
        let groups: Vec<(NoteStatus, Vec<&Note>)> = NoteStatus::ALL
            .into_iter()
            .filter(|status| only.map_or(true, |s| s == *status))
            .map(|status| (status, notes.by_status(status)))
            .collect();

        match self.format {
            OutputFormat::Human => {
                let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
                if total == 0 {
                    println!("No notes found.");
                    return;
                }
                for (status, group) in &groups {
                    if group.is_empty() {
                        continue;
                    }
                    println!("── {} ({}) ──", status, group.len());
                    for note in group {
                        let reminder = note
                            .reminder_time
                            .as_deref()
                            .map(|r| format!(" | ⏰ {}", r))
                            .unwrap_or_default();
                        println!(
                            "{} | P{} | {}{}",
                            note.id().unwrap_or_default(),
                            note.priority,
                            truncate(&note.title, 40),
                            reminder
                        );
                    }
                    println!();
                }
                println!("{} note(s)", total);
            }
            OutputFormat::Json => {
                let flat: Vec<&Note> = groups.iter().flat_map(|(_, g)| g.iter().copied()).collect();
                print_json(&flat);
            }
            OutputFormat::Quiet => {
                for (_, group) in &groups {
                    for note in group {
                        println!("{}", note.id().unwrap_or_default());
                    }
                }
            }
        }
    }

    /// Print a watch event as one JSON line, or a message for humans
    pub fn event(&self, kind: &str, payload: serde_json::Value, human: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", human),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"event": kind, "data": payload}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr, even in quiet mode
    pub fn warn(&self, message: &str) {
        eprintln!("⚠ {}", message);
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
