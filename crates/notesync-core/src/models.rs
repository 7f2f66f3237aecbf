//! Data models for notesync
//!
//! Defines the note record, the field-level patch applied by optimistic
//! updates and push merges, and the keyed collection the engine publishes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Workflow state of a note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    #[default]
    Active,
    Hold,
    Finished,
}

impl NoteStatus {
    /// All statuses in display order
    pub const ALL: [NoteStatus; 3] = [NoteStatus::Active, NoteStatus::Hold, NoteStatus::Finished];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Active => "active",
            NoteStatus::Hold => "hold",
            NoteStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(NoteStatus::Active),
            "hold" => Ok(NoteStatus::Hold),
            "finished" => Ok(NoteStatus::Finished),
            other => Err(format!(
                "unknown status '{}' (expected active, hold or finished)",
                other
            )),
        }
    }
}

/// A note record
///
/// `id` stays `None` until the server assigns one on creation; such a note is
/// a draft and never goes to the update or delete paths. Timestamps are kept
/// in their wire form, see [`parse_timestamp`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Ordering key within a status group
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: NoteStatus,
    #[serde(default)]
    pub reminder_time: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Note {
    /// Create a new draft with the given title
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: 1,
            ..Self::default()
        }
    }

    /// Set the body content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: NoteStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reminder(mut self, reminder_time: impl Into<String>) -> Self {
        self.reminder_time = Some(reminder_time.into());
        self
    }

    /// The identifier, if the note has a non-empty one
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether the server has not confirmed this note yet
    pub fn is_draft(&self) -> bool {
        self.id().is_none()
    }

    /// Parsed reminder time, if set and well-formed
    pub fn reminder_at(&self) -> Option<DateTime<Utc>> {
        self.reminder_time.as_deref().and_then(parse_timestamp)
    }

    /// Time left until the reminder, measured against `now`
    ///
    /// Negative once the reminder has passed. Pass the server clock rather
    /// than the local wall clock.
    pub fn reminder_countdown(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.reminder_at().map(|at| at - now)
    }
}

/// A field-level change to a note
///
/// Only fields that are `Some` are written. `reminder_time` is doubly
/// optional so a patch can clear the reminder (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub reminder_time: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl NotePatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn status(mut self, status: NoteStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the reminder; `None` clears it
    pub fn reminder(mut self, reminder_time: Option<String>) -> Self {
        self.reminder_time = Some(reminder_time);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow-merge the provided fields into `note`
    ///
    /// The identifier is never touched. Returns whether anything changed.
    pub fn apply_to(&self, note: &mut Note) -> bool {
        let mut changed = false;
        changed |= assign(&mut note.title, &self.title);
        changed |= assign(&mut note.content, &self.content);
        changed |= assign(&mut note.priority, &self.priority);
        changed |= assign(&mut note.status, &self.status);
        changed |= assign(&mut note.reminder_time, &self.reminder_time);
        changed |= assign(&mut note.created_at, &self.created_at.clone().map(Some));
        changed |= assign(&mut note.updated_at, &self.updated_at.clone().map(Some));
        changed
    }
}

fn assign<T: Clone + PartialEq>(slot: &mut T, value: &Option<T>) -> bool {
    match value {
        Some(v) if slot != v => {
            *slot = v.clone();
            true
        }
        _ => false,
    }
}

/// The set of confirmed notes, keyed by identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteCollection {
    notes: BTreeMap<String, Note>,
}

impl NoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from a server list
    ///
    /// Entries without an identifier cannot be keyed and are skipped.
    pub fn from_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut collection = Self::new();
        for note in notes {
            match note.id().map(str::to_owned) {
                Some(id) => {
                    collection.notes.insert(id, note);
                }
                None => tracing::warn!(title = %note.title, "Skipping note without an id"),
            }
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notes.contains_key(id)
    }

    /// Notes in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.notes.keys().map(String::as_str)
    }

    /// Notes of one status group, lowest priority first
    pub fn by_status(&self, status: NoteStatus) -> Vec<&Note> {
        let mut group: Vec<&Note> = self.iter().filter(|n| n.status == status).collect();
        group.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.title.cmp(&b.title)));
        group
    }

    /// Insert a confirmed note unless one with the same id exists
    pub(crate) fn insert_if_absent(&mut self, note: Note) -> bool {
        let Some(id) = note.id().map(str::to_owned) else {
            return false;
        };
        if self.notes.contains_key(&id) {
            return false;
        }
        self.notes.insert(id, note);
        true
    }

    /// Replace an existing entry wholesale; absent ids are left alone
    pub(crate) fn replace(&mut self, note: Note) -> bool {
        let Some(slot) = note.id().and_then(|id| self.notes.get_mut(id)) else {
            return false;
        };
        if *slot == note {
            return false;
        }
        *slot = note;
        true
    }

    pub(crate) fn apply_patch(&mut self, id: &str, patch: &NotePatch) -> bool {
        self.notes
            .get_mut(id)
            .is_some_and(|note| patch.apply_to(note))
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Note> {
        self.notes.remove(id)
    }
}

impl<'a> IntoIterator for &'a NoteCollection {
    type Item = &'a Note;
    type IntoIter = std::collections::btree_map::Values<'a, String, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.values()
    }
}

/// Parse a server timestamp
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`, `...+02:00`) and the naive forms
/// the server emits for zone-less columns, which are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Treat an explicit `null` as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Distinguish a present `null` (`Some(None)`) from a missing key (`None`)
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
