//! Quest State Log
//!
//! Append-only record of lifecycle transitions and objective progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a log entry records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogKind {
    QuestOffered,
    QuestAccepted,
    ObjectiveUpdate,
    QuestCompleted,
    QuestAbandoned,
    QuestFailed,
    /// Written by a newer engine version; the tag is kept so it is rewritten as read
    Unknown(String),
}

impl LogKind {
    pub fn as_str(&self) -> &str {
        match self {
            LogKind::QuestOffered => "quest_offered",
            LogKind::QuestAccepted => "quest_accepted",
            LogKind::ObjectiveUpdate => "objective_update",
            LogKind::QuestCompleted => "quest_completed",
            LogKind::QuestAbandoned => "quest_abandoned",
            LogKind::QuestFailed => "quest_failed",
            LogKind::Unknown(tag) => tag,
        }
    }
}

impl From<String> for LogKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "quest_offered" => LogKind::QuestOffered,
            "quest_accepted" => LogKind::QuestAccepted,
            "objective_update" => LogKind::ObjectiveUpdate,
            "quest_completed" => LogKind::QuestCompleted,
            "quest_abandoned" => LogKind::QuestAbandoned,
            "quest_failed" => LogKind::QuestFailed,
            _ => LogKind::Unknown(tag),
        }
    }
}

impl From<LogKind> for String {
    fn from(kind: LogKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub quest_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: Value,
}

impl LogEntry {
    pub fn new(kind: LogKind, quest_id: &str, timestamp: DateTime<Utc>, detail: Value) -> Self {
        Self {
            kind,
            quest_id: quest_id.to_string(),
            objective_id: None,
            timestamp,
            detail,
        }
    }

    pub fn for_objective(mut self, objective_id: &str) -> Self {
        self.objective_id = Some(objective_id.to_string());
        self
    }
}

/// Ordered log entries; never pruned during a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateLog {
    entries: Vec<LogEntry>,
}

impl StateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Entries touching a quest, oldest first
    pub fn for_quest<'a>(&'a self, quest_id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| e.quest_id == quest_id)
    }

    pub fn count_of(&self, kind: &LogKind) -> usize {
        self.entries.iter().filter(|e| &e.kind == kind).count()
    }
}
