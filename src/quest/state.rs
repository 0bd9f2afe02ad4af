//! Quest State Tracking
//!
//! Runtime quests and objectives. Objective status is always derived from its
//! counts; quest status only changes through the mission manager.

use serde::{Deserialize, Serialize};

use super::definition::{Condition, ObjectiveType, QuestType};

/// Lifecycle status of a quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Known to the engine but not yet offered
    Unoffered,
    /// Offered to the player, waiting for acceptance
    Offered,
    /// Accepted and in progress
    Active,
    /// Every required objective finished
    Completed,
    /// Failed by game logic
    Failed,
    /// Abandoned by the player
    Abandoned,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Unoffered => "unoffered",
            QuestStatus::Offered => "offered",
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
            QuestStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unoffered" => Some(QuestStatus::Unoffered),
            "offered" => Some(QuestStatus::Offered),
            "active" => Some(QuestStatus::Active),
            "completed" => Some(QuestStatus::Completed),
            "failed" => Some(QuestStatus::Failed),
            "abandoned" => Some(QuestStatus::Abandoned),
            _ => None,
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Completed | QuestStatus::Failed | QuestStatus::Abandoned)
    }
}

/// Status of a single objective, derived from its counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Pending,
    Completed,
}

/// A single trackable unit of quest progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: String,
    #[serde(rename = "type")]
    pub objective_type: ObjectiveType,
    /// Display text, not used by the engine
    #[serde(default)]
    pub title: String,
    pub(crate) required_count: u32,
    #[serde(default)]
    pub(crate) current_count: u32,
    /// Optional objectives never gate quest completion
    #[serde(default)]
    pub optional: bool,
    /// Only events attributed to this actor count when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_character: Option<String>,
    /// OR across entries; an empty list matches every routed event
    #[serde(default)]
    pub(crate) conditions: Vec<Condition>,
}

impl Objective {
    pub fn required_count(&self) -> u32 {
        self.required_count
    }

    pub fn current_count(&self) -> u32 {
        self.current_count
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn status(&self) -> ObjectiveStatus {
        if self.current_count >= self.required_count {
            ObjectiveStatus::Completed
        } else {
            ObjectiveStatus::Pending
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == ObjectiveStatus::Completed
    }

    /// Add one unit of progress. Returns false if already complete.
    pub(crate) fn advance(&mut self) -> bool {
        if self.is_completed() {
            return false;
        }
        self.current_count = (self.current_count + 1).min(self.required_count);
        true
    }

    /// Counts within bounds and a usable requirement
    pub(crate) fn is_consistent(&self) -> bool {
        self.required_count >= 1 && self.current_count <= self.required_count
    }
}

/// A quest: ordered objectives plus lifecycle status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub quest_type: QuestType,
    /// Informational only
    #[serde(default)]
    pub related_npcs: Vec<String>,
    pub(crate) objectives: Vec<Objective>,
    pub(crate) status: QuestStatus,
}

impl Quest {
    pub fn status(&self) -> QuestStatus {
        self.status
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// Get objective by ID
    pub fn get_objective(&self, id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == id)
    }

    /// The first objective, if any
    pub fn primary_objective(&self) -> Option<&Objective> {
        self.objectives.first()
    }

    /// True when every non-optional objective is complete
    pub fn is_complete(&self) -> bool {
        self.objectives
            .iter()
            .filter(|o| !o.optional)
            .all(Objective::is_completed)
    }

    /// (completed required objectives, total required objectives)
    pub fn progress(&self) -> (usize, usize) {
        let required = self.objectives.iter().filter(|o| !o.optional);
        let total = required.clone().count();
        let done = required.filter(|o| o.is_completed()).count();
        (done, total)
    }

    pub fn is_main(&self) -> bool {
        self.quest_type == QuestType::Main
    }

    pub(crate) fn objective_mut(&mut self, index: usize) -> Option<&mut Objective> {
        self.objectives.get_mut(index)
    }
}

/// Insertion-ordered set of quest IDs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet(Vec<String>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|existing| existing == id)
    }

    /// Insert at the end. Returns false if already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    /// Returns true if the ID was present
    pub fn remove(&mut self, id: &str) -> bool {
        let len_before = self.0.len();
        self.0.retain(|existing| existing != id);
        self.0.len() < len_before
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub(crate) fn has_duplicates(&self) -> bool {
        self.0
            .iter()
            .enumerate()
            .any(|(i, id)| self.0[..i].contains(id))
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}
