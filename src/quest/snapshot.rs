//! Persistence Snapshot
//!
//! The versioned image of mission state written after every mutation.
//! Unknown fields are ignored on read; anything that would break the
//! manager's invariants is rejected as a whole.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::log::StateLog;
use super::state::{IdSet, Quest, QuestStatus};
use crate::error::SnapshotError;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub offered: IdSet,
    #[serde(default)]
    pub active_main: Option<String>,
    #[serde(default)]
    pub active_subs: IdSet,
    #[serde(default)]
    pub completed: IdSet,
    #[serde(default)]
    pub abandoned: IdSet,
    #[serde(default)]
    pub failed: IdSet,
    #[serde(default)]
    pub state_log: StateLog,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            quests: Vec::new(),
            offered: IdSet::new(),
            active_main: None,
            active_subs: IdSet::new(),
            completed: IdSet::new(),
            abandoned: IdSet::new(),
            failed: IdSet::new(),
            state_log: StateLog::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate persisted state
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        if snapshot.version == 0 {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Written by a newer engine; readable but possibly lossy
    pub fn is_newer(&self) -> bool {
        self.version > SNAPSHOT_VERSION
    }

    /// Check the cross-entity invariants the manager relies on
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let inconsistent = |msg: String| Err(SnapshotError::Inconsistent(msg));

        let mut seen = HashSet::new();
        for quest in &self.quests {
            if !seen.insert(quest.id.as_str()) {
                return inconsistent(format!("quest '{}' stored twice", quest.id));
            }
            let mut objective_ids = HashSet::new();
            for objective in quest.objectives() {
                if !objective_ids.insert(objective.id.as_str()) {
                    return inconsistent(format!(
                        "quest '{}' repeats objective '{}'",
                        quest.id, objective.id
                    ));
                }
                if !objective.is_consistent() {
                    return inconsistent(format!(
                        "objective '{}' of quest '{}' has count {}/{}",
                        objective.id,
                        quest.id,
                        objective.current_count(),
                        objective.required_count()
                    ));
                }
            }
        }

        let sets = [
            ("offered", &self.offered),
            ("activeSubs", &self.active_subs),
            ("completed", &self.completed),
            ("abandoned", &self.abandoned),
            ("failed", &self.failed),
        ];
        for (name, set) in sets {
            if set.has_duplicates() {
                return inconsistent(format!("{} lists a quest twice", name));
            }
        }

        for quest in &self.quests {
            let id = quest.id.as_str();
            let is_main_slot = self.active_main.as_deref() == Some(id);
            let expected_home = match quest.status() {
                QuestStatus::Unoffered => None,
                QuestStatus::Offered => Some("offered"),
                QuestStatus::Active if quest.is_main() => Some("activeMain"),
                QuestStatus::Active => Some("activeSubs"),
                QuestStatus::Completed => Some("completed"),
                QuestStatus::Abandoned => Some("abandoned"),
                QuestStatus::Failed => Some("failed"),
            };

            let mut homes: Vec<&str> = sets
                .iter()
                .filter(|(_, set)| set.contains(id))
                .map(|(name, _)| *name)
                .collect();
            if is_main_slot {
                homes.push("activeMain");
            }

            if homes.as_slice() != expected_home.as_slice() {
                return inconsistent(format!(
                    "quest '{}' is {} but indexed in {:?}",
                    id,
                    quest.status().as_str(),
                    homes
                ));
            }
        }

        let listed = sets
            .iter()
            .flat_map(|(_, set)| set.iter())
            .chain(self.active_main.as_deref());
        for id in listed {
            if !seen.contains(id) {
                return inconsistent(format!("index refers to unknown quest '{}'", id));
            }
        }

        Ok(())
    }
}
