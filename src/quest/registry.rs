//! Quest Registry
//!
//! Loads and caches quest definitions from TOML files. The registry is the
//! stock [`QuestSource`] handed to the mission manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::state::Quest;
use crate::error::ContentError;

/// Where the mission manager resolves quests it is asked to offer by ID
pub trait QuestSource {
    /// A fresh, unoffered copy of the quest
    fn get(&self, quest_id: &str) -> Option<Quest>;
}

/// Files that failed to load during [`QuestRegistry::load_all`]
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<(PathBuf, ContentError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry for all quest definitions
pub struct QuestRegistry {
    /// Loaded quest definitions
    quests: HashMap<String, Quest>,
    /// Base directory for quest data
    data_dir: PathBuf,
}

impl QuestRegistry {
    /// Quests are read from `<data_dir>/quests`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            quests: HashMap::new(),
            data_dir: data_dir.join("quests"),
        }
    }

    /// Load all quest definitions from the data directory
    pub fn load_all(&mut self) -> Result<LoadReport, String> {
        info!("Loading quests from {:?}", self.data_dir);

        let mut report = LoadReport::default();
        if !self.data_dir.exists() {
            warn!("Quest directory does not exist: {:?}", self.data_dir);
            return Ok(report);
        }

        let mut paths = Vec::new();
        collect_toml_files(&self.data_dir, &mut paths)?;
        paths.sort();

        for path in paths {
            match self.load_quest_file(&path) {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    warn!("Failed to load quest {:?}: {}", path, e);
                    report.failures.push((path, e));
                }
            }
        }

        info!("Loaded {} quest definitions", report.loaded);
        Ok(report)
    }

    /// Load a single quest file
    fn load_quest_file(&mut self, path: &Path) -> Result<(), ContentError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ContentError::Parse(format!("failed to read {:?}: {}", path, e)))?;
        self.load_quest_str(&content)?;
        Ok(())
    }

    /// Parse and register one `[quest]` document
    pub fn load_quest_str(&mut self, content: &str) -> Result<&Quest, ContentError> {
        let quest = Quest::from_toml_str(content)?;
        Ok(self.insert(quest))
    }

    /// Register an already built quest, replacing any with the same ID
    pub fn insert(&mut self, quest: Quest) -> &Quest {
        let quest_id = quest.id.clone();
        info!("Loaded quest: {} ({})", quest.title, quest_id);
        if self.quests.contains_key(&quest_id) {
            warn!("Quest '{}' defined more than once, keeping the latest", quest_id);
        }
        self.quests.insert(quest_id.clone(), quest);
        &self.quests[&quest_id]
    }

    /// Get a quest by ID
    pub fn get(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.get(quest_id)
    }

    /// Get all quest IDs, sorted
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.quests.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get quests that list an NPC as related
    pub fn get_quests_for_npc(&self, npc_id: &str) -> Vec<&Quest> {
        self.quests
            .values()
            .filter(|q| q.related_npcs.iter().any(|n| n == npc_id))
            .collect()
    }

    /// Get count of loaded quests
    pub fn count(&self) -> usize {
        self.quests.len()
    }
}

impl QuestSource for QuestRegistry {
    fn get(&self, quest_id: &str) -> Option<Quest> {
        self.quests.get(quest_id).cloned()
    }
}

/// Recursively collect TOML files under a directory
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}
