//! Quest Definition Structures
//!
//! Raw structures are deserialized from TOML quest files and resolved into
//! runtime [`Quest`]s. Conditions are validated against their objective type
//! here, so a mistyped condition key fails at load instead of never matching.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{Objective, Quest, QuestStatus};
use crate::error::ContentError;

/// A quest definition loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// "main", "sub" or "side"
    #[serde(rename = "type", default = "default_quest_type")]
    pub quest_type: String,
    #[serde(default)]
    pub related_npcs: Vec<String>,
    #[serde(default)]
    pub objectives: Vec<RawObjective>,
}

fn default_quest_type() -> String {
    "sub".to_string()
}

/// Raw objective as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawObjective {
    pub id: String,
    #[serde(rename = "type")]
    pub objective_type: String,
    #[serde(default, alias = "description")]
    pub title: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub optional: bool,
    pub assigned_character: Option<String>,
    /// Each table is one condition entry
    #[serde(default)]
    pub conditions: Vec<BTreeMap<String, String>>,
}

fn default_count() -> u32 {
    1
}

// ============================================================================
// Resolved Types
// ============================================================================

/// Objective types supported by the quest system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectiveType {
    /// Talk to a specific NPC
    Talk,
    /// Explore an area
    Explore,
    /// Summon or get help from a companion
    Assist,
    /// Collect an item
    Collect,
    /// Deliver an item, optionally to an NPC
    Deliver,
    /// Repair a structure
    FixBuild,
    /// Find a clue
    Investigate,
    /// Content-defined type, satisfied by registered custom events
    Custom(String),
}

impl ObjectiveType {
    pub fn from_str(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        if let Some(tag) = lower.strip_prefix("custom:") {
            if tag.is_empty() {
                return None;
            }
            // keep the author's casing for the tag itself
            let original = s.get("custom:".len()..).unwrap_or(tag);
            return Some(ObjectiveType::Custom(original.to_string()));
        }
        match lower.as_str() {
            "talk" | "talk_to" => Some(ObjectiveType::Talk),
            "explore" | "reach_location" => Some(ObjectiveType::Explore),
            "assist" => Some(ObjectiveType::Assist),
            "collect" | "collect_item" => Some(ObjectiveType::Collect),
            "deliver" => Some(ObjectiveType::Deliver),
            "fix_build" | "fixbuild" => Some(ObjectiveType::FixBuild),
            "investigate" => Some(ObjectiveType::Investigate),
            _ => None,
        }
    }

    /// Canonical content tag
    pub fn tag(&self) -> String {
        match self {
            ObjectiveType::Talk => "talk".to_string(),
            ObjectiveType::Explore => "explore".to_string(),
            ObjectiveType::Assist => "assist".to_string(),
            ObjectiveType::Collect => "collect".to_string(),
            ObjectiveType::Deliver => "deliver".to_string(),
            ObjectiveType::FixBuild => "fix_build".to_string(),
            ObjectiveType::Investigate => "investigate".to_string(),
            ObjectiveType::Custom(tag) => format!("custom:{}", tag),
        }
    }

    /// Keys a condition entry may pin; `None` means any key
    fn condition_keys(&self) -> Option<&'static [&'static str]> {
        match self {
            ObjectiveType::Talk => Some(&["npc_id"]),
            ObjectiveType::Explore => Some(&["area"]),
            ObjectiveType::Assist => Some(&["partner_id"]),
            ObjectiveType::Collect => Some(&["item_id"]),
            ObjectiveType::Deliver => Some(&["item_id", "npc_id"]),
            ObjectiveType::FixBuild => Some(&["build_id"]),
            ObjectiveType::Investigate => Some(&["clue_id"]),
            ObjectiveType::Custom(_) => None,
        }
    }
}

impl fmt::Display for ObjectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl TryFrom<String> for ObjectiveType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ObjectiveType::from_str(&value).ok_or_else(|| format!("unknown objective type '{}'", value))
    }
}

impl From<ObjectiveType> for String {
    fn from(value: ObjectiveType) -> Self {
        value.tag()
    }
}

/// Quest categories. Only one main quest may be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestType {
    Main,
    Sub,
    Side,
}

impl QuestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestType::Main => "main",
            QuestType::Sub => "sub",
            QuestType::Side => "side",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "main" => Some(QuestType::Main),
            "sub" => Some(QuestType::Sub),
            "side" => Some(QuestType::Side),
            _ => None,
        }
    }
}

/// One condition entry. Every pinned field must equal the event's field;
/// `None` matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Npc { npc_id: Option<String> },
    Area { area: Option<String> },
    Partner { partner_id: Option<String> },
    Item { item_id: Option<String> },
    Delivery { item_id: Option<String>, npc_id: Option<String> },
    Build { build_id: Option<String> },
    Clue { clue_id: Option<String> },
    Fields { fields: BTreeMap<String, String> },
}

impl Condition {
    /// Resolve a raw key/value entry for an objective of the given type
    pub fn from_raw(
        objective_id: &str,
        objective_type: &ObjectiveType,
        raw: &BTreeMap<String, String>,
    ) -> Result<Self, ContentError> {
        if let Some(allowed) = objective_type.condition_keys() {
            if let Some(key) = raw.keys().find(|k| !allowed.contains(&k.as_str())) {
                return Err(ContentError::InvalidConditionKey {
                    objective_id: objective_id.to_string(),
                    objective_type: objective_type.tag(),
                    key: key.clone(),
                });
            }
        }

        let get = |key: &str| raw.get(key).cloned();
        Ok(match objective_type {
            ObjectiveType::Talk => Condition::Npc { npc_id: get("npc_id") },
            ObjectiveType::Explore => Condition::Area { area: get("area") },
            ObjectiveType::Assist => Condition::Partner { partner_id: get("partner_id") },
            ObjectiveType::Collect => Condition::Item { item_id: get("item_id") },
            ObjectiveType::Deliver => Condition::Delivery {
                item_id: get("item_id"),
                npc_id: get("npc_id"),
            },
            ObjectiveType::FixBuild => Condition::Build { build_id: get("build_id") },
            ObjectiveType::Investigate => Condition::Clue { clue_id: get("clue_id") },
            ObjectiveType::Custom(_) => Condition::Fields { fields: raw.clone() },
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Condition::Npc { .. } => "npc",
            Condition::Area { .. } => "area",
            Condition::Partner { .. } => "partner",
            Condition::Item { .. } => "item",
            Condition::Delivery { .. } => "delivery",
            Condition::Build { .. } => "build",
            Condition::Clue { .. } => "clue",
            Condition::Fields { .. } => "fields",
        }
    }

    /// Whether this condition kind can apply to the objective type
    pub fn fits(&self, objective_type: &ObjectiveType) -> bool {
        matches!(
            (self, objective_type),
            (Condition::Npc { .. }, ObjectiveType::Talk)
                | (Condition::Area { .. }, ObjectiveType::Explore)
                | (Condition::Partner { .. }, ObjectiveType::Assist)
                | (Condition::Item { .. }, ObjectiveType::Collect)
                | (Condition::Delivery { .. }, ObjectiveType::Deliver)
                | (Condition::Build { .. }, ObjectiveType::FixBuild)
                | (Condition::Clue { .. }, ObjectiveType::Investigate)
                | (Condition::Fields { .. }, ObjectiveType::Custom(_))
        )
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Objective {
    /// New objective with zero progress
    pub fn new(
        id: impl Into<String>,
        objective_type: ObjectiveType,
        required_count: u32,
    ) -> Result<Self, ContentError> {
        let id = id.into();
        if required_count == 0 {
            return Err(ContentError::ZeroRequiredCount { objective_id: id });
        }
        Ok(Self {
            id,
            objective_type,
            title: String::new(),
            required_count,
            current_count: 0,
            optional: false,
            assigned_character: None,
            conditions: Vec::new(),
        })
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn assigned_to(mut self, actor_id: impl Into<String>) -> Self {
        self.assigned_character = Some(actor_id.into());
        self
    }

    /// Append a condition entry; its kind must fit the objective type
    pub fn with_condition(mut self, condition: Condition) -> Result<Self, ContentError> {
        if !condition.fits(&self.objective_type) {
            return Err(ContentError::ConditionKindMismatch {
                objective_id: self.id,
                objective_type: self.objective_type.tag(),
                condition: condition.kind().to_string(),
            });
        }
        self.conditions.push(condition);
        Ok(self)
    }

    pub fn from_raw(index: usize, raw: &RawObjective) -> Result<Self, ContentError> {
        let objective_type = ObjectiveType::from_str(&raw.objective_type).ok_or_else(|| {
            ContentError::UnknownObjectiveType {
                tag: raw.objective_type.clone(),
                index,
            }
        })?;

        let conditions = raw
            .conditions
            .iter()
            .map(|c| Condition::from_raw(&raw.id, &objective_type, c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut objective = Objective::new(raw.id.clone(), objective_type, raw.count)?
            .titled(raw.title.clone())
            .optional(raw.optional);
        objective.assigned_character = raw.assigned_character.clone();
        objective.conditions = conditions;
        Ok(objective)
    }
}

impl Quest {
    /// New unoffered quest with no objectives
    pub fn new(id: impl Into<String>, title: impl Into<String>, quest_type: QuestType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            quest_type,
            related_npcs: Vec::new(),
            objectives: Vec::new(),
            status: QuestStatus::Unoffered,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_related_npc(mut self, npc_id: impl Into<String>) -> Self {
        self.related_npcs.push(npc_id.into());
        self
    }

    /// Append an objective; IDs must be unique within the quest
    pub fn with_objective(mut self, objective: Objective) -> Result<Self, ContentError> {
        if self.get_objective(&objective.id).is_some() {
            return Err(ContentError::DuplicateObjective {
                quest_id: self.id,
                objective_id: objective.id,
            });
        }
        self.objectives.push(objective);
        Ok(self)
    }

    /// Check the objective rules the builders enforce, for quests built some
    /// other way (deserialized, or handed over by a quest source)
    pub fn validate(&self) -> Result<(), ContentError> {
        for (i, objective) in self.objectives.iter().enumerate() {
            if objective.required_count == 0 {
                return Err(ContentError::ZeroRequiredCount {
                    objective_id: objective.id.clone(),
                });
            }
            if self.objectives[..i].iter().any(|o| o.id == objective.id) {
                return Err(ContentError::DuplicateObjective {
                    quest_id: self.id.clone(),
                    objective_id: objective.id.clone(),
                });
            }
            if let Some(condition) = objective
                .conditions
                .iter()
                .find(|c| !c.fits(&objective.objective_type))
            {
                return Err(ContentError::ConditionKindMismatch {
                    objective_id: objective.id.clone(),
                    objective_type: objective.objective_type.tag(),
                    condition: condition.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Back to an unoffered quest with no progress
    pub(crate) fn reset_progress(&mut self) {
        self.status = QuestStatus::Unoffered;
        for objective in &mut self.objectives {
            objective.current_count = 0;
        }
    }

    /// Create a Quest from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, ContentError> {
        let quest_type = QuestType::from_str(&raw.quest_type)
            .ok_or_else(|| ContentError::UnknownQuestType(raw.quest_type.clone()))?;

        if raw.objectives.is_empty() {
            return Err(ContentError::NoObjectives {
                quest_id: raw.id.clone(),
            });
        }

        let mut quest = Quest::new(raw.id.clone(), raw.title.clone(), quest_type)
            .described(raw.description.clone());
        quest.related_npcs = raw.related_npcs.clone();

        for (i, o) in raw.objectives.iter().enumerate() {
            quest = quest.with_objective(Objective::from_raw(i, o)?)?;
        }

        Ok(quest)
    }

    /// Parse a single `[quest]` TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ContentError> {
        let raw: RawQuestFile =
            toml::from_str(content).map_err(|e| ContentError::Parse(e.to_string()))?;
        Quest::from_raw(&raw.quest)
    }
}
