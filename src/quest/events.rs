//! Quest Event Types
//!
//! Events that can trigger quest objective progress, the table routing event
//! names to the objective types they satisfy, and the per-objective results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::definition::ObjectiveType;
use crate::error::EventError;

pub const NPC_INTERACTION: &str = "NPC_INTERACTION";
pub const AREA_EXPLORED: &str = "AREA_EXPLORED";
pub const PARTNER_SUMMONED: &str = "PARTNER_SUMMONED";
pub const ITEM_COLLECTED: &str = "ITEM_COLLECTED";
pub const ITEM_DELIVERED: &str = "ITEM_DELIVERED";
pub const BUILD_FIXED: &str = "BUILD_FIXED";
pub const CLUE_FOUND: &str = "CLUE_FOUND";

/// Events that can trigger quest progress.
///
/// `actor_id` is the player or companion who caused the event; when absent
/// the configured main character is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// An actor finished talking to an NPC
    NpcInteraction {
        npc_id: String,
        actor_id: Option<String>,
    },

    /// An actor entered an area
    AreaExplored {
        area: String,
        actor_id: Option<String>,
    },

    /// A companion was summoned
    PartnerSummoned {
        partner_id: String,
        actor_id: Option<String>,
    },

    /// An actor picked up an item
    ItemCollected {
        item_id: String,
        actor_id: Option<String>,
    },

    /// An actor handed over an item
    ItemDelivered {
        item_id: String,
        npc_id: Option<String>,
        actor_id: Option<String>,
    },

    /// An actor repaired a structure
    BuildFixed {
        build_id: String,
        actor_id: Option<String>,
    },

    /// An actor discovered a clue
    ClueFound {
        clue_id: String,
        actor_id: Option<String>,
    },

    /// Any event registered in [`EventRoutes`] under a custom name
    Custom {
        name: String,
        fields: BTreeMap<String, String>,
        actor_id: Option<String>,
    },
}

impl ProgressEvent {
    /// Wire name of the event
    pub fn name(&self) -> &str {
        match self {
            ProgressEvent::NpcInteraction { .. } => NPC_INTERACTION,
            ProgressEvent::AreaExplored { .. } => AREA_EXPLORED,
            ProgressEvent::PartnerSummoned { .. } => PARTNER_SUMMONED,
            ProgressEvent::ItemCollected { .. } => ITEM_COLLECTED,
            ProgressEvent::ItemDelivered { .. } => ITEM_DELIVERED,
            ProgressEvent::BuildFixed { .. } => BUILD_FIXED,
            ProgressEvent::ClueFound { .. } => CLUE_FOUND,
            ProgressEvent::Custom { name, .. } => name,
        }
    }

    /// Explicit actor, if the payload carried one
    pub fn actor_id(&self) -> Option<&str> {
        match self {
            ProgressEvent::NpcInteraction { actor_id, .. }
            | ProgressEvent::AreaExplored { actor_id, .. }
            | ProgressEvent::PartnerSummoned { actor_id, .. }
            | ProgressEvent::ItemCollected { actor_id, .. }
            | ProgressEvent::ItemDelivered { actor_id, .. }
            | ProgressEvent::BuildFixed { actor_id, .. }
            | ProgressEvent::ClueFound { actor_id, .. }
            | ProgressEvent::Custom { actor_id, .. } => actor_id.as_deref(),
        }
    }

    /// Value of a matchable field, keyed the way condition entries are
    pub fn field(&self, key: &str) -> Option<&str> {
        match (self, key) {
            (ProgressEvent::NpcInteraction { npc_id, .. }, "npc_id") => Some(npc_id),
            (ProgressEvent::AreaExplored { area, .. }, "area") => Some(area),
            (ProgressEvent::PartnerSummoned { partner_id, .. }, "partner_id") => Some(partner_id),
            (ProgressEvent::ItemCollected { item_id, .. }, "item_id") => Some(item_id),
            (ProgressEvent::ItemDelivered { item_id, .. }, "item_id") => Some(item_id),
            (ProgressEvent::ItemDelivered { npc_id, .. }, "npc_id") => npc_id.as_deref(),
            (ProgressEvent::BuildFixed { build_id, .. }, "build_id") => Some(build_id),
            (ProgressEvent::ClueFound { clue_id, .. }, "clue_id") => Some(clue_id),
            (ProgressEvent::Custom { fields, .. }, key) => fields.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// Decode a named event from its JSON payload.
    ///
    /// Built-in names require their subject field; any other name becomes a
    /// [`ProgressEvent::Custom`] whose fields are the payload's scalar values.
    pub fn from_json(name: &str, payload: &Value) -> Result<Self, EventError> {
        let actor_id = string_at(payload, &["actorId"]);
        let required = |path: &[&str]| {
            string_at(payload, path).ok_or_else(|| EventError::MissingField {
                event: name.to_string(),
                field: path.join("."),
            })
        };

        let event = match name {
            NPC_INTERACTION => ProgressEvent::NpcInteraction {
                npc_id: required(&["npc", "npcId"]).or_else(|e| required(&["npcId"]).map_err(|_| e))?,
                actor_id,
            },
            AREA_EXPLORED => ProgressEvent::AreaExplored {
                area: required(&["area"])?,
                actor_id,
            },
            PARTNER_SUMMONED => ProgressEvent::PartnerSummoned {
                partner_id: required(&["partnerId"])?,
                actor_id,
            },
            ITEM_COLLECTED => ProgressEvent::ItemCollected {
                item_id: required(&["itemId"])?,
                actor_id,
            },
            ITEM_DELIVERED => ProgressEvent::ItemDelivered {
                item_id: required(&["itemId"])?,
                npc_id: string_at(payload, &["npc", "npcId"]).or_else(|| string_at(payload, &["npcId"])),
                actor_id,
            },
            BUILD_FIXED => ProgressEvent::BuildFixed {
                build_id: required(&["buildId"])?,
                actor_id,
            },
            CLUE_FOUND => ProgressEvent::ClueFound {
                clue_id: required(&["clueId"])?,
                actor_id,
            },
            _ => ProgressEvent::Custom {
                name: name.to_string(),
                fields: scalar_fields(payload),
                actor_id,
            },
        };

        Ok(event)
    }
}

/// Follow a path of object keys to a string value
fn string_at(payload: &Value, path: &[&str]) -> Option<String> {
    let mut current = payload;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}

/// Top-level scalar values of a payload, stringified; `actorId` excluded
fn scalar_fields(payload: &Value) -> BTreeMap<String, String> {
    let Some(object) = payload.as_object() else {
        return BTreeMap::new();
    };
    object
        .iter()
        .filter(|(key, _)| key.as_str() != "actorId")
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}

/// Maps event names to the objective types they can satisfy
#[derive(Debug, Clone)]
pub struct EventRoutes {
    routes: HashMap<String, Vec<ObjectiveType>>,
}

impl Default for EventRoutes {
    fn default() -> Self {
        let mut routes = Self::empty();
        routes
            .register(NPC_INTERACTION, ObjectiveType::Talk)
            .register(AREA_EXPLORED, ObjectiveType::Explore)
            .register(PARTNER_SUMMONED, ObjectiveType::Assist)
            .register(ITEM_COLLECTED, ObjectiveType::Collect)
            .register(ITEM_DELIVERED, ObjectiveType::Deliver)
            .register(BUILD_FIXED, ObjectiveType::FixBuild)
            .register(CLUE_FOUND, ObjectiveType::Investigate);
        routes
    }
}

impl EventRoutes {
    /// Built-in routes
    pub fn new() -> Self {
        Self::default()
    }

    /// No routes at all; every event is ignored until registered
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Let `event_name` satisfy objectives of `objective_type`
    pub fn register(&mut self, event_name: &str, objective_type: ObjectiveType) -> &mut Self {
        let types = self.routes.entry(event_name.to_string()).or_default();
        if !types.contains(&objective_type) {
            types.push(objective_type);
        }
        self
    }

    pub fn objective_types(&self, event_name: &str) -> &[ObjectiveType] {
        self.routes.get(event_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_routed(&self, event_name: &str) -> bool {
        !self.objective_types(event_name).is_empty()
    }
}

/// Result of one objective advancing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectiveUpdate {
    pub quest_id: String,
    pub objective_id: String,
    /// Actor the progress was attributed to
    pub actor_id: String,
    pub current_count: u32,
    pub required_count: u32,
    /// Whether the objective was just completed
    pub objective_completed: bool,
    /// Whether this update completed the quest
    pub quest_completed: bool,
}
