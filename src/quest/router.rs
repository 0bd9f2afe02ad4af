//! Progress Routing
//!
//! Pure functions deciding which objectives an event advances. Nothing here
//! mutates state; the mission manager applies the matches in order.

use super::definition::Condition;
use super::events::{EventRoutes, ProgressEvent};
use super::state::{Objective, Quest, QuestStatus};

/// The actor an event is attributed to
pub fn effective_actor<'a>(event: &'a ProgressEvent, main_character: &'a str) -> &'a str {
    event.actor_id().unwrap_or(main_character)
}

fn pin<'a>(key: &'static str, value: &'a Option<String>) -> Option<(&'a str, &'a str)> {
    value.as_deref().map(|v| (key, v))
}

/// Fields a condition entry pins, as (event field key, expected value)
fn pinned_fields(condition: &Condition) -> Vec<(&str, &str)> {
    match condition {
        Condition::Npc { npc_id } => pin("npc_id", npc_id).into_iter().collect(),
        Condition::Area { area } => pin("area", area).into_iter().collect(),
        Condition::Partner { partner_id } => pin("partner_id", partner_id).into_iter().collect(),
        Condition::Item { item_id } => pin("item_id", item_id).into_iter().collect(),
        Condition::Delivery { item_id, npc_id } => pin("item_id", item_id)
            .into_iter()
            .chain(pin("npc_id", npc_id))
            .collect(),
        Condition::Build { build_id } => pin("build_id", build_id).into_iter().collect(),
        Condition::Clue { clue_id } => pin("clue_id", clue_id).into_iter().collect(),
        Condition::Fields { fields } => fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect(),
    }
}

/// AND within an entry: every pinned field must equal the event's
pub fn condition_matches(condition: &Condition, event: &ProgressEvent) -> bool {
    pinned_fields(condition)
        .into_iter()
        .all(|(key, expected)| event.field(key) == Some(expected))
}

/// OR across entries; an objective without conditions accepts any event
pub fn conditions_match(conditions: &[Condition], event: &ProgressEvent) -> bool {
    conditions.is_empty() || conditions.iter().any(|c| condition_matches(c, event))
}

/// Whether the event advances this objective when attributed to `actor`
pub fn objective_matches(
    objective: &Objective,
    event: &ProgressEvent,
    actor: &str,
    routes: &EventRoutes,
) -> bool {
    if objective.is_completed() {
        return false;
    }
    if !routes.objective_types(event.name()).contains(&objective.objective_type) {
        return false;
    }
    if let Some(assigned) = &objective.assigned_character {
        if assigned != actor {
            return false;
        }
    }
    conditions_match(objective.conditions(), event)
}

/// All (quest id, objective index) pairs the event advances, in the order
/// the quests are given
pub fn find_candidates<'a>(
    quests: impl IntoIterator<Item = &'a Quest>,
    event: &ProgressEvent,
    actor: &str,
    routes: &EventRoutes,
) -> Vec<(String, usize)> {
    quests
        .into_iter()
        .filter(|quest| quest.status() == QuestStatus::Active)
        .flat_map(|quest| {
            quest
                .objectives()
                .iter()
                .enumerate()
                .filter(|(_, objective)| objective_matches(objective, event, actor, routes))
                .map(|(index, _)| (quest.id.clone(), index))
                .collect::<Vec<_>>()
        })
        .collect()
}
