//! Mission Manager
//!
//! The stateful engine: owns every quest the player has seen, the index sets
//! partitioning them by lifecycle status, and the state log. Each mutating
//! operation validates, updates memory, appends to the log, then writes a
//! snapshot. Writes are best-effort; memory stays the source of truth.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::events::{EventRoutes, ObjectiveUpdate, ProgressEvent};
use super::log::{LogEntry, LogKind, StateLog};
use super::registry::QuestSource;
use super::router;
use super::snapshot::{SNAPSHOT_VERSION, Snapshot};
use super::state::{IdSet, Quest, QuestStatus};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{StoreError, TransitionError};
use crate::storage::KeyValueStore;

/// Caller context recorded with offer/accept transitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionMeta {
    /// Who or what triggered the transition, e.g. an NPC ID
    pub source: Option<String>,
    pub note: Option<String>,
}

impl TransitionMeta {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            note: None,
        }
    }

    fn to_detail(&self) -> Value {
        match (&self.source, &self.note) {
            (None, None) => Value::Null,
            (source, note) => json!({ "source": source, "note": note }),
        }
    }
}

/// What [`MissionManager::initialize`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Already initialized; nothing changed
    AlreadyInitialized,
    /// No persisted state; starting empty
    Fresh,
    /// Persisted state restored
    Restored { quests: usize, log_entries: usize },
    /// Persisted state was unusable and was discarded
    Discarded { reason: String },
}

pub struct MissionManager {
    store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    source: Option<Rc<dyn QuestSource>>,
    routes: EventRoutes,
    config: EngineConfig,
    initialized: bool,

    quests: HashMap<String, Quest>,
    /// Registration order of `quests`
    quest_order: Vec<String>,
    offered: IdSet,
    active_main: Option<String>,
    active_subs: IdSet,
    completed: IdSet,
    abandoned: IdSet,
    failed: IdSet,
    state_log: StateLog,
}

impl MissionManager {
    pub fn new(store: Box<dyn KeyValueStore>, clock: Box<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            source: None,
            routes: EventRoutes::default(),
            config: EngineConfig::default(),
            initialized: false,
            quests: HashMap::new(),
            quest_order: Vec::new(),
            offered: IdSet::new(),
            active_main: None,
            active_subs: IdSet::new(),
            completed: IdSet::new(),
            abandoned: IdSet::new(),
            failed: IdSet::new(),
            state_log: StateLog::new(),
        }
    }

    /// Resolve quests offered by ID through `source`
    pub fn with_quest_source(mut self, source: Rc<dyn QuestSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_event_routes(mut self, routes: EventRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn routes_mut(&mut self) -> &mut EventRoutes {
        &mut self.routes
    }

    // ========================================================================
    // Startup / reset
    // ========================================================================

    /// Load persisted state. Idempotent; unusable state falls back to empty.
    pub fn initialize(&mut self, config: EngineConfig) -> InitOutcome {
        if self.initialized {
            debug!("Mission manager already initialized");
            return InitOutcome::AlreadyInitialized;
        }

        self.config = config;
        self.initialized = true;

        let outcome = match self.store.get(&self.config.storage_key) {
            Ok(None) => InitOutcome::Fresh,
            Ok(Some(json)) => match Snapshot::from_json(&json) {
                Ok(snapshot) => {
                    if snapshot.is_newer() {
                        warn!(
                            "Mission state written by snapshot version {} (engine supports {}), reading known fields only",
                            snapshot.version, SNAPSHOT_VERSION
                        );
                    }
                    let outcome = InitOutcome::Restored {
                        quests: snapshot.quests.len(),
                        log_entries: snapshot.state_log.len(),
                    };
                    self.restore(snapshot);
                    outcome
                }
                Err(e) => {
                    warn!("Discarding persisted mission state: {}", e);
                    InitOutcome::Discarded {
                        reason: e.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!("Failed to read persisted mission state: {}", e);
                InitOutcome::Discarded {
                    reason: e.to_string(),
                }
            }
        };

        info!(
            "Mission manager initialized for {}: {} quests, {} active",
            self.config.main_character,
            self.quests.len(),
            self.active_main.iter().count() + self.active_subs.len()
        );
        outcome
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.clear_state();
        for quest in snapshot.quests {
            self.quest_order.push(quest.id.clone());
            self.quests.insert(quest.id.clone(), quest);
        }
        self.offered = snapshot.offered;
        self.active_main = snapshot.active_main;
        self.active_subs = snapshot.active_subs;
        self.completed = snapshot.completed;
        self.abandoned = snapshot.abandoned;
        self.failed = snapshot.failed;
        self.state_log = snapshot.state_log;
    }

    fn clear_state(&mut self) {
        self.quests.clear();
        self.quest_order.clear();
        self.offered.clear();
        self.active_main = None;
        self.active_subs.clear();
        self.completed.clear();
        self.abandoned.clear();
        self.failed.clear();
        self.state_log.clear();
    }

    /// Forget all in-memory state so `initialize` can run again. Persisted
    /// data is left alone.
    pub fn reset(&mut self) {
        self.clear_state();
        self.initialized = false;
        info!("Mission manager reset");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_initialized(&self) -> Result<(), TransitionError> {
        if self.initialized {
            Ok(())
        } else {
            Err(TransitionError::NotInitialized)
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Make a quest known without offering it. Already known quests are kept
    /// as they are.
    pub fn register_quest(&mut self, quest: Quest) -> Result<(), TransitionError> {
        self.ensure_initialized()?;
        if self.quests.contains_key(&quest.id) {
            return Ok(());
        }
        self.insert_quest(quest)?;
        self.persist();
        Ok(())
    }

    /// Quests arrive from callers and quest sources, so their objectives are
    /// checked and any carried progress is dropped
    fn insert_quest(&mut self, mut quest: Quest) -> Result<(), TransitionError> {
        quest.validate()?;
        quest.reset_progress();
        debug!("Registered quest {}", quest.id);
        self.quest_order.push(quest.id.clone());
        self.quests.insert(quest.id.clone(), quest);
        Ok(())
    }

    /// Offer a quest, registering it first if needed. Offering an already
    /// offered quest succeeds without changes.
    pub fn offer_quest(&mut self, quest: Quest, meta: &TransitionMeta) -> Result<(), TransitionError> {
        self.ensure_initialized()?;
        let quest_id = quest.id.clone();
        if !self.quests.contains_key(&quest_id) {
            self.check_offerable_id(&quest_id)?;
            self.insert_quest(quest)?;
        }
        self.offer_registered(&quest_id, meta)
    }

    /// Offer a quest by ID, resolving unknown IDs through the quest source
    pub fn offer_quest_by_id(
        &mut self,
        quest_id: &str,
        meta: &TransitionMeta,
    ) -> Result<(), TransitionError> {
        self.ensure_initialized()?;
        if !self.quests.contains_key(quest_id) {
            let source = self
                .source
                .as_ref()
                .ok_or_else(|| TransitionError::NoQuestSource(quest_id.to_string()))?;
            let quest = source
                .get(quest_id)
                .ok_or_else(|| TransitionError::UnknownQuest(quest_id.to_string()))?;
            self.insert_quest(quest)?;
        }
        self.offer_registered(quest_id, meta)
    }

    // IDs left behind in an index set must never be re-registered
    fn check_offerable_id(&self, quest_id: &str) -> Result<(), TransitionError> {
        if self.active_main.as_deref() == Some(quest_id) || self.active_subs.contains(quest_id) {
            return Err(TransitionError::AlreadyActive(quest_id.to_string()));
        }
        if self.completed.contains(quest_id)
            || self.abandoned.contains(quest_id)
            || self.failed.contains(quest_id)
        {
            return Err(TransitionError::AlreadyTerminal(quest_id.to_string()));
        }
        Ok(())
    }

    fn offer_registered(&mut self, quest_id: &str, meta: &TransitionMeta) -> Result<(), TransitionError> {
        let quest = self
            .quests
            .get_mut(quest_id)
            .ok_or_else(|| TransitionError::UnknownQuest(quest_id.to_string()))?;

        match quest.status {
            QuestStatus::Unoffered => {}
            QuestStatus::Offered => return Ok(()),
            QuestStatus::Active => return Err(TransitionError::AlreadyActive(quest_id.to_string())),
            _ => return Err(TransitionError::AlreadyTerminal(quest_id.to_string())),
        }

        quest.status = QuestStatus::Offered;
        self.offered.insert(quest_id);
        self.log(LogEntry::new(
            LogKind::QuestOffered,
            quest_id,
            self.clock.now(),
            meta.to_detail(),
        ));
        info!("Offered quest {}", quest_id);
        self.persist();
        Ok(())
    }

    /// Accept an offered quest. Only one main quest may be active at a time.
    /// A quest with no required objectives completes on acceptance.
    pub fn accept_quest(&mut self, quest_id: &str, meta: &TransitionMeta) -> Result<(), TransitionError> {
        self.ensure_initialized()?;
        let quest = self
            .quests
            .get_mut(quest_id)
            .ok_or_else(|| TransitionError::UnknownQuest(quest_id.to_string()))?;

        match quest.status {
            QuestStatus::Offered => {}
            QuestStatus::Active => return Err(TransitionError::AlreadyActive(quest_id.to_string())),
            QuestStatus::Unoffered => return Err(TransitionError::NotOffered(quest_id.to_string())),
            _ => return Err(TransitionError::AlreadyTerminal(quest_id.to_string())),
        }

        let is_main = quest.is_main();
        if is_main {
            if let Some(active) = self.active_main.as_deref() {
                if active != quest_id {
                    return Err(TransitionError::MainSlotOccupied {
                        active: active.to_string(),
                        requested: quest_id.to_string(),
                    });
                }
            }
        }

        quest.status = QuestStatus::Active;
        self.offered.remove(quest_id);
        if is_main {
            self.active_main = Some(quest_id.to_string());
        } else {
            self.active_subs.insert(quest_id);
        }
        self.log(LogEntry::new(
            LogKind::QuestAccepted,
            quest_id,
            self.clock.now(),
            meta.to_detail(),
        ));
        info!("Accepted quest {}", quest_id);
        self.complete_if_done(quest_id);
        self.persist();
        Ok(())
    }

    /// Abandon an active quest
    pub fn abandon_quest(&mut self, quest_id: &str) -> Result<(), TransitionError> {
        self.end_active(quest_id, QuestStatus::Abandoned, Value::Null)?;
        info!("Abandoned quest {}", quest_id);
        Ok(())
    }

    /// Fail an active quest
    pub fn fail_quest(&mut self, quest_id: &str, reason: &str) -> Result<(), TransitionError> {
        self.end_active(quest_id, QuestStatus::Failed, json!({ "reason": reason }))?;
        info!("Failed quest {}: {}", quest_id, reason);
        Ok(())
    }

    fn end_active(&mut self, quest_id: &str, status: QuestStatus, detail: Value) -> Result<(), TransitionError> {
        self.ensure_initialized()?;
        let quest = self
            .quests
            .get_mut(quest_id)
            .ok_or_else(|| TransitionError::UnknownQuest(quest_id.to_string()))?;

        match quest.status {
            QuestStatus::Active => {}
            QuestStatus::Unoffered | QuestStatus::Offered => {
                return Err(TransitionError::NotActive(quest_id.to_string()));
            }
            _ => return Err(TransitionError::AlreadyTerminal(quest_id.to_string())),
        }

        quest.status = status;
        self.remove_from_active(quest_id);
        let kind = match status {
            QuestStatus::Failed => {
                self.failed.insert(quest_id);
                LogKind::QuestFailed
            }
            _ => {
                self.abandoned.insert(quest_id);
                LogKind::QuestAbandoned
            }
        };
        self.log(LogEntry::new(kind, quest_id, self.clock.now(), detail));
        self.persist();
        Ok(())
    }

    /// Move an active quest whose required objectives are all done to
    /// completed. Returns true if it did.
    fn complete_if_done(&mut self, quest_id: &str) -> bool {
        let Some(quest) = self.quests.get_mut(quest_id) else {
            return false;
        };
        if quest.status != QuestStatus::Active || !quest.is_complete() {
            return false;
        }

        quest.status = QuestStatus::Completed;
        self.remove_from_active(quest_id);
        self.completed.insert(quest_id);
        self.log(LogEntry::new(
            LogKind::QuestCompleted,
            quest_id,
            self.clock.now(),
            Value::Null,
        ));
        info!("Quest {} completed", quest_id);
        true
    }

    fn remove_from_active(&mut self, quest_id: &str) {
        if self.active_main.as_deref() == Some(quest_id) {
            self.active_main = None;
        }
        self.active_subs.remove(quest_id);
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Advance every active objective the event satisfies. Matches are
    /// chosen before anything changes; each quest's completion is decided
    /// after all of its matched objectives have advanced.
    pub fn route_progress_event(&mut self, event: &ProgressEvent) -> Vec<ObjectiveUpdate> {
        if !self.initialized {
            warn!("Ignoring {} before initialization", event.name());
            return Vec::new();
        }

        let actor = router::effective_actor(event, &self.config.main_character).to_string();
        let active = self
            .active_main
            .iter()
            .map(String::as_str)
            .chain(self.active_subs.iter())
            .filter_map(|id| self.quests.get(id));
        let candidates = router::find_candidates(active, event, &actor, &self.routes);

        // candidates come grouped by quest
        let mut updates = Vec::new();
        for group in candidates.chunk_by(|a, b| a.0 == b.0) {
            let Some((quest_id, _)) = group.first() else {
                continue;
            };
            let mut quest_updates: Vec<ObjectiveUpdate> = group
                .iter()
                .filter_map(|(_, index)| self.apply_progress(quest_id, *index, &actor))
                .collect();
            if !quest_updates.is_empty() && self.complete_if_done(quest_id) {
                if let Some(last) = quest_updates.last_mut() {
                    last.quest_completed = true;
                }
            }
            updates.append(&mut quest_updates);
        }

        if updates.is_empty() {
            debug!("Event {} matched no objectives", event.name());
        } else {
            self.persist();
        }
        updates
    }

    /// Decode a named JSON event and route it. Unrouted names and payloads
    /// missing their subject are ignored.
    pub fn route_named_event(&mut self, name: &str, payload: &Value) -> Vec<ObjectiveUpdate> {
        if !self.routes.is_routed(name) {
            debug!("Ignoring unrouted event {}", name);
            return Vec::new();
        }
        match ProgressEvent::from_json(name, payload) {
            Ok(event) => self.route_progress_event(&event),
            Err(e) => {
                warn!("Ignoring malformed event: {}", e);
                Vec::new()
            }
        }
    }

    fn apply_progress(&mut self, quest_id: &str, index: usize, actor: &str) -> Option<ObjectiveUpdate> {
        let now = self.clock.now();
        let quest = self.quests.get_mut(quest_id)?;
        if quest.status != QuestStatus::Active {
            return None;
        }

        let objective = quest.objective_mut(index)?;
        if !objective.advance() {
            return None;
        }
        let objective_id = objective.id.clone();
        let current_count = objective.current_count();
        let required_count = objective.required_count();
        let objective_completed = objective.is_completed();

        self.log(
            LogEntry::new(
                LogKind::ObjectiveUpdate,
                quest_id,
                now,
                json!({ "current": current_count, "required": required_count, "actor": actor }),
            )
            .for_objective(&objective_id),
        );
        debug!(
            "{} progressed objective {} for quest {}: {}/{}",
            actor, objective_id, quest_id, current_count, required_count
        );

        Some(ObjectiveUpdate {
            quest_id: quest_id.to_string(),
            objective_id,
            actor_id: actor.to_string(),
            current_count,
            required_count,
            objective_completed,
            quest_completed: false,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_quest(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.get(quest_id)
    }

    /// All known quests in registration order
    pub fn quests(&self) -> impl Iterator<Item = &Quest> {
        self.quest_order.iter().filter_map(|id| self.quests.get(id))
    }

    pub fn offered(&self) -> &IdSet {
        &self.offered
    }

    pub fn active_main(&self) -> Option<&str> {
        self.active_main.as_deref()
    }

    pub fn active_subs(&self) -> &IdSet {
        &self.active_subs
    }

    pub fn completed(&self) -> &IdSet {
        &self.completed
    }

    pub fn abandoned(&self) -> &IdSet {
        &self.abandoned
    }

    pub fn failed(&self) -> &IdSet {
        &self.failed
    }

    pub fn state_log(&self) -> &StateLog {
        &self.state_log
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// The current persistence image
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            quests: self.quests().cloned().collect(),
            offered: self.offered.clone(),
            active_main: self.active_main.clone(),
            active_subs: self.active_subs.clone(),
            completed: self.completed.clone(),
            abandoned: self.abandoned.clone(),
            failed: self.failed.clone(),
            state_log: self.state_log.clone(),
        }
    }

    fn log(&mut self, entry: LogEntry) {
        self.state_log.append(entry);
    }

    fn persist(&mut self) {
        let result = self
            .snapshot()
            .to_json()
            .map_err(StoreError::from)
            .and_then(|json| self.store.set(&self.config.storage_key, &json));
        if let Err(e) = result {
            warn!("Failed to persist mission state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ContentError;
    use crate::quest::definition::{Condition, ObjectiveType, QuestType};
    use crate::quest::state::Objective;
    use crate::quest::events::{AREA_EXPLORED, NPC_INTERACTION, PARTNER_SUMMONED};
    use crate::quest::registry::QuestRegistry;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::path::Path;

    const MAIN_BRANCH: &str = r#"
[quest]
id = "main_branch"
title = "Branching Paths"
type = "main"

[[quest.objectives]]
id = "talk_npc"
type = "talk"
[[quest.objectives.conditions]]
npc_id = "npc_main"

[[quest.objectives]]
id = "explore_a"
type = "explore"
[[quest.objectives.conditions]]
area = "zone_a"

[[quest.objectives]]
id = "explore_b"
type = "explore"
optional = true
[[quest.objectives.conditions]]
area = "zone_b"
"#;

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Other("disk on fire".to_string()))
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Other("disk on fire".to_string()))
        }

        fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn manager_with(store: MemoryStore, clock: ManualClock) -> MissionManager {
        let mut manager = MissionManager::new(Box::new(store), Box::new(clock));
        manager.initialize(EngineConfig::new("jett"));
        manager
    }

    fn manager() -> MissionManager {
        manager_with(MemoryStore::new(), ManualClock::new(start()))
    }

    fn sub_quest(id: &str) -> Quest {
        Quest::new(id, id, QuestType::Sub)
            .with_objective(
                Objective::new("explore", ObjectiveType::Explore, 1)
                    .unwrap()
                    .with_condition(Condition::Area {
                        area: Some(format!("{}_area", id)),
                    })
                    .unwrap(),
            )
            .unwrap()
    }

    fn main_quest(id: &str) -> Quest {
        let mut quest = sub_quest(id);
        quest.quest_type = QuestType::Main;
        quest
    }

    fn offer_and_accept(manager: &mut MissionManager, quest: Quest) {
        let quest_id = quest.id.clone();
        manager.offer_quest(quest, &TransitionMeta::default()).unwrap();
        manager.accept_quest(&quest_id, &TransitionMeta::default()).unwrap();
    }

    fn explored(area: &str) -> ProgressEvent {
        ProgressEvent::AreaExplored {
            area: area.to_string(),
            actor_id: None,
        }
    }

    #[test]
    fn test_main_branch_completes_without_optional_objective() {
        let mut manager = manager();
        offer_and_accept(&mut manager, Quest::from_toml_str(MAIN_BRANCH).unwrap());
        assert_eq!(manager.active_main(), Some("main_branch"));

        let updates = manager.route_named_event(NPC_INTERACTION, &json!({ "npc": { "npcId": "npc_main" } }));
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].quest_completed);
        assert_eq!(updates[0].actor_id, "jett");

        let updates = manager.route_named_event(AREA_EXPLORED, &json!({ "area": "zone_a" }));
        assert_eq!(updates.len(), 1);
        assert!(updates[0].quest_completed);

        let quest = manager.get_quest("main_branch").unwrap();
        assert_eq!(quest.status(), QuestStatus::Completed);
        assert_eq!(quest.get_objective("explore_b").unwrap().current_count(), 0);
        assert_eq!(manager.active_main(), None);
        assert!(manager.completed().contains("main_branch"));

        let kinds: Vec<LogKind> = manager.state_log().entries().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                LogKind::QuestOffered,
                LogKind::QuestAccepted,
                LogKind::ObjectiveUpdate,
                LogKind::ObjectiveUpdate,
                LogKind::QuestCompleted,
            ]
        );
    }

    #[test]
    fn test_second_main_quest_rejected() {
        let mut manager = manager();
        offer_and_accept(&mut manager, main_quest("chapter_1"));
        manager
            .offer_quest(main_quest("chapter_2"), &TransitionMeta::default())
            .unwrap();

        let err = manager
            .accept_quest("chapter_2", &TransitionMeta::default())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::MainSlotOccupied {
                active: "chapter_1".to_string(),
                requested: "chapter_2".to_string(),
            }
        );
        assert_eq!(manager.active_main(), Some("chapter_1"));
        assert_eq!(manager.get_quest("chapter_2").unwrap().status(), QuestStatus::Offered);
        assert!(manager.offered().contains("chapter_2"));

        // slot frees up once the first main quest completes
        manager.route_progress_event(&explored("chapter_1_area"));
        manager
            .accept_quest("chapter_2", &TransitionMeta::default())
            .unwrap();
        assert_eq!(manager.active_main(), Some("chapter_2"));
    }

    #[test]
    fn test_double_accept_rejected() {
        let mut manager = manager();
        manager.offer_quest(sub_quest("q1"), &TransitionMeta::default()).unwrap();
        manager.accept_quest("q1", &TransitionMeta::default()).unwrap();

        let log_len = manager.state_log().len();
        let err = manager.accept_quest("q1", &TransitionMeta::default()).unwrap_err();
        assert_eq!(err, TransitionError::AlreadyActive("q1".to_string()));
        assert_eq!(manager.get_quest("q1").unwrap().status(), QuestStatus::Active);
        assert_eq!(manager.active_subs().as_slice(), &["q1".to_string()]);
        assert_eq!(manager.state_log().len(), log_len);
    }

    #[test]
    fn test_accept_requires_offer() {
        let mut manager = manager();
        assert_eq!(
            manager.accept_quest("nope", &TransitionMeta::default()),
            Err(TransitionError::UnknownQuest("nope".to_string()))
        );
        manager.register_quest(sub_quest("q1")).unwrap();
        assert_eq!(manager.get_quest("q1").unwrap().status(), QuestStatus::Unoffered);
        assert_eq!(
            manager.accept_quest("q1", &TransitionMeta::default()),
            Err(TransitionError::NotOffered("q1".to_string()))
        );
    }

    #[test]
    fn test_offer_rules() {
        let mut manager = manager();
        let meta = TransitionMeta::from_source("npc_elder");
        manager.offer_quest(sub_quest("q1"), &meta).unwrap();
        // re-offer is a no-op
        manager.offer_quest(sub_quest("q1"), &meta).unwrap();
        assert_eq!(manager.offered().len(), 1);
        assert_eq!(manager.state_log().count_of(&LogKind::QuestOffered), 1);
        assert_eq!(manager.state_log().entries()[0].detail["source"], "npc_elder");

        manager.accept_quest("q1", &meta).unwrap();
        assert_eq!(
            manager.offer_quest(sub_quest("q1"), &meta),
            Err(TransitionError::AlreadyActive("q1".to_string()))
        );

        manager.abandon_quest("q1").unwrap();
        assert_eq!(
            manager.offer_quest(sub_quest("q1"), &meta),
            Err(TransitionError::AlreadyTerminal("q1".to_string()))
        );
    }

    #[test]
    fn test_abandon_and_fail() {
        let mut manager = manager();
        offer_and_accept(&mut manager, main_quest("m"));
        offer_and_accept(&mut manager, sub_quest("s"));

        manager.abandon_quest("m").unwrap();
        assert_eq!(manager.active_main(), None);
        assert!(manager.abandoned().contains("m"));
        assert_eq!(manager.get_quest("m").unwrap().status(), QuestStatus::Abandoned);

        manager.fail_quest("s", "escort died").unwrap();
        assert!(manager.active_subs().is_empty());
        assert!(manager.failed().contains("s"));
        assert_eq!(manager.state_log().last().unwrap().detail["reason"], "escort died");

        assert_eq!(
            manager.abandon_quest("m"),
            Err(TransitionError::AlreadyTerminal("m".to_string()))
        );
        manager.offer_quest(sub_quest("o"), &TransitionMeta::default()).unwrap();
        assert_eq!(
            manager.abandon_quest("o"),
            Err(TransitionError::NotActive("o".to_string()))
        );

        // terminal quests ignore further events
        assert!(manager.route_progress_event(&explored("s_area")).is_empty());
    }

    #[test]
    fn test_companion_bound_objective() {
        let mut manager = manager();
        let quest = Quest::new("summon", "Call Dizzy", QuestType::Side)
            .with_objective(
                Objective::new("assist", ObjectiveType::Assist, 1)
                    .unwrap()
                    .assigned_to("dizzy"),
            )
            .unwrap();
        offer_and_accept(&mut manager, quest);

        let updates = manager.route_named_event(
            PARTNER_SUMMONED,
            &json!({ "partnerId": "dizzy", "actorId": "jett" }),
        );
        assert!(updates.is_empty());
        assert_eq!(
            manager.get_quest("summon").unwrap().objectives()[0].current_count(),
            0
        );

        let updates = manager.route_named_event(
            PARTNER_SUMMONED,
            &json!({ "partnerId": "dizzy", "actorId": "dizzy" }),
        );
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].actor_id, "dizzy");
        assert_eq!(manager.get_quest("summon").unwrap().status(), QuestStatus::Completed);
    }

    #[test]
    fn test_unrouted_event_is_noop() {
        let mut manager = manager();
        offer_and_accept(&mut manager, sub_quest("q1"));
        let before = manager.snapshot();

        assert!(manager.route_named_event("WEATHER_CHANGED", &json!({ "area": "q1_area" })).is_empty());
        // known event with a broken payload
        assert!(manager.route_named_event(AREA_EXPLORED, &json!({ "zone": "q1_area" })).is_empty());

        assert_eq!(manager.snapshot(), before);
    }

    #[test]
    fn test_one_event_many_quests() {
        let mut manager = manager();
        let counted = |id: &str, required: u32| {
            Quest::new(id, id, QuestType::Sub)
                .with_objective(Objective::new("visit", ObjectiveType::Explore, required).unwrap())
                .unwrap()
        };
        offer_and_accept(&mut manager, counted("a", 1));
        offer_and_accept(&mut manager, counted("b", 2));

        let updates = manager.route_progress_event(&explored("anywhere"));
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].quest_id, "a");
        assert!(updates[0].quest_completed);
        assert_eq!(updates[1].quest_id, "b");
        assert_eq!(updates[1].current_count, 1);
        assert!(!updates[1].quest_completed);

        let kinds: Vec<(LogKind, &str)> = manager
            .state_log()
            .entries()
            .iter()
            .skip(4)
            .map(|e| (e.kind.clone(), e.quest_id.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (LogKind::ObjectiveUpdate, "a"),
                (LogKind::QuestCompleted, "a"),
                (LogKind::ObjectiveUpdate, "b"),
            ]
        );

        manager.route_progress_event(&explored("anywhere"));
        assert_eq!(manager.completed().iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(manager.active_subs().is_empty());
    }

    #[test]
    fn test_round_trip_through_store() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(start());
        let mut manager = manager_with(store.clone(), clock.clone());

        offer_and_accept(&mut manager, Quest::from_toml_str(MAIN_BRANCH).unwrap());
        clock.advance(Duration::minutes(5));
        manager.route_named_event(NPC_INTERACTION, &json!({ "npc": { "npcId": "npc_main" } }));
        offer_and_accept(&mut manager, sub_quest("side"));
        manager.offer_quest(sub_quest("later"), &TransitionMeta::default()).unwrap();
        offer_and_accept(&mut manager, sub_quest("dropped"));
        manager.abandon_quest("dropped").unwrap();

        let before = manager.snapshot();
        manager.reset();
        assert!(!manager.is_initialized());
        assert!(manager.get_quest("main_branch").is_none());
        assert!(manager.state_log().is_empty());

        let outcome = manager.initialize(EngineConfig::new("jett"));
        assert_eq!(
            outcome,
            InitOutcome::Restored {
                quests: 4,
                log_entries: before.state_log.len(),
            }
        );
        assert_eq!(manager.snapshot(), before);
        assert_eq!(
            manager.get_quest("main_branch").unwrap().get_objective("talk_npc").unwrap().current_count(),
            1
        );
        assert_eq!(manager.state_log().entries()[2].timestamp, start() + Duration::minutes(5));

        // a second manager over the same store sees the same state
        let other = manager_with(store, clock);
        assert_eq!(other.snapshot(), before);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut manager = manager();
        offer_and_accept(&mut manager, sub_quest("q1"));
        assert_eq!(
            manager.initialize(EngineConfig::new("someone_else")),
            InitOutcome::AlreadyInitialized
        );
        assert_eq!(manager.config().main_character, "jett");
        assert!(manager.get_quest("q1").is_some());
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_empty() {
        let mut store = MemoryStore::new();
        store.set("mission_state", "{\"version\": 1, \"quests\": 7}").unwrap();
        let mut manager = MissionManager::new(Box::new(store.clone()), Box::new(ManualClock::new(start())));
        assert!(matches!(
            manager.initialize(EngineConfig::new("jett")),
            InitOutcome::Discarded { .. }
        ));
        assert!(manager.is_initialized());
        assert_eq!(manager.quests().count(), 0);

        // the engine keeps working and overwrites the bad snapshot
        offer_and_accept(&mut manager, sub_quest("q1"));
        let saved = store.get("mission_state").unwrap().unwrap();
        assert!(Snapshot::from_json(&saved).is_ok());
    }

    #[test]
    fn test_store_failures_are_not_fatal() {
        let mut manager = MissionManager::new(Box::new(FailingStore), Box::new(ManualClock::new(start())));
        assert!(matches!(
            manager.initialize(EngineConfig::new("jett")),
            InitOutcome::Discarded { .. }
        ));
        offer_and_accept(&mut manager, sub_quest("q1"));
        let updates = manager.route_progress_event(&explored("q1_area"));
        assert_eq!(updates.len(), 1);
        assert_eq!(manager.get_quest("q1").unwrap().status(), QuestStatus::Completed);
    }

    #[test]
    fn test_operations_before_initialize() {
        let mut manager = MissionManager::new(Box::new(MemoryStore::new()), Box::new(ManualClock::new(start())));
        assert_eq!(
            manager.offer_quest(sub_quest("q1"), &TransitionMeta::default()),
            Err(TransitionError::NotInitialized)
        );
        assert!(manager.route_progress_event(&explored("q1_area")).is_empty());
    }

    #[test]
    fn test_offer_by_id_uses_source() {
        let mut registry = QuestRegistry::new(Path::new("unused"));
        registry.insert(sub_quest("from_content"));

        let mut bare = manager();
        assert_eq!(
            bare.offer_quest_by_id("from_content", &TransitionMeta::default()),
            Err(TransitionError::NoQuestSource("from_content".to_string()))
        );

        let mut manager = MissionManager::new(Box::new(MemoryStore::new()), Box::new(ManualClock::new(start())))
            .with_quest_source(Rc::new(registry));
        manager.initialize(EngineConfig::new("jett"));
        manager
            .offer_quest_by_id("from_content", &TransitionMeta::default())
            .unwrap();
        assert!(manager.offered().contains("from_content"));
        assert_eq!(
            manager.offer_quest_by_id("missing", &TransitionMeta::default()),
            Err(TransitionError::UnknownQuest("missing".to_string()))
        );
    }

    #[test]
    fn test_custom_event_routes() {
        let mut routes = EventRoutes::new();
        routes.register("DRONE_REPAIRED", ObjectiveType::Custom("repair_drone".to_string()));

        let mut manager = MissionManager::new(Box::new(MemoryStore::new()), Box::new(ManualClock::new(start())))
            .with_event_routes(routes);
        manager.initialize(EngineConfig::new("jett"));

        let quest = Quest::from_toml_str(
            r#"
[quest]
id = "drones"
title = "Drone Trouble"
type = "side"
[[quest.objectives]]
id = "repair"
type = "custom:repair_drone"
count = 2
[[quest.objectives.conditions]]
sector = "north"
"#,
        )
        .unwrap();
        offer_and_accept(&mut manager, quest);

        assert!(manager.route_named_event("DRONE_REPAIRED", &json!({ "sector": "south" })).is_empty());
        let updates = manager.route_named_event("DRONE_REPAIRED", &json!({ "sector": "north", "drone": "d1" }));
        assert_eq!(updates[0].current_count, 1);
    }

    #[test]
    fn test_unrouted_typed_event_is_noop() {
        let mut manager = manager();
        let quest = Quest::new("drones", "Drones", QuestType::Side)
            .with_objective(
                Objective::new("recover", ObjectiveType::Custom("drone".to_string()), 1).unwrap(),
            )
            .unwrap();
        offer_and_accept(&mut manager, quest);
        let log_len = manager.state_log().len();

        let lost = ProgressEvent::Custom {
            name: "DRONE_LOST".to_string(),
            fields: std::collections::BTreeMap::new(),
            actor_id: None,
        };
        assert!(manager.route_progress_event(&lost).is_empty());
        assert_eq!(manager.state_log().len(), log_len);
        assert_eq!(manager.get_quest("drones").unwrap().objectives()[0].current_count(), 0);

        manager
            .routes_mut()
            .register("DRONE_LOST", ObjectiveType::Custom("drone".to_string()));
        let updates = manager.route_progress_event(&lost);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].quest_completed);
    }

    fn quest_from_json(objectives: Value) -> Quest {
        serde_json::from_value(json!({
            "id": "carried",
            "title": "Carried Over",
            "type": "sub",
            "status": "completed",
            "objectives": objectives,
        }))
        .unwrap()
    }

    #[test]
    fn test_offer_drops_carried_progress() {
        let store = MemoryStore::new();
        let mut manager = manager_with(store.clone(), ManualClock::new(start()));
        let quest = quest_from_json(json!([
            { "id": "a", "type": "explore", "requiredCount": 2, "currentCount": 9 }
        ]));

        manager.offer_quest(quest, &TransitionMeta::default()).unwrap();
        let quest = manager.get_quest("carried").unwrap();
        assert_eq!(quest.status(), QuestStatus::Offered);
        assert_eq!(quest.objectives()[0].current_count(), 0);

        // what was written can be restored
        let saved = store.get("mission_state").unwrap().unwrap();
        assert!(Snapshot::from_json(&saved).is_ok());
    }

    #[test]
    fn test_malformed_quests_rejected() {
        let mut manager = manager();
        let duplicate = quest_from_json(json!([
            { "id": "a", "type": "explore", "requiredCount": 2, "currentCount": 9 },
            { "id": "a", "type": "explore", "requiredCount": 1 }
        ]));
        assert!(matches!(
            manager.offer_quest(duplicate, &TransitionMeta::default()),
            Err(TransitionError::InvalidQuest(ContentError::DuplicateObjective { .. }))
        ));

        let zero = quest_from_json(json!([{ "id": "a", "type": "explore", "requiredCount": 0 }]));
        assert!(matches!(
            manager.register_quest(zero.clone()),
            Err(TransitionError::InvalidQuest(ContentError::ZeroRequiredCount { .. }))
        ));
        assert!(manager.get_quest("carried").is_none());
        assert!(manager.state_log().is_empty());

        // a quest source is held to the same rules
        let mut registry = QuestRegistry::new(Path::new("unused"));
        registry.insert(zero);
        let mut sourced = MissionManager::new(Box::new(MemoryStore::new()), Box::new(ManualClock::new(start())))
            .with_quest_source(Rc::new(registry));
        sourced.initialize(EngineConfig::new("jett"));
        assert!(matches!(
            sourced.offer_quest_by_id("carried", &TransitionMeta::default()),
            Err(TransitionError::InvalidQuest(_))
        ));
        assert_eq!(sourced.quests().count(), 0);
    }

    #[test]
    fn test_quest_without_required_objectives_completes_on_accept() {
        let mut manager = manager();
        let bonus_only = Quest::new("bonus", "Bonus", QuestType::Side)
            .with_objective(
                Objective::new("extra", ObjectiveType::Explore, 1)
                    .unwrap()
                    .optional(true),
            )
            .unwrap();
        offer_and_accept(&mut manager, bonus_only);

        assert_eq!(manager.get_quest("bonus").unwrap().status(), QuestStatus::Completed);
        assert!(manager.completed().contains("bonus"));
        assert!(manager.active_subs().is_empty());
        let kinds: Vec<LogKind> = manager.state_log().entries().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![LogKind::QuestOffered, LogKind::QuestAccepted, LogKind::QuestCompleted]
        );

        // the optional objective no longer matters
        assert!(manager.route_progress_event(&explored("anywhere")).is_empty());
        assert_eq!(manager.state_log().count_of(&LogKind::QuestCompleted), 1);

        offer_and_accept(&mut manager, Quest::new("empty", "Empty", QuestType::Main));
        assert_eq!(manager.get_quest("empty").unwrap().status(), QuestStatus::Completed);
        assert_eq!(manager.active_main(), None);
    }

    #[test]
    fn test_objective_order_does_not_change_outcome() {
        let talk = |id: &str, optional: bool| {
            Objective::new(id, ObjectiveType::Talk, 1)
                .unwrap()
                .optional(optional)
                .with_condition(Condition::Npc {
                    npc_id: Some("elder".to_string()),
                })
                .unwrap()
        };
        let elder = ProgressEvent::NpcInteraction {
            npc_id: "elder".to_string(),
            actor_id: None,
        };

        for optional_first in [true, false] {
            let objectives = if optional_first {
                [talk("bonus", true), talk("main", false)]
            } else {
                [talk("main", false), talk("bonus", true)]
            };
            let mut quest = Quest::new("greet", "Greet", QuestType::Sub);
            for objective in objectives {
                quest = quest.with_objective(objective).unwrap();
            }

            let mut manager = manager();
            offer_and_accept(&mut manager, quest);
            let updates = manager.route_progress_event(&elder);

            let quest = manager.get_quest("greet").unwrap();
            assert_eq!(quest.status(), QuestStatus::Completed);
            assert_eq!(quest.get_objective("bonus").unwrap().current_count(), 1);
            assert_eq!(quest.get_objective("main").unwrap().current_count(), 1);
            assert_eq!(updates.len(), 2);
            assert!(!updates[0].quest_completed);
            assert!(updates[1].quest_completed);
            assert_eq!(manager.state_log().count_of(&LogKind::QuestCompleted), 1);
            assert_eq!(manager.state_log().last().unwrap().kind, LogKind::QuestCompleted);
        }
    }

    proptest! {
        #[test]
        fn prop_counts_stay_in_bounds(
            required in 1u32..5,
            areas in proptest::collection::vec(0usize..3, 0..20),
        ) {
            let mut manager = manager();
            let quest = Quest::new("q", "Q", QuestType::Sub)
                .with_objective(
                    Objective::new("go", ObjectiveType::Explore, required)
                        .unwrap()
                        .with_condition(Condition::Area { area: Some("area_0".to_string()) })
                        .unwrap(),
                )
                .unwrap();
            offer_and_accept(&mut manager, quest);

            for area in areas {
                manager.route_progress_event(&explored(&format!("area_{}", area)));
                let objective = &manager.get_quest("q").unwrap().objectives()[0];
                prop_assert!(objective.current_count() <= objective.required_count());
            }

            let quest = manager.get_quest("q").unwrap();
            let done = quest.objectives()[0].is_completed();
            prop_assert_eq!(quest.status() == QuestStatus::Completed, done);
            prop_assert_eq!(manager.completed().contains("q"), done);
            prop_assert_eq!(manager.active_subs().contains("q"), !done);
        }
    }
}
