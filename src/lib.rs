//! Mission/quest progress engine.
//!
//! Quests are loaded from TOML content, offered and accepted through the
//! [`MissionManager`], and advanced by gameplay events. State is persisted
//! as a versioned JSON snapshot through a [`KeyValueStore`].

pub mod clock;
pub mod config;
pub mod error;
pub mod quest;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{ConfigError, ContentError, EventError, SnapshotError, StoreError, TransitionError};
pub use quest::{
    EventRoutes, InitOutcome, MissionManager, ObjectiveUpdate, ProgressEvent, Quest, QuestRegistry,
    QuestSource, QuestStatus, TransitionMeta,
};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
