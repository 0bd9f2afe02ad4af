//! Error Types
//!
//! Content errors are authoring defects and surface loudly from the loaders.
//! Transition errors are ordinary rejections the game logic branches on.

use thiserror::Error;

/// Defects in quest content, caught when the content is loaded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("quest '{quest_id}' has no objectives")]
    NoObjectives { quest_id: String },

    #[error("objective '{objective_id}' has required count 0")]
    ZeroRequiredCount { objective_id: String },

    #[error("quest '{quest_id}' declares objective '{objective_id}' more than once")]
    DuplicateObjective { quest_id: String, objective_id: String },

    #[error("invalid objective type '{tag}' at index {index}")]
    UnknownObjectiveType { tag: String, index: usize },

    #[error("invalid quest type '{0}'")]
    UnknownQuestType(String),

    #[error("condition key '{key}' is not valid for {objective_type} objective '{objective_id}'")]
    InvalidConditionKey {
        objective_id: String,
        objective_type: String,
        key: String,
    },

    #[error("condition of kind '{condition}' cannot apply to {objective_type} objective '{objective_id}'")]
    ConditionKindMismatch {
        objective_id: String,
        objective_type: String,
        condition: String,
    },

    #[error("failed to parse quest content: {0}")]
    Parse(String),
}

/// Rejected lifecycle transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("mission manager is not initialized")]
    NotInitialized,

    #[error("unknown quest '{0}'")]
    UnknownQuest(String),

    #[error("quest '{0}' is not offered")]
    NotOffered(String),

    #[error("quest '{0}' is not active")]
    NotActive(String),

    #[error("quest '{0}' is already active")]
    AlreadyActive(String),

    #[error("quest '{0}' has already ended")]
    AlreadyTerminal(String),

    #[error("main quest slot occupied by '{active}', cannot accept '{requested}'")]
    MainSlotOccupied { active: String, requested: String },

    #[error("no quest source configured to resolve '{0}'")]
    NoQuestSource(String),

    #[error("rejected malformed quest: {0}")]
    InvalidQuest(#[from] ContentError),
}

/// Event payloads that cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("{event} payload is missing '{field}'")]
    MissingField { event: String, field: String },
}

/// Failures of the key-value store behind persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("{0}")]
    Other(String),
}

/// Failures loading engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("main_character must not be empty")]
    EmptyMainCharacter,
}

/// Persisted mission state that cannot be restored
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}
