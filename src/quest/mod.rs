//! Quest System Module
//!
//! TOML-defined quests whose objectives advance from gameplay events. The
//! [`MissionManager`] owns per-player quest state; the router decides which
//! objectives an event satisfies.

pub mod definition;
pub mod state;
pub mod events;
pub mod router;
pub mod log;
pub mod snapshot;
pub mod registry;
pub mod manager;

pub use definition::{Condition, ObjectiveType, QuestType};
pub use state::{IdSet, Objective, ObjectiveStatus, Quest, QuestStatus};
pub use events::{EventRoutes, ObjectiveUpdate, ProgressEvent};
pub use log::{LogEntry, LogKind, StateLog};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use registry::{LoadReport, QuestRegistry, QuestSource};
pub use manager::{InitOutcome, MissionManager, TransitionMeta};
