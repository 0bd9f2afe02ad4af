use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use mission_engine::{
    EngineConfig, InitOutcome, JsonFileStore, MissionManager, QuestRegistry, SystemClock,
    TransitionMeta,
};

// ============================================================================
// Replay Script
// ============================================================================

/// One line of a replay script
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Offer { offer: String },
    Accept { accept: String },
    Abandon { abandon: String },
    Fail { fail: String, reason: String },
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Replay a JSON-lines script of quest transitions and gameplay events
#[derive(Parser)]
#[command(name = "mission-engine", version)]
struct Args {
    /// Engine configuration (TOML)
    config: PathBuf,

    /// Content directory; quests are read from its `quests/` subdirectory
    content_dir: PathBuf,

    /// Script with one JSON object per line
    events: PathBuf,

    /// Directory holding the persisted mission state
    #[arg(default_value = "state")]
    state_dir: PathBuf,
}

fn replay(manager: &mut MissionManager, events: &Path) -> Result<(), String> {
    let file = std::fs::File::open(events)
        .map_err(|e| format!("Failed to open {:?}: {}", events, e))?;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| format!("Failed to read {:?}: {}", events, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed: ReplayLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Line {}: skipping unreadable entry: {}", line_no, e);
                continue;
            }
        };

        let meta = TransitionMeta::from_source("replay");
        let result = match parsed {
            ReplayLine::Offer { offer } => manager.offer_quest_by_id(&offer, &meta),
            ReplayLine::Accept { accept } => manager.accept_quest(&accept, &meta),
            ReplayLine::Abandon { abandon } => manager.abandon_quest(&abandon),
            ReplayLine::Fail { fail, reason } => manager.fail_quest(&fail, &reason),
            ReplayLine::Event { event, payload } => {
                for update in manager.route_named_event(&event, &payload) {
                    info!(
                        "{} -> {}/{} ({}/{}){}",
                        update.actor_id,
                        update.quest_id,
                        update.objective_id,
                        update.current_count,
                        update.required_count,
                        if update.quest_completed { " quest complete" } else { "" }
                    );
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Line {}: {}", line_no, e);
        }
    }

    Ok(())
}

fn run() -> Result<(), String> {
    let args = Args::parse();

    let config = EngineConfig::load(&args.config).map_err(|e| e.to_string())?;

    let mut registry = QuestRegistry::new(&args.content_dir);
    let report = registry.load_all()?;
    if !report.is_clean() {
        for (path, e) in &report.failures {
            error!("{:?}: {}", path, e);
        }
        return Err(format!("{} quest files failed to load", report.failures.len()));
    }

    let store = JsonFileStore::new(&args.state_dir).map_err(|e| e.to_string())?;
    info!("Mission state stored in {:?}", store.root());
    let mut manager = MissionManager::new(Box::new(store), Box::new(SystemClock))
        .with_quest_source(Rc::new(registry));

    match manager.initialize(config) {
        InitOutcome::Restored { quests, log_entries } => {
            info!("Resumed {} quests ({} log entries)", quests, log_entries);
        }
        InitOutcome::Discarded { reason } => warn!("Started fresh: {}", reason),
        InitOutcome::Fresh | InitOutcome::AlreadyInitialized => {}
    }

    replay(&mut manager, &args.events)?;

    info!(
        "Done: {} active, {} completed, {} abandoned, {} failed, {} log entries",
        manager.active_main().iter().count() + manager.active_subs().len(),
        manager.completed().len(),
        manager.abandoned().len(),
        manager.failed().len(),
        manager.state_log().len()
    );
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mission_engine=info".parse().unwrap()),
        )
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
