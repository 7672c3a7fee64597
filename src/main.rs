use std::{fs, path::Path};

use chrono::Utc;
use clap::Parser;
use ranked_season::{
    args::{Args, Command},
    config::EngineConfig,
    database::{
        db_structs::SeasonId,
        in_memory::{FixedClock, InMemoryRankCache, InMemoryStore, StoreSnapshot},
        store::Storage
    },
    error::{EngineError, EngineResult},
    model::{
        orchestrator::SeasonOrchestrator,
        structures::tier::Division,
        tier_mapper::{rank_bounds, TierDivision, TIER_TABLE}
    }
};
use tracing::{error, info};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

fn run(args: &Args) -> EngineResult<()> {
    if args.command == Command::Tiers {
        print_tier_table();
        return Ok(());
    }

    let path = args
        .snapshot
        .as_deref()
        .ok_or_else(|| EngineError::InvalidInput("--snapshot is required for batch passes".to_string()))?;

    let config = EngineConfig::from_env()?;
    let store = InMemoryStore::from_snapshot(load_snapshot(path)?);
    let clock = FixedClock::new(args.now.unwrap_or_else(Utc::now));
    let orchestrator = SeasonOrchestrator::new(store.clone(), InMemoryRankCache::new(), clock, config);

    let seasons: Vec<SeasonId> = match args.season {
        Some(id) => vec![id],
        None => store
            .list_seasons()?
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id)
            .collect()
    };
    info!("Running {:?} pass over {} season(s)", args.command, seasons.len());

    for season_id in seasons {
        match args.command {
            Command::Decay => {
                let report = orchestrator.run_decay_pass(season_id)?;
                for decision in &report.decisions {
                    info!(
                        player_id = decision.player_id,
                        "Decayed {} -> {} ({} -> {})",
                        decision.mmr_before,
                        decision.mmr_after,
                        decision.rank_before,
                        decision.rank_after
                    );
                }
            }
            Command::Warn => {
                let report = orchestrator.run_decay_warning_pass(season_id)?;
                for player_id in &report.warned {
                    info!(player_id, season_id, "Decay warning due");
                }
            }
            Command::Tiers => {}
        }
    }

    save_snapshot(path, &store.snapshot()?)
}

fn load_snapshot(path: &Path) -> EngineResult<StoreSnapshot> {
    let raw = fs::read_to_string(path)
        .map_err(|e| EngineError::Storage(format!("failed to read {}: {}", path.display(), e)))?;

    serde_json::from_str(&raw).map_err(|e| EngineError::Storage(format!("failed to parse {}: {}", path.display(), e)))
}

fn save_snapshot(path: &Path, snapshot: &StoreSnapshot) -> EngineResult<()> {
    let raw = serde_json::to_string_pretty(snapshot).map_err(|e| EngineError::Storage(e.to_string()))?;

    fs::write(path, raw).map_err(|e| EngineError::Storage(format!("failed to write {}: {}", path.display(), e)))
}

fn print_tier_table() {
    for band in TIER_TABLE.iter() {
        let ranks: Vec<TierDivision> = if band.tier.has_divisions() {
            (0..4)
                .filter_map(Division::from_slot_from_bottom)
                .map(|d| TierDivision {
                    tier: band.tier,
                    division: Some(d)
                })
                .collect()
        } else {
            vec![TierDivision {
                tier: band.tier,
                division: None
            }]
        };

        for rank in ranks {
            let (lo, hi) = rank_bounds(rank);
            match hi {
                Some(hi) => println!("{:<14} {:>5} - {}", rank.to_string(), lo, hi - 1),
                None => println!("{:<14} {:>5} +", rank.to_string(), lo)
            }
        }
    }
}
