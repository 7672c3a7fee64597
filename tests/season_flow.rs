use std::cmp::Ordering;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use ranked_season::{
    config::EngineConfig,
    database::{
        db_structs::{Season, SeasonId, SeasonReward},
        in_memory::{FixedClock, InMemoryRankCache, InMemoryStore},
        store::{Clock, Storage}
    },
    error::EngineError,
    model::{
        orchestrator::{MatchReport, SeasonOrchestrator},
        structures::{game_mode::GameMode, promotion_state::PromotionState, season_state::SeasonState, tier::Tier},
        tier_mapper::{compare_rank, league_points, previous_tier_division, tier_for}
    }
};

mod common;

type Engine = SeasonOrchestrator<InMemoryStore, InMemoryRankCache, FixedClock>;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
}

fn engine() -> Engine {
    common::init_test_env();

    SeasonOrchestrator::new(
        InMemoryStore::new(),
        InMemoryRankCache::new(),
        FixedClock::new(start()),
        EngineConfig::default()
    )
}

fn draft(id: SeasonId, placements: u32) -> Season {
    let mut season = Season::draft(id, id, &format!("Season {}", id), start(), start() - Duration::days(7));
    season.placement_matches_required = placements;
    season.rewards.push(SeasonReward {
        min_tier: Tier::Silver,
        reward_key: format!("s{}-silver-icon", id)
    });
    season
}

/// Creates, schedules and activates a season, returning its stored version.
fn launch(engine: &Engine, season: Season) -> u64 {
    let id = season.id;
    let created = engine.create_season(season).unwrap();
    let scheduled = engine.schedule_season(id, created.version, "ops").unwrap();
    engine.activate_season(id, scheduled.season.version, "ops").unwrap().season.version
}

fn play(engine: &Engine, season_id: SeasonId, winner_id: i32, loser_id: i32) {
    engine
        .record_match(&MatchReport {
            season_id,
            winner_id,
            loser_id,
            game_mode: GameMode::Solo
        })
        .unwrap();
}

/// Forces a player's rating, as an admin correction would.
fn set_rating(engine: &Engine, player_id: i32, season_id: SeasonId, mmr: i32) {
    let mut record = engine
        .storage()
        .get_player_season_record(player_id, season_id)
        .unwrap()
        .unwrap();
    let expected = record.version;
    let rank = tier_for(mmr).unwrap();

    record.mmr = mmr;
    record.peak_mmr = record.peak_mmr.max(mmr);
    record.set_rank(rank);
    record.league_points = league_points(mmr, rank.tier, rank.division).unwrap();
    record.version += 1;

    engine.storage().upsert_player_season_record(&record, expected).unwrap();
}

/// Leaves a player one division below their rating with a series open, as
/// after reaching the threshold but before winning promos.
fn hold_in_series(engine: &Engine, player_id: i32, season_id: SeasonId, mmr: i32) -> bool {
    let Some(held) = previous_tier_division(tier_for(mmr).unwrap()).filter(|r| r.division.is_some()) else {
        return false;
    };
    set_rating(engine, player_id, season_id, mmr);

    let mut record = engine
        .storage()
        .get_player_season_record(player_id, season_id)
        .unwrap()
        .unwrap();
    let expected = record.version;

    record.set_rank(held);
    record.set_promotion_state(PromotionState::InPromos { wins: 1, losses: 0 });
    record.league_points = league_points(mmr, held.tier, held.division).unwrap();
    record.version += 1;

    engine.storage().upsert_player_season_record(&record, expected).unwrap();
    true
}

#[test]
fn placements_then_leaderboard() {
    let engine = engine();
    launch(&engine, draft(1, 3));

    play(&engine, 1, 1, 2);
    play(&engine, 1, 1, 2);
    assert!(engine.leaderboard(1, None).unwrap().is_empty());
    assert_eq!(engine.player_rank(1, 1).unwrap().placement_matches_remaining, 1);

    play(&engine, 1, 1, 2);

    let board = engine.leaderboard(1, None).unwrap();
    assert_eq!(board.iter().map(|e| e.player_id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(board[0].mmr, 1400);
    assert_eq!(board[1].mmr, 1000);
    assert_eq!(board[0].tier, Tier::Gold);
}

#[test]
fn paused_season_rejects_matches_until_resumed() {
    let engine = engine();
    let version = launch(&engine, draft(1, 0));

    let paused = engine.pause_season(1, version, "ops", Some("server maintenance")).unwrap();
    let err = engine
        .record_match(&MatchReport {
            season_id: 1,
            winner_id: 1,
            loser_id: 2,
            game_mode: GameMode::Duo
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::ValidationFailed(_)));

    engine.resume_season(1, paused.season.version, "ops").unwrap();
    play(&engine, 1, 1, 2);

    let log = engine.storage().audit_log(1).unwrap();
    let states: Vec<SeasonState> = log.iter().map(|e| e.new_state).collect();
    assert_eq!(
        states,
        vec![
            SeasonState::Scheduled,
            SeasonState::Active,
            SeasonState::Paused,
            SeasonState::Active
        ]
    );
    assert_eq!(log[2].metadata["reason"], "server maintenance");
}

#[test]
fn second_active_season_of_same_type_is_refused() {
    let engine = engine();
    launch(&engine, draft(1, 0));

    let created = engine.create_season(draft(2, 0)).unwrap();
    let scheduled = engine.schedule_season(2, created.version, "ops").unwrap();

    match engine.activate_season(2, scheduled.season.version, "ops").unwrap_err() {
        EngineError::ValidationFailed(violations) => assert_eq!(violations.len(), 1),
        other => panic!("expected validation failure, got {}", other)
    }
    assert_eq!(engine.storage().get_season(2).unwrap().state, SeasonState::Scheduled);
}

#[test]
fn decay_only_touches_inactive_high_tiers() {
    let engine = engine();
    launch(&engine, draft(1, 0));

    play(&engine, 1, 1, 2);
    play(&engine, 1, 3, 4);
    set_rating(&engine, 1, 1, 2700);
    set_rating(&engine, 3, 1, 2700);

    // Player 3 stays active, player 1 does not
    engine.clock().advance(Duration::days(20));
    play(&engine, 1, 3, 4);
    engine.clock().advance(Duration::days(15));

    let warnings = engine.run_decay_warning_pass(1).unwrap();
    assert!(warnings.warned.is_empty());

    let report = engine.run_decay_pass(1).unwrap();
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(report.decisions[0].player_id, 1);
    assert_eq!(report.decisions[0].mmr_after, 2700 - 25 * 2);

    // Same instant, nothing more to charge
    assert!(engine.run_decay_pass(1).unwrap().decisions.is_empty());

    // Playing again clears the decay bookkeeping
    play(&engine, 1, 1, 2);
    let record = engine.storage().get_player_season_record(1, 1).unwrap().unwrap();
    assert_eq!(record.decay_periods_applied, 0);
    assert_eq!(record.last_activity_at, engine.clock().now());
}

#[test]
fn rollover_soft_resets_and_unlocks_rewards() {
    let engine = engine();
    let version = launch(&engine, draft(1, 0));

    play(&engine, 1, 1, 2);
    set_rating(&engine, 1, 1, 2000);
    set_rating(&engine, 2, 1, 800);
    engine.create_season(draft(2, 5)).unwrap();

    // The rollover needs the version observed after the matches
    let current = engine.storage().get_season(1).unwrap();
    assert_eq!(current.version, version);

    engine.clock().advance(Duration::days(90));
    let report = engine.start_next_season(1, current.version, 2, "ops").unwrap();
    assert_eq!(report.records_seeded, 2);

    let seeded = engine.storage().get_player_season_record(1, 2).unwrap().unwrap();
    assert_eq!(seeded.mmr, 1600);
    assert_eq!(seeded.previous_tier, Some(Tier::Platinum));
    assert!(!seeded.is_placement_complete);

    let low = engine.storage().get_player_season_record(2, 2).unwrap().unwrap();
    assert_eq!(low.mmr, 1000);

    let grants = engine.season_rewards(1).unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].player_id, 1);

    assert_eq!(engine.storage().get_season(2).unwrap().state, SeasonState::Active);
    assert!(engine.season_rewards(2).is_err());

    // A stale rollover request is refused
    assert!(engine
        .start_next_season(1, current.version, 2, "ops")
        .unwrap_err()
        .is_retryable());
}

#[test]
fn ratings_follow_match_outcomes() {
    let engine = engine();
    launch(&engine, draft(1, 5));
    let mut rng = ChaCha8Rng::seed_from_u64(21);

    for _ in 0..3_000 {
        let winner_id = rng.random_range(1..=16);
        let loser_id = rng.random_range(1..=16);
        if winner_id == loser_id {
            continue;
        }

        let recorded = engine
            .record_match(&MatchReport {
                season_id: 1,
                winner_id,
                loser_id,
                game_mode: GameMode::Solo
            })
            .unwrap();

        assert!(recorded.winner.mmr_after >= recorded.winner.mmr_before, "{:?}", recorded.winner);
        assert!(recorded.loser.mmr_after <= recorded.loser.mmr_before, "{:?}", recorded.loser);
        assert!(recorded.result.rating_delta >= 0);
        assert!(recorded.result.loser_rating_delta <= 0);
    }
}

#[test]
fn decay_never_raises_a_rank() {
    let engine = engine();
    launch(&engine, draft(1, 0));
    let mut rng = ChaCha8Rng::seed_from_u64(8);

    let mut held = Vec::new();
    for player_id in 1..=40 {
        play(&engine, 1, player_id, player_id + 1000);

        let mmr = rng.random_range(2300..=3600);
        if rng.random_bool(0.5) && hold_in_series(&engine, player_id, 1, mmr) {
            held.push(player_id);
        } else {
            set_rating(&engine, player_id, 1, mmr);
        }
    }

    let ranks_before: Vec<_> = (1..=40)
        .map(|id| engine.storage().get_player_season_record(id, 1).unwrap().unwrap())
        .collect();

    for _ in 0..8 {
        engine.clock().advance(Duration::days(rng.random_range(5..20)));

        for decision in engine.run_decay_pass(1).unwrap().decisions {
            assert_ne!(
                compare_rank(decision.rank_after, decision.rank_before),
                Ordering::Greater,
                "player {} went from {} to {}",
                decision.player_id,
                decision.rank_before,
                decision.rank_after
            );
        }
    }

    for before in ranks_before {
        let after = engine.storage().get_player_season_record(before.player_id, 1).unwrap().unwrap();

        assert!(after.mmr < before.mmr);
        assert_ne!(compare_rank(after.rank(), before.rank()), Ordering::Greater);
        if held.contains(&before.player_id) && after.rank() == before.rank() {
            assert!(after.is_in_promos);
        }
    }
}
