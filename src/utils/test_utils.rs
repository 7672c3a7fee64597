use crate::{
    database::db_structs::{PlayerId, PlayerSeasonRecord, Season, SeasonId, SeasonReward},
    model::{
        structures::{season_state::SeasonState, tier::Tier},
        tier_mapper::{league_points, tier_for}
    }
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Fixed "now" shared by every generator so tests are reproducible.
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A draft ranked season that passes every activation precondition.
pub fn generate_draft_season(id: SeasonId) -> Season {
    let now = test_time();
    let mut season = Season::draft(id, id, &format!("Season {}", id), now - Duration::days(30), now - Duration::days(60));

    season.rewards.push(SeasonReward {
        min_tier: Tier::Gold,
        reward_key: format!("season-{}-gold-border", id)
    });

    season
}

/// An active ranked season with default parameters.
pub fn generate_season(id: SeasonId) -> Season {
    let mut season = generate_draft_season(id);
    season.state = SeasonState::Active;
    season.version = 3;

    season
}

/// A ranked record with placements done, last active at [`test_time`].
pub fn generate_record(player_id: PlayerId, season_id: SeasonId, mmr: i32) -> PlayerSeasonRecord {
    let rank = tier_for(mmr).unwrap();

    PlayerSeasonRecord {
        player_id,
        season_id,
        mmr,
        peak_mmr: mmr,
        tier: rank.tier,
        division: rank.division,
        league_points: league_points(mmr, rank.tier, rank.division).unwrap(),
        wins: 20,
        losses: 20,
        win_streak: 0,
        loss_streak: 0,
        placement_matches_played: 10,
        placement_wins: 5,
        is_placement_complete: true,
        seed_mmr: mmr,
        is_in_promos: false,
        promo_wins: 0,
        promo_losses: 0,
        demotion_shield_games: 0,
        is_decay_protected: false,
        decay_periods_applied: 0,
        decay_warning_sent: false,
        last_activity_at: test_time(),
        previous_tier: None,
        previous_division: None,
        version: 1
    }
}

/// `count` records with ratings drawn uniformly from `[0, max_mmr]`.
pub fn generate_records(count: i32, season_id: SeasonId, max_mmr: i32, seed: u64) -> Vec<PlayerSeasonRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (1..=count)
        .map(|id| generate_record(id, season_id, rng.random_range(0..=max_mmr)))
        .collect()
}
