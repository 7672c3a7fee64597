use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    database::db_structs::{PlayerId, PlayerSeasonRecord, SeasonId},
    model::{
        structures::tier::{Division, Tier},
        tier_mapper::compare_rank
    }
};

/// What a client sees of a player's standing. Built from a record and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankView {
    pub player_id: PlayerId,
    pub season_id: SeasonId,
    pub mmr: i32,
    pub tier: Tier,
    pub division: Option<Division>,
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
    pub is_in_promos: bool,
    pub promo_wins: u32,
    pub promo_losses: u32,
    pub demotion_shield_games: u32,
    pub is_placement_complete: bool,
    pub placement_matches_remaining: u32
}

impl RankView {
    pub fn from_record(record: &PlayerSeasonRecord, placement_matches_required: u32) -> Self {
        RankView {
            player_id: record.player_id,
            season_id: record.season_id,
            mmr: record.mmr,
            tier: record.tier,
            division: record.division,
            league_points: record.league_points,
            wins: record.wins,
            losses: record.losses,
            is_in_promos: record.is_in_promos,
            promo_wins: record.promo_wins,
            promo_losses: record.promo_losses,
            demotion_shield_games: record.demotion_shield_games,
            is_placement_complete: record.is_placement_complete,
            placement_matches_remaining: placement_matches_required.saturating_sub(record.placement_matches_played)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub position: u32,
    pub mmr: i32,
    pub tier: Tier,
    pub division: Option<Division>,
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
    /// Share of ranked players below this one, 0..100
    pub percentile: f64
}

/// Rank order: displayed rank, then league points, then rating, then the
/// lower player id for a stable result. `Less` sorts first (best).
fn standing_order(a: &PlayerSeasonRecord, b: &PlayerSeasonRecord) -> Ordering {
    compare_rank(b.rank(), a.rank())
        .then_with(|| b.league_points.cmp(&a.league_points))
        .then_with(|| b.mmr.cmp(&a.mmr))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

/// Season standings. Players still in placements are not ranked.
pub struct Leaderboard {
    season_id: SeasonId,
    entries: IndexMap<PlayerId, PlayerSeasonRecord>
}

impl Leaderboard {
    pub fn new(season_id: SeasonId) -> Leaderboard {
        Leaderboard {
            season_id,
            entries: IndexMap::new()
        }
    }

    pub fn from_records(season_id: SeasonId, records: &[PlayerSeasonRecord]) -> Leaderboard {
        let mut leaderboard = Leaderboard::new(season_id);
        leaderboard.insert_or_update(records);
        leaderboard
    }

    /// Inserts or replaces records belonging to this season, then re-sorts once.
    pub fn insert_or_update(&mut self, records: &[PlayerSeasonRecord]) {
        for record in records {
            if record.season_id != self.season_id {
                continue;
            }

            if record.is_placement_complete {
                self.entries.insert(record.player_id, record.clone());
            } else {
                self.entries.shift_remove(&record.player_id);
            }
        }

        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|_, a, _, b| standing_order(a, b));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based position, `None` if the player is unranked.
    pub fn position(&self, player_id: PlayerId) -> Option<u32> {
        self.entries.get_index_of(&player_id).map(|i| i as u32 + 1)
    }

    pub fn percentile(&self, player_id: PlayerId) -> Option<f64> {
        let position = self.position(player_id)?;
        Some(percentile(position, self.entries.len()))
    }

    pub fn entries(&self) -> Vec<LeaderboardEntry> {
        let total = self.entries.len();

        self.entries
            .values()
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                player_id: r.player_id,
                position: i as u32 + 1,
                mmr: r.mmr,
                tier: r.tier,
                division: r.division,
                league_points: r.league_points,
                wins: r.wins,
                losses: r.losses,
                percentile: percentile(i as u32 + 1, total)
            })
            .collect()
    }
}

fn percentile(position: u32, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }

    // The number of players below the player
    let below = total - position as usize;
    below as f64 / total as f64 * 100.0
}
