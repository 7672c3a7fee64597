use crate::model::{
    constants::{
        DEFAULT_DECAY_AMOUNT, DEFAULT_DECAY_DAYS, DEFAULT_DEMOTION_SHIELD_GAMES, DEFAULT_PLACEMENT_MATCHES,
        DEFAULT_PROMO_GAMES_MAX, DEFAULT_PROMO_WINS_REQUIRED, DEFAULT_SOFT_RESET_FACTOR, MAX_MMR
    },
    structures::{
        game_mode::GameMode,
        promotion_state::PromotionState,
        season_state::SeasonState,
        season_type::SeasonType,
        tier::{Division, Tier}
    },
    tier_mapper::TierDivision
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = i32;
pub type SeasonId = i32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonReward {
    /// Lowest final tier that earns the reward
    pub min_tier: Tier,
    pub reward_key: String
}

/// Inclusive rating window a player must fall into to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGroupRestriction {
    pub min_mmr: i32,
    pub max_mmr: i32
}

impl SkillGroupRestriction {
    pub fn contains(&self, mmr: i32) -> bool {
        (self.min_mmr..=self.max_mmr).contains(&mmr)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: SeasonId,
    /// Sequential per season type
    pub number: i32,
    pub name: String,
    pub start_date: DateTime<Utc>,
    /// Set when the season is terminated (now + grace period)
    pub end_date: Option<DateTime<Utc>>,
    pub state: SeasonState,
    pub season_type: SeasonType,
    pub soft_reset_factor: f64,
    pub placement_matches_required: u32,
    pub mmr_floor: i32,
    pub mmr_ceiling: i32,
    pub decay_enabled: bool,
    pub decay_days: i64,
    pub decay_amount: i32,
    pub promo_wins_required: u32,
    pub promo_games_max: u32,
    pub demotion_shield_games: u32,
    pub skill_group_restriction: Option<SkillGroupRestriction>,
    pub rewards: Vec<SeasonReward>,
    pub previous_season_id: Option<SeasonId>,
    /// Optimistic concurrency token, bumped on every mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

impl Season {
    /// A draft season with default competitive parameters.
    pub fn draft(id: SeasonId, number: i32, name: &str, start_date: DateTime<Utc>, now: DateTime<Utc>) -> Season {
        Season {
            id,
            number,
            name: name.to_string(),
            start_date,
            end_date: None,
            state: SeasonState::Draft,
            season_type: SeasonType::Ranked,
            soft_reset_factor: DEFAULT_SOFT_RESET_FACTOR,
            placement_matches_required: DEFAULT_PLACEMENT_MATCHES,
            mmr_floor: 0,
            mmr_ceiling: MAX_MMR,
            decay_enabled: true,
            decay_days: DEFAULT_DECAY_DAYS,
            decay_amount: DEFAULT_DECAY_AMOUNT,
            promo_wins_required: DEFAULT_PROMO_WINS_REQUIRED,
            promo_games_max: DEFAULT_PROMO_GAMES_MAX,
            demotion_shield_games: DEFAULT_DEMOTION_SHIELD_GAMES,
            skill_group_restriction: None,
            rewards: Vec::new(),
            previous_season_id: None,
            version: 0,
            created_at: now,
            updated_at: now
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SeasonState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSeasonRecord {
    pub player_id: PlayerId,
    pub season_id: SeasonId,
    pub mmr: i32,
    pub peak_mmr: i32,
    pub tier: Tier,
    /// `None` for the divisionless top tiers
    pub division: Option<Division>,
    /// Cached for display; recomputed from `mmr` whenever the record changes
    pub league_points: i32,
    pub wins: u32,
    pub losses: u32,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub placement_matches_played: u32,
    pub placement_wins: u32,
    pub is_placement_complete: bool,
    /// Rating the placement result is computed from
    pub seed_mmr: i32,
    pub is_in_promos: bool,
    pub promo_wins: u32,
    pub promo_losses: u32,
    pub demotion_shield_games: u32,
    pub is_decay_protected: bool,
    pub decay_periods_applied: u32,
    pub decay_warning_sent: bool,
    pub last_activity_at: DateTime<Utc>,
    pub previous_tier: Option<Tier>,
    pub previous_division: Option<Division>,
    pub version: u64
}

impl PlayerSeasonRecord {
    pub fn games_played(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn rank(&self) -> TierDivision {
        TierDivision {
            tier: self.tier,
            division: self.division
        }
    }

    pub fn set_rank(&mut self, rank: TierDivision) {
        self.tier = rank.tier;
        self.division = rank.division;
    }

    pub fn previous_rank(&self) -> Option<TierDivision> {
        self.previous_tier.map(|tier| TierDivision {
            tier,
            division: self.previous_division
        })
    }

    pub fn promotion_state(&self) -> PromotionState {
        PromotionState::from_flags(self.is_in_promos, self.promo_wins, self.promo_losses)
    }

    pub fn set_promotion_state(&mut self, state: PromotionState) {
        match state {
            PromotionState::Normal => {
                self.is_in_promos = false;
                self.promo_wins = 0;
                self.promo_losses = 0;
            }
            PromotionState::InPromos { wins, losses } => {
                self.is_in_promos = true;
                self.promo_wins = wins;
                self.promo_losses = losses;
            }
        }
    }

    pub fn key(&self) -> (PlayerId, SeasonId) {
        (self.player_id, self.season_id)
    }
}

/// Immutable outcome of one match. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub id: Uuid,
    pub season_id: SeasonId,
    pub winner_id: PlayerId,
    pub loser_id: PlayerId,
    pub winner_mmr_before: i32,
    pub winner_mmr_after: i32,
    pub loser_mmr_before: i32,
    pub loser_mmr_after: i32,
    /// Winner's delta; the loser's is reported separately as it may differ
    pub rating_delta: i32,
    pub loser_rating_delta: i32,
    pub is_placement_match: bool,
    pub game_mode: GameMode,
    pub played_at: DateTime<Utc>
}

/// Append-only record of one lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub season_id: SeasonId,
    pub previous_state: SeasonState,
    pub new_state: SeasonState,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value
}

/// Archived final standing of a record whose season was superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSeasonHistory {
    pub player_id: PlayerId,
    pub season_id: SeasonId,
    pub final_mmr: i32,
    pub peak_mmr: i32,
    pub final_tier: Tier,
    pub final_division: Option<Division>,
    pub wins: u32,
    pub losses: u32,
    pub archived_at: DateTime<Utc>
}

impl PlayerSeasonHistory {
    pub fn from_record(record: &PlayerSeasonRecord, archived_at: DateTime<Utc>) -> Self {
        PlayerSeasonHistory {
            player_id: record.player_id,
            season_id: record.season_id,
            final_mmr: record.mmr,
            peak_mmr: record.peak_mmr,
            final_tier: record.tier,
            final_division: record.division,
            wins: record.wins,
            losses: record.losses,
            archived_at
        }
    }
}
