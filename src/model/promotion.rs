use serde::{Deserialize, Serialize};

use crate::{
    database::db_structs::Season,
    error::{EngineError, EngineResult},
    model::{
        constants::PROMOTION_THRESHOLD_LP,
        structures::promotion_state::PromotionState,
        tier_mapper::{league_points, next_tier_division, previous_tier_division, rank_bounds, tier_for, TierDivision}
    }
};

/// Per-season promotion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRules {
    pub wins_required: u32,
    pub games_max: u32,
    pub shield_games: u32,
    pub threshold_lp: i32
}

impl PromotionRules {
    pub fn new(wins_required: u32, games_max: u32, shield_games: u32) -> EngineResult<Self> {
        if wins_required == 0 || wins_required > games_max {
            return Err(EngineError::InvalidInput(format!(
                "promotion series needs 0 < wins required ({}) <= games max ({})",
                wins_required, games_max
            )));
        }

        Ok(PromotionRules {
            wins_required,
            games_max,
            shield_games,
            threshold_lp: PROMOTION_THRESHOLD_LP
        })
    }

    pub fn from_season(season: &Season) -> EngineResult<Self> {
        Self::new(
            season.promo_wins_required,
            season.promo_games_max,
            season.demotion_shield_games
        )
    }

    /// Losses tolerated before the series is lost.
    pub fn max_losses(&self) -> u32 {
        self.games_max - self.wins_required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesUpdate {
    /// The player is not in a promotion series
    NotApplicable,
    Continuing { wins: u32, losses: u32 },
    Promoted { to: TierDivision },
    Failed
}

/// Advances an open promotion series by one game.
pub fn update_series(
    state: PromotionState,
    current: TierDivision,
    is_win: bool,
    rules: &PromotionRules
) -> SeriesUpdate {
    let (mut wins, mut losses) = match state {
        PromotionState::Normal => return SeriesUpdate::NotApplicable,
        PromotionState::InPromos { wins, losses } => (wins, losses)
    };

    if is_win {
        wins += 1;
    } else {
        losses += 1;
    }

    if wins >= rules.wins_required {
        // Entry is refused at the top of the ladder, so a next step exists
        return match next_tier_division(current) {
            Some(to) => SeriesUpdate::Promoted { to },
            None => SeriesUpdate::Failed
        };
    }

    if losses > rules.max_losses() {
        return SeriesUpdate::Failed;
    }

    SeriesUpdate::Continuing { wins, losses }
}

/// Whether a player in `state` has reached the league-point threshold that
/// opens a promotion series. Always false while a series is already open.
pub fn is_promotion_eligible(
    state: PromotionState,
    rank: TierDivision,
    mmr: i32,
    rules: &PromotionRules
) -> EngineResult<bool> {
    if state.is_in_promos() || !rank.tier.has_divisions() || next_tier_division(rank).is_none() {
        return Ok(false);
    }

    Ok(league_points(mmr, rank.tier, rank.division)? >= rules.threshold_lp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemotionOutcome {
    /// Already at the bottom of the ladder
    Floor,
    Shielded { shield_remaining: u32 },
    Demoted { to: TierDivision }
}

/// Resolves a pending demotion against the player's shield.
pub fn apply_demotion(rank: TierDivision, shield_games: u32) -> DemotionOutcome {
    if rank.is_lowest() {
        return DemotionOutcome::Floor;
    }

    if shield_games > 0 {
        return DemotionOutcome::Shielded {
            shield_remaining: shield_games - 1
        };
    }

    match previous_tier_division(rank) {
        Some(to) => DemotionOutcome::Demoted { to },
        None => DemotionOutcome::Floor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankEvent {
    Unchanged,
    EnteredPromos,
    SeriesProgress { wins: u32, losses: u32 },
    Promoted { from: TierDivision, to: TierDivision },
    PromosFailed,
    DemotionShielded { shield_remaining: u32 },
    Demoted { from: TierDivision, to: TierDivision }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub rank: TierDivision,
    pub state: PromotionState,
    pub shield_games: u32,
    pub event: RankEvent
}

/// Applies one rated game to a player's displayed rank.
///
/// While a series is open only the series moves. Otherwise a rating at or
/// past the top of a division opens a series, a rating below the bottom of
/// the current rank triggers demotion (subject to the shield), and players in
/// the divisionless tiers move between them directly by rating.
pub fn evaluate(
    rank: TierDivision,
    state: PromotionState,
    shield_games: u32,
    mmr: i32,
    is_win: bool,
    rules: &PromotionRules
) -> EngineResult<PromotionOutcome> {
    let unchanged = PromotionOutcome {
        rank,
        state,
        shield_games,
        event: RankEvent::Unchanged
    };

    match update_series(state, rank, is_win, rules) {
        SeriesUpdate::NotApplicable => {}
        SeriesUpdate::Continuing { wins, losses } => {
            return Ok(PromotionOutcome {
                state: PromotionState::InPromos { wins, losses },
                event: RankEvent::SeriesProgress { wins, losses },
                ..unchanged
            });
        }
        SeriesUpdate::Promoted { to } => {
            return Ok(PromotionOutcome {
                rank: to,
                state: PromotionState::Normal,
                shield_games: rules.shield_games,
                event: RankEvent::Promoted { from: rank, to }
            });
        }
        SeriesUpdate::Failed => {
            return Ok(PromotionOutcome {
                state: PromotionState::Normal,
                event: RankEvent::PromosFailed,
                ..unchanged
            });
        }
    }

    let (lo, hi) = rank_bounds(rank);

    if rank.tier.has_divisions() {
        if is_promotion_eligible(state, rank, mmr, rules)? {
            return Ok(PromotionOutcome {
                state: PromotionState::InPromos { wins: 0, losses: 0 },
                event: RankEvent::EnteredPromos,
                ..unchanged
            });
        }
    } else if hi.is_some_and(|hi| mmr >= hi) {
        let to = tier_for(mmr)?;
        return Ok(PromotionOutcome {
            rank: to,
            event: RankEvent::Promoted { from: rank, to },
            ..unchanged
        });
    }

    if mmr >= lo {
        return Ok(unchanged);
    }

    Ok(match apply_demotion(rank, shield_games) {
        DemotionOutcome::Floor => unchanged,
        DemotionOutcome::Shielded { shield_remaining } => PromotionOutcome {
            shield_games: shield_remaining,
            event: RankEvent::DemotionShielded { shield_remaining },
            ..unchanged
        },
        DemotionOutcome::Demoted { to } => PromotionOutcome {
            rank: to,
            event: RankEvent::Demoted { from: rank, to },
            ..unchanged
        }
    })
}
