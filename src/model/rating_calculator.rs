use crate::{
    error::{EngineError, EngineResult},
    model::constants::{
        BASE_MMR, EXPECTED_SCORE_SCALE, HIGH_RATING_THRESHOLD, K_BASE, K_HIGH_RATING, K_NEW_PLAYER, MAX_MMR,
        NEW_PLAYER_GAMES, PLACEMENT_BONUS_SCALE, STREAK_BONUS_CAP, STREAK_BONUS_UNIT, STREAK_THRESHOLD
    }
};
use serde::{Deserialize, Serialize};

/// Chooses the K-factor for a rating update. The calculator itself never
/// hardcodes these thresholds, so seasons can be tuned independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFactorPolicy {
    pub new_player_games: u32,
    pub new_player_k: f64,
    pub base_k: f64,
    pub high_rating_threshold: i32,
    pub high_rating_k: f64
}

impl Default for KFactorPolicy {
    fn default() -> Self {
        KFactorPolicy {
            new_player_games: NEW_PLAYER_GAMES,
            new_player_k: K_NEW_PLAYER,
            base_k: K_BASE,
            high_rating_threshold: HIGH_RATING_THRESHOLD,
            high_rating_k: K_HIGH_RATING
        }
    }
}

impl KFactorPolicy {
    pub fn select(&self, games_played: u32, rating: i32) -> f64 {
        if games_played < self.new_player_games {
            self.new_player_k
        } else if rating >= self.high_rating_threshold {
            self.high_rating_k
        } else {
            self.base_k
        }
    }
}

/// Symmetric, capped adjustment applied on top of the raw Elo delta
/// once a streak reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakBonus {
    pub threshold: u32,
    pub unit: i32,
    pub cap: i32
}

impl Default for StreakBonus {
    fn default() -> Self {
        StreakBonus {
            threshold: STREAK_THRESHOLD,
            unit: STREAK_BONUS_UNIT,
            cap: STREAK_BONUS_CAP
        }
    }
}

impl StreakBonus {
    /// Streak lengths include the match being rated.
    pub fn bonus(&self, is_win: bool, win_streak: u32, loss_streak: u32) -> i32 {
        let (streak, sign) = if is_win { (win_streak, 1) } else { (loss_streak, -1) };

        if streak < self.threshold {
            return 0;
        }

        let raw = (streak as i64).saturating_mul(self.unit as i64);
        sign * raw.min(self.cap as i64) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingDelta {
    pub new_rating: i32,
    /// Effective change after clamping, `new_rating - rating`.
    pub delta: i32,
    pub expected_score: f64
}

/// Pure Elo-style rating arithmetic bounded to `[0, max_mmr]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingCalculator {
    pub base_mmr: i32,
    pub max_mmr: i32,
    pub streak_bonus: StreakBonus,
    pub placement_bonus_scale: f64
}

impl Default for RatingCalculator {
    fn default() -> Self {
        RatingCalculator {
            base_mmr: BASE_MMR,
            max_mmr: MAX_MMR,
            streak_bonus: StreakBonus::default(),
            placement_bonus_scale: PLACEMENT_BONUS_SCALE
        }
    }
}

/// Logistic expected score of `rating_a` against `rating_b`.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / EXPECTED_SCORE_SCALE))
}

impl RatingCalculator {
    pub fn clamp_mmr(&self, value: i64) -> i32 {
        value.clamp(0, self.max_mmr as i64) as i32
    }

    fn validate_rating(&self, name: &str, rating: i32) -> EngineResult<()> {
        if rating < 0 || rating > self.max_mmr {
            return Err(EngineError::InvalidInput(format!(
                "{} {} is outside [0, {}]",
                name, rating, self.max_mmr
            )));
        }

        Ok(())
    }

    fn validate_factor(name: &str, factor: f64) -> EngineResult<()> {
        if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
            return Err(EngineError::InvalidInput(format!("{} {} is outside [0, 1]", name, factor)));
        }

        Ok(())
    }

    /// Rates player A's result against player B.
    ///
    /// A win always moves the rating up by at least 1 and a loss down by at
    /// least 1, so lopsided pairings cannot stall. The final rating is then
    /// clamped, which may shrink the effective delta at the bounds.
    pub fn compute_delta(
        &self,
        rating_a: i32,
        rating_b: i32,
        is_win: bool,
        k_factor: f64,
        win_streak: u32,
        loss_streak: u32
    ) -> EngineResult<RatingDelta> {
        self.validate_rating("rating", rating_a)?;
        self.validate_rating("opponent rating", rating_b)?;

        if !k_factor.is_finite() || k_factor <= 0.0 {
            return Err(EngineError::InvalidInput(format!("k-factor {} must be positive", k_factor)));
        }

        let expected = expected_score(rating_a, rating_b);
        let actual = if is_win { 1.0 } else { 0.0 };

        let mut delta = (k_factor * (actual - expected)).round() as i64;
        delta += self.streak_bonus.bonus(is_win, win_streak, loss_streak) as i64;
        delta = if is_win { delta.max(1) } else { delta.min(-1) };

        let new_rating = self.clamp_mmr(rating_a as i64 + delta);

        Ok(RatingDelta {
            new_rating,
            delta: new_rating - rating_a,
            expected_score: expected
        })
    }

    /// Regresses a rating toward the base MMR. `reset_factor = 1` keeps the
    /// rating, `reset_factor = 0` lands exactly on the base.
    pub fn soft_reset(&self, current_mmr: i32, reset_factor: f64) -> EngineResult<i32> {
        self.validate_rating("rating", current_mmr)?;
        Self::validate_factor("reset factor", reset_factor)?;

        let blended = current_mmr as f64 * reset_factor + self.base_mmr as f64 * (1.0 - reset_factor);

        Ok(self.clamp_mmr(blended.round() as i64))
    }

    /// Seed for a player's placements: the soft-reset of last season's rating,
    /// or the base MMR for newcomers.
    pub fn placement_seed(&self, previous_mmr: Option<i32>, reset_factor: f64) -> EngineResult<i32> {
        match previous_mmr {
            Some(mmr) => self.soft_reset(mmr, reset_factor),
            None => {
                Self::validate_factor("reset factor", reset_factor)?;
                Ok(self.base_mmr)
            }
        }
    }

    /// Final placement rating: the seed shifted by `(win_rate - 0.5) * scale`.
    pub fn placement_from_seed(&self, seed_mmr: i32, wins: u32, games: u32) -> EngineResult<i32> {
        self.validate_rating("seed rating", seed_mmr)?;

        if wins > games {
            return Err(EngineError::InvalidInput(format!(
                "placement wins {} exceed games played {}",
                wins, games
            )));
        }

        let win_rate = if games == 0 { 0.5 } else { wins as f64 / games as f64 };
        let bonus = ((win_rate - 0.5) * self.placement_bonus_scale).round() as i64;

        Ok(self.clamp_mmr(seed_mmr as i64 + bonus))
    }

    pub fn placement_mmr(
        &self,
        previous_mmr: Option<i32>,
        reset_factor: f64,
        wins: u32,
        games: u32
    ) -> EngineResult<i32> {
        let seed = self.placement_seed(previous_mmr, reset_factor)?;
        self.placement_from_seed(seed, wins, games)
    }
}
