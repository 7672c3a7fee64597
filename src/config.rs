use std::{env, str::FromStr};

use dotenv::dotenv;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, EngineResult},
    model::{
        constants::{MAX_DIVISION_LP, PROMOTION_THRESHOLD_LP},
        decay::DecayPolicy,
        rating_calculator::{KFactorPolicy, RatingCalculator}
    }
};

/// Engine-wide tuning. Per-season parameters (decay amount, promo series
/// length, ...) live on the season itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub calculator: RatingCalculator,
    pub k_factor: KFactorPolicy,
    pub decay: DecayPolicy,
    pub promotion_threshold_lp: i32
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            calculator: RatingCalculator::default(),
            k_factor: KFactorPolicy::default(),
            decay: DecayPolicy::default(),
            promotion_threshold_lp: PROMOTION_THRESHOLD_LP
        }
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) -> EngineResult<()> {
    if let Ok(raw) = env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| EngineError::InvalidInput(format!("{} has unparsable value '{}'", name, raw)))?;
    }

    Ok(())
}

impl EngineConfig {
    /// Defaults overridden by any `ENGINE_*` variables in the environment
    /// or a `.env` file.
    pub fn from_env() -> EngineResult<EngineConfig> {
        dotenv().ok();

        let mut config = EngineConfig::default();

        env_override("ENGINE_BASE_MMR", &mut config.calculator.base_mmr)?;
        env_override("ENGINE_MAX_MMR", &mut config.calculator.max_mmr)?;
        env_override("ENGINE_K_NEW", &mut config.k_factor.new_player_k)?;
        env_override("ENGINE_K_BASE", &mut config.k_factor.base_k)?;
        env_override("ENGINE_K_HIGH", &mut config.k_factor.high_rating_k)?;
        env_override("ENGINE_K_HIGH_THRESHOLD", &mut config.k_factor.high_rating_threshold)?;
        env_override("ENGINE_STREAK_UNIT", &mut config.calculator.streak_bonus.unit)?;
        env_override("ENGINE_STREAK_CAP", &mut config.calculator.streak_bonus.cap)?;
        env_override("ENGINE_DECAY_WARNING_DAYS", &mut config.decay.warning_days)?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent settings. Every problem is reported.
    pub fn validate(&self) -> EngineResult<()> {
        let mut violations = Vec::new();
        let calc = &self.calculator;
        let k = &self.k_factor;

        if calc.max_mmr <= 0 {
            violations.push(format!("max rating {} must be positive", calc.max_mmr));
        }
        if calc.base_mmr < 0 || calc.base_mmr > calc.max_mmr {
            violations.push(format!("base rating {} is outside [0, {}]", calc.base_mmr, calc.max_mmr));
        }
        for (name, value) in [("new player K", k.new_player_k), ("base K", k.base_k), ("high rating K", k.high_rating_k)] {
            if !value.is_finite() || value <= 0.0 {
                violations.push(format!("{} {} must be positive", name, value));
            }
        }
        if calc.streak_bonus.unit < 0 || calc.streak_bonus.cap < 0 {
            violations.push("streak bonus unit and cap cannot be negative".to_string());
        }
        if self.decay.period_days <= 0 {
            violations.push(format!("decay period of {} days must be positive", self.decay.period_days));
        }
        if self.decay.warning_days < 0 {
            violations.push(format!("decay warning window of {} days is negative", self.decay.warning_days));
        }
        if !(1..=MAX_DIVISION_LP).contains(&self.promotion_threshold_lp) {
            violations.push(format!(
                "promotion threshold {} LP must be within 1..={}",
                self.promotion_threshold_lp, MAX_DIVISION_LP
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ValidationFailed(violations))
        }
    }
}
