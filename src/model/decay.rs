use crate::{
    database::db_structs::{PlayerId, PlayerSeasonRecord, Season},
    error::EngineResult,
    model::{
        constants::{DECAY_PERIOD_DAYS, DECAY_WARNING_DAYS},
        structures::{promotion_state::PromotionState, tier::Tier},
        tier_mapper::{compare_rank, league_points, tier_for, TierDivision}
    }
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayPolicy {
    /// Lowest tier subject to decay
    pub min_tier: Tier,
    pub period_days: i64,
    pub warning_days: i64
}

impl Default for DecayPolicy {
    fn default() -> Self {
        DecayPolicy {
            min_tier: Tier::Diamond,
            period_days: DECAY_PERIOD_DAYS,
            warning_days: DECAY_WARNING_DAYS
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayDecision {
    pub player_id: PlayerId,
    pub periods_elapsed: u32,
    /// Periods not yet charged by an earlier pass
    pub periods_charged: u32,
    pub mmr_before: i32,
    pub mmr_after: i32,
    pub rank_before: TierDivision,
    pub rank_after: TierDivision
}

/// # How this works
/// - The scheduler calls this at some time D (`now`).
/// - The player's last activity is T.
/// - Once (D - T) reaches the season's `decay_days`, one period is owed, plus
///   one more for every further 7 days.
/// - Each owed period costs `season.decay_amount`, bounded below by the
///   season's `mmr_floor`.
///
/// Periods already charged by an earlier pass are tracked on the record, so
/// running the pass twice for the same D changes nothing.
pub fn evaluate(
    record: &PlayerSeasonRecord,
    season: &Season,
    now: DateTime<Utc>,
    policy: &DecayPolicy
) -> EngineResult<Option<DecayDecision>> {
    if decay_impossible(record, season, now, policy) {
        return Ok(None);
    }

    let periods_elapsed = periods_elapsed(days_inactive(record, now), season.decay_days, policy.period_days);
    if periods_elapsed <= record.decay_periods_applied {
        return Ok(None);
    }

    let periods_charged = periods_elapsed - record.decay_periods_applied;
    let amount = season.decay_amount as i64 * periods_charged as i64;
    let mmr_after = decay_rating(record.mmr, amount, season.mmr_floor);
    let rank_after = decayed_rank(record.rank(), tier_for(mmr_after)?);

    Ok(Some(DecayDecision {
        player_id: record.player_id,
        periods_elapsed,
        periods_charged,
        mmr_before: record.mmr,
        mmr_after,
        rank_before: record.rank(),
        rank_after
    }))
}

/// Evaluates every record in parallel. Order of the output follows `records`.
pub fn evaluate_all(
    records: &[PlayerSeasonRecord],
    season: &Season,
    now: DateTime<Utc>,
    policy: &DecayPolicy
) -> EngineResult<Vec<DecayDecision>> {
    let decisions = records
        .par_iter()
        .map(|r| evaluate(r, season, now, policy))
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(decisions.into_iter().flatten().collect())
}

/// Writes a decision onto its record. An open promotion series is dropped
/// only if the decay demoted the player.
pub fn apply(record: &mut PlayerSeasonRecord, decision: &DecayDecision) -> EngineResult<()> {
    record.mmr = decision.mmr_after;
    record.decay_periods_applied = decision.periods_elapsed;

    if decision.rank_after != record.rank() {
        record.set_rank(decision.rank_after);
        record.set_promotion_state(PromotionState::Normal);
    }

    record.league_points = league_points(record.mmr, record.tier, record.division)?;
    record.version += 1;

    Ok(())
}

/// True when the player is inside the warning window ahead of decay and has
/// not been warned since their last activity.
pub fn evaluate_warning(record: &PlayerSeasonRecord, season: &Season, now: DateTime<Utc>, policy: &DecayPolicy) -> bool {
    if record.decay_warning_sent || !decay_applicable(record, season, policy) {
        return false;
    }

    let days = days_inactive(record, now);
    days >= season.decay_days - policy.warning_days && days < season.decay_days
}

pub fn evaluate_warnings(
    records: &[PlayerSeasonRecord],
    season: &Season,
    now: DateTime<Utc>,
    policy: &DecayPolicy
) -> Vec<PlayerId> {
    records
        .par_iter()
        .filter(|r| evaluate_warning(r, season, now, policy))
        .map(|r| r.player_id)
        .collect()
}

pub fn mark_warned(record: &mut PlayerSeasonRecord) {
    record.decay_warning_sent = true;
    record.version += 1;
}

/// Clears decay bookkeeping after the player plays again.
pub fn reset_on_activity(record: &mut PlayerSeasonRecord, now: DateTime<Utc>) {
    record.last_activity_at = now;
    record.decay_periods_applied = 0;
    record.decay_warning_sent = false;
}

pub fn days_inactive(record: &PlayerSeasonRecord, now: DateTime<Utc>) -> i64 {
    (now - record.last_activity_at).num_days()
}

pub fn periods_elapsed(days_inactive: i64, decay_days: i64, period_days: i64) -> u32 {
    if days_inactive < decay_days {
        return 0;
    }

    ((days_inactive - decay_days) / period_days.max(1) + 1) as u32
}

/// Returns true if the player has been active within the season's decay window.
fn is_active(record: &PlayerSeasonRecord, season: &Season, now: DateTime<Utc>) -> bool {
    days_inactive(record, now) < season.decay_days
}

fn decay_applicable(record: &PlayerSeasonRecord, season: &Season, policy: &DecayPolicy) -> bool {
    season.decay_enabled
        && record.is_placement_complete
        && !record.is_decay_protected
        && record.tier >= policy.min_tier
        && record.mmr > season.mmr_floor
}

fn decay_impossible(record: &PlayerSeasonRecord, season: &Season, now: DateTime<Utc>, policy: &DecayPolicy) -> bool {
    !decay_applicable(record, season, policy) || is_active(record, season, now)
}

/// Decay only ever lowers a rank. A stored rank below the rating (open
/// series) is kept as is.
fn decayed_rank(stored: TierDivision, mapped: TierDivision) -> TierDivision {
    match compare_rank(mapped, stored) {
        Ordering::Less => mapped,
        _ => stored
    }
}

fn decay_rating(mmr: i32, amount: i64, floor: i32) -> i32 {
    (mmr as i64 - amount).max(floor as i64) as i32
}
