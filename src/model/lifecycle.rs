use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    database::db_structs::{AuditLogEntry, Season},
    error::{EngineError, EngineResult},
    model::{constants::MAX_MMR, structures::season_state::SeasonState}
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Scheduled,
    ReturnedToDraft,
    Activated,
    Paused,
    Resumed,
    Terminated { end_date: DateTime<Utc> },
    Finalized,
    Archived
}

/// Result of a successful transition. Nothing is persisted yet; the caller
/// commits `season` against the version it read and appends `audit_entry`.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleTransition {
    pub season: Season,
    pub audit_entry: AuditLogEntry,
    pub event: LifecycleEvent
}

fn ensure_edge(season: &Season, to: SeasonState) -> EngineResult<()> {
    if !season.state.can_transition_to(to) {
        return Err(EngineError::invalid_transition(season.state, to));
    }

    Ok(())
}

/// Fires a validated edge: bumps the version and produces the audit entry.
fn fire(
    season: &Season,
    to: SeasonState,
    event: LifecycleEvent,
    actor: &str,
    now: DateTime<Utc>,
    metadata: serde_json::Value
) -> EngineResult<LifecycleTransition> {
    ensure_edge(season, to)?;

    let mut next = season.clone();
    next.state = to;
    next.version += 1;
    next.updated_at = now;

    let audit_entry = AuditLogEntry {
        id: Uuid::new_v4(),
        season_id: season.id,
        previous_state: season.state,
        new_state: to,
        actor: actor.to_string(),
        timestamp: now,
        metadata
    };

    Ok(LifecycleTransition {
        season: next,
        audit_entry,
        event
    })
}

/// Checks a season's static configuration. Every violation is reported.
pub fn validate_draft(season: &Season) -> EngineResult<()> {
    let mut violations = Vec::new();

    if season.number < 1 {
        violations.push(format!("season number {} must be at least 1", season.number));
    }
    if season.name.trim().is_empty() {
        violations.push("season name must not be empty".to_string());
    }
    if !season.soft_reset_factor.is_finite() || !(0.0..=1.0).contains(&season.soft_reset_factor) {
        violations.push(format!(
            "soft reset factor {} must be within [0, 1]",
            season.soft_reset_factor
        ));
    }
    if season.mmr_floor < 0 || season.mmr_floor > season.mmr_ceiling || season.mmr_ceiling > MAX_MMR {
        violations.push(format!(
            "rating bounds [{}, {}] must satisfy 0 <= floor <= ceiling <= {}",
            season.mmr_floor, season.mmr_ceiling, MAX_MMR
        ));
    }
    if season.promo_wins_required == 0 || season.promo_wins_required > season.promo_games_max {
        violations.push(format!(
            "promotion series needs 0 < wins required ({}) <= games max ({})",
            season.promo_wins_required, season.promo_games_max
        ));
    }
    if season.decay_enabled && (season.decay_days <= 0 || season.decay_amount <= 0) {
        violations.push("decay days and decay amount must be positive when decay is enabled".to_string());
    }
    if let Some(restriction) = season.skill_group_restriction {
        if restriction.min_mmr > restriction.max_mmr {
            violations.push(format!(
                "skill group restriction [{}, {}] is empty",
                restriction.min_mmr, restriction.max_mmr
            ));
        }
    }
    if let Some(end_date) = season.end_date {
        if end_date < season.start_date {
            violations.push("end date precedes start date".to_string());
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::ValidationFailed(violations))
    }
}

fn conflicting_active(season: &Season, seasons_of_type: &[Season]) -> Vec<String> {
    seasons_of_type
        .iter()
        .filter(|s| s.id != season.id && s.season_type == season.season_type && s.is_active())
        .map(|s| format!("season {} ({}) is already active for type {}", s.id, s.name, s.season_type))
        .collect()
}

/// Activation preconditions. Every violation is reported, not only the first.
pub fn validate_activation(season: &Season, now: DateTime<Utc>, other_seasons: &[Season]) -> EngineResult<()> {
    let mut violations = Vec::new();

    if season.start_date > now {
        violations.push(format!("start date {} is in the future", season.start_date.to_rfc3339()));
    }
    if season.rewards.is_empty() {
        violations.push("at least one reward must be configured".to_string());
    }
    violations.extend(conflicting_active(season, other_seasons));

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::ValidationFailed(violations))
    }
}

pub fn schedule(season: &Season, actor: &str, now: DateTime<Utc>) -> EngineResult<LifecycleTransition> {
    ensure_edge(season, SeasonState::Scheduled)?;
    validate_draft(season)?;

    fire(season, SeasonState::Scheduled, LifecycleEvent::Scheduled, actor, now, json!({}))
}

pub fn return_to_draft(season: &Season, actor: &str, now: DateTime<Utc>) -> EngineResult<LifecycleTransition> {
    fire(season, SeasonState::Draft, LifecycleEvent::ReturnedToDraft, actor, now, json!({}))
}

/// `other_seasons` should contain every season of the same type; the season
/// itself is ignored if present. A paused season is resumed.
pub fn activate(
    season: &Season,
    actor: &str,
    now: DateTime<Utc>,
    other_seasons: &[Season]
) -> EngineResult<LifecycleTransition> {
    ensure_edge(season, SeasonState::Active)?;
    if season.state == SeasonState::Paused {
        return resume(season, actor, now, other_seasons);
    }
    validate_activation(season, now, other_seasons)?;

    fire(
        season,
        SeasonState::Active,
        LifecycleEvent::Activated,
        actor,
        now,
        json!({ "rewards": season.rewards.len() })
    )
}

pub fn pause(season: &Season, actor: &str, now: DateTime<Utc>, reason: Option<&str>) -> EngineResult<LifecycleTransition> {
    fire(season, SeasonState::Paused, LifecycleEvent::Paused, actor, now, json!({ "reason": reason }))
}

/// Paused -> Active. Only the one-active-per-type rule is re-checked, since
/// another season may have been activated while this one was paused.
pub fn resume(
    season: &Season,
    actor: &str,
    now: DateTime<Utc>,
    other_seasons: &[Season]
) -> EngineResult<LifecycleTransition> {
    if season.state != SeasonState::Paused {
        return Err(EngineError::invalid_transition(season.state, SeasonState::Active));
    }

    let violations = conflicting_active(season, other_seasons);
    if !violations.is_empty() {
        return Err(EngineError::ValidationFailed(violations));
    }

    fire(season, SeasonState::Active, LifecycleEvent::Resumed, actor, now, json!({}))
}

/// Active/Paused -> Ending. The effective end date becomes `now + grace_period`.
pub fn terminate(
    season: &Season,
    actor: &str,
    now: DateTime<Utc>,
    grace_period: Duration
) -> EngineResult<LifecycleTransition> {
    ensure_edge(season, SeasonState::Ending)?;

    if grace_period < Duration::zero() {
        return Err(EngineError::InvalidInput(format!(
            "grace period of {} seconds is negative",
            grace_period.num_seconds()
        )));
    }

    let end_date = now + grace_period;
    let mut transition = fire(
        season,
        SeasonState::Ending,
        LifecycleEvent::Terminated { end_date },
        actor,
        now,
        json!({ "gracePeriodSeconds": grace_period.num_seconds(), "endDate": end_date.to_rfc3339() })
    )?;
    transition.season.end_date = Some(end_date);

    Ok(transition)
}

/// Ending -> Ended, once the grace period has run out.
pub fn finalize(season: &Season, actor: &str, now: DateTime<Utc>) -> EngineResult<LifecycleTransition> {
    ensure_edge(season, SeasonState::Ended)?;

    if let Some(end_date) = season.end_date {
        if end_date > now {
            return Err(EngineError::ValidationFailed(vec![format!(
                "grace period runs until {}",
                end_date.to_rfc3339()
            )]));
        }
    }

    fire(season, SeasonState::Ended, LifecycleEvent::Finalized, actor, now, json!({}))
}

pub fn archive(season: &Season, actor: &str, now: DateTime<Utc>) -> EngineResult<LifecycleTransition> {
    fire(season, SeasonState::Archived, LifecycleEvent::Archived, actor, now, json!({}))
}

/// Fires any allowed edge with default parameters (no grace period, no
/// reason). Activation preconditions still apply.
pub fn transition_to(
    season: &Season,
    to: SeasonState,
    actor: &str,
    now: DateTime<Utc>,
    other_seasons: &[Season]
) -> EngineResult<LifecycleTransition> {
    match (season.state, to) {
        (SeasonState::Paused, SeasonState::Active) => resume(season, actor, now, other_seasons),
        (_, SeasonState::Scheduled) => schedule(season, actor, now),
        (_, SeasonState::Draft) => return_to_draft(season, actor, now),
        (_, SeasonState::Active) => activate(season, actor, now, other_seasons),
        (_, SeasonState::Paused) => pause(season, actor, now, None),
        (_, SeasonState::Ending) => terminate(season, actor, now, Duration::zero()),
        (_, SeasonState::Ended) => finalize(season, actor, now),
        (_, SeasonState::Archived) => archive(season, actor, now)
    }
}
