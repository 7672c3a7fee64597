use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    database::{
        db_structs::{MatchResult, PlayerId, PlayerSeasonHistory, PlayerSeasonRecord, Season, SeasonId},
        store::{Clock, RankCache, Storage, WriteBatch}
    },
    error::{EngineError, EngineResult},
    model::{
        decay::{self, DecayDecision},
        leaderboard::{Leaderboard, LeaderboardEntry, RankView},
        lifecycle::{self, LifecycleTransition},
        promotion::{self, PromotionRules, RankEvent},
        rating_calculator::RatingCalculator,
        structures::{game_mode::GameMode, promotion_state::PromotionState, season_state::SeasonState},
        tier_mapper::{league_points, tier_for, TierDivision}
    },
    utils::progress_utils::progress_bar
};

/// A finished match as reported by the lobby service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub season_id: SeasonId,
    pub winner_id: PlayerId,
    pub loser_id: PlayerId,
    pub game_mode: GameMode
}

/// How one participant's standing moved because of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    pub player_id: PlayerId,
    pub mmr_before: i32,
    pub mmr_after: i32,
    pub delta: i32,
    pub rank_before: TierDivision,
    pub rank_after: TierDivision,
    pub event: RankEvent,
    pub was_placement_match: bool,
    pub placement_completed: bool
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMatch {
    pub result: MatchResult,
    pub winner: ParticipantUpdate,
    pub loser: ParticipantUpdate
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecayReport {
    pub season_id: SeasonId,
    pub evaluated: usize,
    pub decisions: Vec<DecayDecision>,
    /// Players whose record changed under the pass; retried on the next run
    pub conflicts: Vec<PlayerId>
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WarningReport {
    pub season_id: SeasonId,
    pub warned: Vec<PlayerId>,
    pub conflicts: Vec<PlayerId>
}

#[derive(Debug, Clone, PartialEq)]
pub struct RolloverReport {
    pub previous_season: Season,
    pub next_season: Season,
    pub records_seeded: usize,
    /// Players who had already registered for the next season
    pub records_kept: usize
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrant {
    pub player_id: PlayerId,
    pub season_id: SeasonId,
    pub reward_key: String
}

/// Keeps a rating inside the season's `[floor, ceiling]` without moving it
/// against the outcome of the match.
fn bound_to_season(before: i32, after: i32, is_win: bool, season: &Season) -> i32 {
    let bounded = after.max(season.mmr_floor).min(season.mmr_ceiling);

    if is_win {
        bounded.max(before)
    } else {
        bounded.min(before)
    }
}

fn clamp_to_season(mmr: i32, season: &Season) -> i32 {
    mmr.max(season.mmr_floor).min(season.mmr_ceiling)
}

/// A fresh record for `season`, seeded from the player's record in the
/// previous season when there is one. Version 0 (not yet persisted).
pub fn seed_record(
    calculator: &RatingCalculator,
    player_id: PlayerId,
    season: &Season,
    previous: Option<&PlayerSeasonRecord>,
    now: DateTime<Utc>
) -> EngineResult<PlayerSeasonRecord> {
    let seed = calculator.placement_seed(previous.map(|p| p.mmr), season.soft_reset_factor)?;
    let seed = clamp_to_season(seed, season);
    let rank = tier_for(seed)?;

    Ok(PlayerSeasonRecord {
        player_id,
        season_id: season.id,
        mmr: seed,
        peak_mmr: seed,
        tier: rank.tier,
        division: rank.division,
        league_points: league_points(seed, rank.tier, rank.division)?,
        wins: 0,
        losses: 0,
        win_streak: 0,
        loss_streak: 0,
        placement_matches_played: 0,
        placement_wins: 0,
        is_placement_complete: season.placement_matches_required == 0,
        seed_mmr: seed,
        is_in_promos: false,
        promo_wins: 0,
        promo_losses: 0,
        demotion_shield_games: 0,
        is_decay_protected: false,
        decay_periods_applied: 0,
        decay_warning_sent: false,
        last_activity_at: now,
        previous_tier: previous.map(|p| p.tier),
        previous_division: previous.and_then(|p| p.division),
        version: 0
    })
}

/// Composes the rating, tier, promotion, decay and lifecycle rules over the
/// storage, cache and clock collaborators.
///
/// Every write goes through one [`Storage::commit`] so multi-record updates
/// are atomic, and every successful commit invalidates the affected cache
/// entries before returning. Cache failures are logged and ignored.
pub struct SeasonOrchestrator<S: Storage, C: RankCache, K: Clock> {
    storage: S,
    cache: C,
    clock: K,
    config: EngineConfig
}

impl<S: Storage, C: RankCache, K: Clock> SeasonOrchestrator<S, C, K> {
    pub fn new(storage: S, cache: C, clock: K, config: EngineConfig) -> Self {
        SeasonOrchestrator {
            storage,
            cache,
            clock,
            config
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn promotion_rules(&self, season: &Season) -> EngineResult<PromotionRules> {
        let mut rules = PromotionRules::from_season(season)?;
        rules.threshold_lp = self.config.promotion_threshold_lp;
        Ok(rules)
    }

    fn commit(&self, batch: WriteBatch) -> EngineResult<()> {
        let players = batch.touched_records();
        let seasons = batch.touched_seasons();

        self.storage.commit(batch)?;
        self.invalidate(&players, &seasons);

        Ok(())
    }

    /// Post-commit hook. Failures never fail the caller.
    fn invalidate(&self, players: &[(PlayerId, SeasonId)], seasons: &[SeasonId]) {
        for &(player_id, season_id) in players {
            if let Err(e) = self.cache.invalidate(player_id, season_id) {
                warn!(player_id, season_id, "Failed to invalidate cached rank: {}", e);
            }
        }

        for &season_id in seasons {
            if let Err(e) = self.cache.invalidate_leaderboard(season_id) {
                warn!(season_id, "Failed to invalidate cached leaderboard: {}", e);
            }
        }
    }

    fn seed_for(&self, player_id: PlayerId, season: &Season, now: DateTime<Utc>) -> EngineResult<PlayerSeasonRecord> {
        let previous = match season.previous_season_id {
            Some(previous_id) => self.storage.get_player_season_record(player_id, previous_id)?,
            None => None
        };

        let record = seed_record(&self.config.calculator, player_id, season, previous.as_ref(), now)?;

        if let Some(restriction) = season.skill_group_restriction {
            if !restriction.contains(record.mmr) {
                return Err(EngineError::ValidationFailed(vec![format!(
                    "rating {} of player {} is outside the season's skill group [{}, {}]",
                    record.mmr, player_id, restriction.min_mmr, restriction.max_mmr
                )]));
            }
        }

        Ok(record)
    }

    /// The stored record and its version, or a freshly seeded one at version 0.
    fn load_or_seed(
        &self,
        player_id: PlayerId,
        season: &Season,
        now: DateTime<Utc>
    ) -> EngineResult<(PlayerSeasonRecord, u64)> {
        match self.storage.get_player_season_record(player_id, season.id)? {
            Some(record) => {
                let version = record.version;
                Ok((record, version))
            }
            None => Ok((self.seed_for(player_id, season, now)?, 0))
        }
    }

    /// Validates and inserts a new draft season.
    pub fn create_season(&self, season: Season) -> EngineResult<Season> {
        if season.state != SeasonState::Draft {
            return Err(EngineError::InvalidInput(format!(
                "new seasons start in {}, got {}",
                SeasonState::Draft,
                season.state
            )));
        }
        lifecycle::validate_draft(&season)?;

        let created = self.storage.insert_season(&season)?;
        info!(season_id = created.id, "Created season '{}'", created.name);

        Ok(created)
    }

    /// Creates the player's record for a season, seeding it from last
    /// season. Registering twice returns the existing record.
    pub fn register_player(&self, player_id: PlayerId, season_id: SeasonId) -> EngineResult<PlayerSeasonRecord> {
        let season = self.storage.get_season(season_id)?;

        if matches!(
            season.state,
            SeasonState::Ending | SeasonState::Ended | SeasonState::Archived
        ) {
            return Err(EngineError::ValidationFailed(vec![format!(
                "season {} is {}; registration is closed",
                season_id, season.state
            )]));
        }

        if let Some(existing) = self.storage.get_player_season_record(player_id, season_id)? {
            return Ok(existing);
        }

        let mut record = self.seed_for(player_id, &season, self.clock.now())?;
        record.version += 1;

        self.commit(WriteBatch::new().record(record.clone(), 0))?;
        debug!(player_id, season_id, seed = record.seed_mmr, "Registered player");

        Ok(record)
    }

    /// Applies one game to a participant's record. Pure apart from reading
    /// the engine configuration.
    fn apply_result(
        &self,
        record: &PlayerSeasonRecord,
        opponent_mmr: i32,
        is_win: bool,
        season: &Season,
        rules: &PromotionRules,
        now: DateTime<Utc>
    ) -> EngineResult<(PlayerSeasonRecord, ParticipantUpdate)> {
        let mut next = record.clone();
        let was_placement_match = !record.is_placement_complete;

        if is_win {
            next.wins += 1;
            next.win_streak += 1;
            next.loss_streak = 0;
        } else {
            next.losses += 1;
            next.loss_streak += 1;
            next.win_streak = 0;
        }

        let k_factor = self.config.k_factor.select(record.games_played(), record.mmr);
        let rated = self.config.calculator.compute_delta(
            record.mmr,
            opponent_mmr,
            is_win,
            k_factor,
            next.win_streak,
            next.loss_streak
        )?;
        next.mmr = bound_to_season(record.mmr, rated.new_rating, is_win, season);

        let mut event = RankEvent::Unchanged;
        let mut placement_completed = false;

        if was_placement_match {
            next.placement_matches_played += 1;
            if is_win {
                next.placement_wins += 1;
            }

            if next.placement_matches_played >= season.placement_matches_required {
                let placed = self.config.calculator.placement_from_seed(
                    next.seed_mmr,
                    next.placement_wins,
                    next.placement_matches_played
                )?;
                // The placed rating still follows the outcome of this game
                next.mmr = bound_to_season(record.mmr, placed, is_win, season);
                next.is_placement_complete = true;
                placement_completed = true;
            }

            // Provisional until placements finish, then the starting rank
            next.set_rank(tier_for(next.mmr)?);
            next.set_promotion_state(PromotionState::Normal);
            next.demotion_shield_games = 0;
        } else {
            let outcome = promotion::evaluate(
                record.rank(),
                record.promotion_state(),
                record.demotion_shield_games,
                next.mmr,
                is_win,
                rules
            )?;

            next.set_rank(outcome.rank);
            next.set_promotion_state(outcome.state);
            next.demotion_shield_games = outcome.shield_games;
            event = outcome.event;
        }

        next.peak_mmr = next.peak_mmr.max(next.mmr);
        next.league_points = league_points(next.mmr, next.tier, next.division)?;
        decay::reset_on_activity(&mut next, now);
        next.version += 1;

        let update = ParticipantUpdate {
            player_id: record.player_id,
            mmr_before: record.mmr,
            mmr_after: next.mmr,
            delta: next.mmr - record.mmr,
            rank_before: record.rank(),
            rank_after: next.rank(),
            event,
            was_placement_match,
            placement_completed
        };

        Ok((next, update))
    }

    /// Rates a match for both participants and persists both records and
    /// the match result in one atomic commit.
    pub fn record_match(&self, report: &MatchReport) -> EngineResult<RecordedMatch> {
        if report.winner_id == report.loser_id {
            return Err(EngineError::InvalidInput(format!(
                "player {} cannot play against themselves",
                report.winner_id
            )));
        }

        let season = self.storage.get_season(report.season_id)?;
        if !season.state.allows_match_recording() {
            return Err(EngineError::ValidationFailed(vec![format!(
                "season {} is {}; matches are only recorded while {}",
                season.id,
                season.state,
                SeasonState::Active
            )]));
        }

        let now = self.clock.now();
        let rules = self.promotion_rules(&season)?;

        let (winner, winner_version) = self.load_or_seed(report.winner_id, &season, now)?;
        let (loser, loser_version) = self.load_or_seed(report.loser_id, &season, now)?;

        let (winner_next, winner_update) = self.apply_result(&winner, loser.mmr, true, &season, &rules, now)?;
        let (loser_next, loser_update) = self.apply_result(&loser, winner.mmr, false, &season, &rules, now)?;

        let result = MatchResult {
            id: Uuid::new_v4(),
            season_id: season.id,
            winner_id: report.winner_id,
            loser_id: report.loser_id,
            winner_mmr_before: winner.mmr,
            winner_mmr_after: winner_next.mmr,
            loser_mmr_before: loser.mmr,
            loser_mmr_after: loser_next.mmr,
            rating_delta: winner_update.delta,
            loser_rating_delta: loser_update.delta,
            is_placement_match: winner_update.was_placement_match || loser_update.was_placement_match,
            game_mode: report.game_mode,
            played_at: now
        };

        self.commit(
            WriteBatch::new()
                .record(winner_next, winner_version)
                .record(loser_next, loser_version)
                .match_result(result.clone())
        )?;

        info!(
            season_id = season.id,
            winner = report.winner_id,
            loser = report.loser_id,
            "Recorded match: {} {:+}, {} {:+}",
            report.winner_id,
            winner_update.delta,
            report.loser_id,
            loser_update.delta
        );

        Ok(RecordedMatch {
            result,
            winner: winner_update,
            loser: loser_update
        })
    }

    /// Cache-aside read of a player's standing.
    pub fn player_rank(&self, player_id: PlayerId, season_id: SeasonId) -> EngineResult<RankView> {
        match self.cache.get_rank(player_id, season_id) {
            Ok(Some(view)) => return Ok(view),
            Ok(None) => {}
            Err(e) => warn!(player_id, season_id, "Rank cache read failed: {}", e)
        }

        let record = self
            .storage
            .get_player_season_record(player_id, season_id)?
            .ok_or_else(|| EngineError::not_found("player season record", format!("{}:{}", player_id, season_id)))?;
        let season = self.storage.get_season(season_id)?;

        let view = RankView::from_record(&record, season.placement_matches_required);
        if let Err(e) = self.cache.put_rank(&view) {
            warn!(player_id, season_id, "Rank cache write failed: {}", e);
        }

        Ok(view)
    }

    /// Cache-aside read of the season standings, best first.
    pub fn leaderboard(&self, season_id: SeasonId, limit: Option<usize>) -> EngineResult<Vec<LeaderboardEntry>> {
        let mut entries = match self.cache.get_leaderboard(season_id) {
            Ok(Some(entries)) => entries,
            other => {
                if let Err(e) = other {
                    warn!(season_id, "Leaderboard cache read failed: {}", e);
                }

                // Surfaces NotFound for unknown seasons
                self.storage.get_season(season_id)?;
                let records = self.storage.list_player_season_records(season_id)?;
                let entries = Leaderboard::from_records(season_id, &records).entries();

                if let Err(e) = self.cache.put_leaderboard(season_id, &entries) {
                    warn!(season_id, "Leaderboard cache write failed: {}", e);
                }

                entries
            }
        };

        if let Some(limit) = limit {
            entries.truncate(limit);
        }

        Ok(entries)
    }

    /// Runs a lifecycle transition against the season as of
    /// `expected_version` and commits it with its audit entry.
    fn administer<F>(&self, season_id: SeasonId, expected_version: u64, transition: F) -> EngineResult<LifecycleTransition>
    where
        F: FnOnce(&Season, DateTime<Utc>, &[Season]) -> EngineResult<LifecycleTransition>
    {
        let season = self.storage.get_season(season_id)?;
        if season.version != expected_version {
            return Err(EngineError::ConcurrencyConflict {
                entity: "season",
                id: season_id.to_string(),
                expected: expected_version,
                actual: season.version
            });
        }

        let others = self.storage.list_seasons()?;
        let result = transition(&season, self.clock.now(), &others)?;

        self.commit(
            WriteBatch::new()
                .season(result.season.clone(), expected_version)
                .audit(result.audit_entry.clone())
        )?;

        info!(
            season_id,
            actor = result.audit_entry.actor.as_str(),
            "Season {} -> {}",
            result.audit_entry.previous_state,
            result.audit_entry.new_state
        );

        Ok(result)
    }

    pub fn schedule_season(&self, season_id: SeasonId, expected_version: u64, actor: &str) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| lifecycle::schedule(s, actor, now))
    }

    pub fn return_season_to_draft(
        &self,
        season_id: SeasonId,
        expected_version: u64,
        actor: &str
    ) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| lifecycle::return_to_draft(s, actor, now))
    }

    /// Scheduled -> Active after every activation precondition passes. On a
    /// paused season this behaves as [`Self::resume_season`].
    pub fn activate_season(&self, season_id: SeasonId, expected_version: u64, actor: &str) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, others| {
            lifecycle::activate(s, actor, now, others)
        })
    }

    pub fn pause_season(
        &self,
        season_id: SeasonId,
        expected_version: u64,
        actor: &str,
        reason: Option<&str>
    ) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| lifecycle::pause(s, actor, now, reason))
    }

    pub fn resume_season(&self, season_id: SeasonId, expected_version: u64, actor: &str) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, others| {
            lifecycle::resume(s, actor, now, others)
        })
    }

    pub fn terminate_season(
        &self,
        season_id: SeasonId,
        expected_version: u64,
        actor: &str,
        grace_period: Duration
    ) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| {
            lifecycle::terminate(s, actor, now, grace_period)
        })
    }

    pub fn finalize_season(&self, season_id: SeasonId, expected_version: u64, actor: &str) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| lifecycle::finalize(s, actor, now))
    }

    pub fn archive_season(&self, season_id: SeasonId, expected_version: u64, actor: &str) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, _| lifecycle::archive(s, actor, now))
    }

    pub fn transition_season(
        &self,
        season_id: SeasonId,
        to: SeasonState,
        expected_version: u64,
        actor: &str
    ) -> EngineResult<LifecycleTransition> {
        self.administer(season_id, expected_version, |s, now, others| {
            lifecycle::transition_to(s, to, actor, now, others)
        })
    }

    /// Loads an active season for a batch pass and returns it with the
    /// version the pass observed.
    fn season_for_pass(&self, season_id: SeasonId) -> EngineResult<Season> {
        let season = self.storage.get_season(season_id)?;

        if !season.is_active() {
            return Err(EngineError::ValidationFailed(vec![format!(
                "season {} is {}; batch passes only run while {}",
                season_id,
                season.state,
                SeasonState::Active
            )]));
        }

        Ok(season)
    }

    /// Fails if the season moved on while a pass was computing.
    fn ensure_season_unchanged(&self, observed: &Season) -> EngineResult<()> {
        let current = self.storage.get_season(observed.id)?;

        if current.version != observed.version {
            return Err(EngineError::ConcurrencyConflict {
                entity: "season",
                id: observed.id.to_string(),
                expected: observed.version,
                actual: current.version
            });
        }

        Ok(())
    }

    /// Charges decay to every eligible inactive player. Safe to run
    /// repeatedly for the same `now`.
    pub fn run_decay_pass(&self, season_id: SeasonId) -> EngineResult<DecayReport> {
        let season = self.season_for_pass(season_id)?;
        let now = self.clock.now();

        let records = self.storage.list_player_season_records(season_id)?;
        let decisions = decay::evaluate_all(&records, &season, now, &self.config.decay)?;

        self.ensure_season_unchanged(&season)?;

        let mut by_player: HashMap<PlayerId, PlayerSeasonRecord> =
            records.iter().map(|r| (r.player_id, r.clone())).collect();
        let mut report = DecayReport {
            season_id,
            evaluated: records.len(),
            ..Default::default()
        };

        let bar = progress_bar(decisions.len() as u64, "Applying rating decay".to_string());
        for decision in decisions {
            if let Some(bar) = &bar {
                bar.inc(1);
            }

            let Some(mut record) = by_player.remove(&decision.player_id) else {
                continue;
            };
            let expected = record.version;
            decay::apply(&mut record, &decision)?;

            match self.storage.upsert_player_season_record(&record, expected) {
                Ok(_) => {
                    self.invalidate(&[record.key()], &[]);
                    report.decisions.push(decision);
                }
                Err(e) if e.is_retryable() => {
                    warn!(player_id = decision.player_id, season_id, "Skipping decay: {}", e);
                    report.conflicts.push(decision.player_id);
                }
                Err(e) => return Err(e)
            }
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        if !report.decisions.is_empty() {
            self.invalidate(&[], &[season_id]);
        }

        info!(
            season_id,
            "Decay pass: {} evaluated, {} decayed, {} conflicts",
            report.evaluated,
            report.decisions.len(),
            report.conflicts.len()
        );

        Ok(report)
    }

    /// Flags players about to decay. Each player is warned at most once per
    /// stretch of inactivity; delivering the warning is up to the caller.
    pub fn run_decay_warning_pass(&self, season_id: SeasonId) -> EngineResult<WarningReport> {
        let season = self.season_for_pass(season_id)?;
        let now = self.clock.now();

        let records = self.storage.list_player_season_records(season_id)?;
        let to_warn: HashSet<PlayerId> = decay::evaluate_warnings(&records, &season, now, &self.config.decay)
            .into_iter()
            .collect();

        self.ensure_season_unchanged(&season)?;

        let mut report = WarningReport {
            season_id,
            ..Default::default()
        };

        for record in records.iter().filter(|r| to_warn.contains(&r.player_id)) {
            let mut warned = record.clone();
            decay::mark_warned(&mut warned);

            match self.storage.upsert_player_season_record(&warned, record.version) {
                Ok(_) => {
                    self.invalidate(&[warned.key()], &[]);
                    report.warned.push(record.player_id);
                }
                Err(e) if e.is_retryable() => {
                    warn!(player_id = record.player_id, season_id, "Skipping decay warning: {}", e);
                    report.conflicts.push(record.player_id);
                }
                Err(e) => return Err(e)
            }
        }

        info!(season_id, "Decay warning pass: {} warned", report.warned.len());

        Ok(report)
    }

    /// Rewards earned by each placed player of an ended season. Granting
    /// them belongs to the reward catalog.
    pub fn season_rewards(&self, season_id: SeasonId) -> EngineResult<Vec<RewardGrant>> {
        let season = self.storage.get_season(season_id)?;

        if !season.state.allows_reward_distribution() {
            return Err(EngineError::ValidationFailed(vec![format!(
                "season {} is {}; rewards are distributed once {}",
                season_id,
                season.state,
                SeasonState::Ended
            )]));
        }

        let grants = self
            .storage
            .list_player_season_records(season_id)?
            .into_iter()
            .filter(|r| r.is_placement_complete)
            .flat_map(|r| {
                let (player_id, tier) = (r.player_id, r.tier);
                season
                    .rewards
                    .iter()
                    .filter(move |reward| tier >= reward.min_tier)
                    .map(move |reward| RewardGrant {
                        player_id,
                        season_id,
                        reward_key: reward.reward_key.clone()
                    })
            })
            .collect();

        Ok(grants)
    }

    /// Ends `current_season_id`, seeds every player into `next_season_id`
    /// with a soft reset, archives the old standings and activates the next
    /// season. All of it lands in a single commit or not at all.
    pub fn start_next_season(
        &self,
        current_season_id: SeasonId,
        expected_version: u64,
        next_season_id: SeasonId,
        actor: &str
    ) -> EngineResult<RolloverReport> {
        let current = self.storage.get_season(current_season_id)?;
        if current.version != expected_version {
            return Err(EngineError::ConcurrencyConflict {
                entity: "season",
                id: current_season_id.to_string(),
                expected: expected_version,
                actual: current.version
            });
        }

        let next = self.storage.get_season(next_season_id)?;
        let next_version = next.version;
        let now = self.clock.now();
        let mut audit_entries = Vec::new();

        // End the current season
        let mut ended = current.clone();
        if matches!(ended.state, SeasonState::Active | SeasonState::Paused) {
            let t = lifecycle::terminate(&ended, actor, now, Duration::zero())?;
            audit_entries.push(t.audit_entry);
            ended = t.season;
        }
        if ended.state == SeasonState::Ending {
            let t = lifecycle::finalize(&ended, actor, now)?;
            audit_entries.push(t.audit_entry);
            ended = t.season;
        }
        if ended.state != SeasonState::Ended {
            return Err(EngineError::invalid_transition(ended.state, SeasonState::Ending));
        }

        // Bring the next season up
        let mut activated = next.clone();
        activated.previous_season_id = Some(current_season_id);
        if activated.state == SeasonState::Draft {
            let t = lifecycle::schedule(&activated, actor, now)?;
            audit_entries.push(t.audit_entry);
            activated = t.season;
        }

        let others: Vec<Season> = self
            .storage
            .list_seasons()?
            .into_iter()
            .filter(|s| s.id != current_season_id && s.id != next_season_id)
            .chain(std::iter::once(ended.clone()))
            .collect();
        let t = lifecycle::activate(&activated, actor, now, &others)?;
        audit_entries.push(t.audit_entry);
        activated = t.season;

        // Soft-reset every record of the old season
        let old_records = self.storage.list_player_season_records(current_season_id)?;
        let registered: HashSet<PlayerId> = self
            .storage
            .list_player_season_records(next_season_id)?
            .iter()
            .map(|r| r.player_id)
            .collect();

        let calculator = self.config.calculator;
        let seeded = old_records
            .par_iter()
            .filter(|r| !registered.contains(&r.player_id))
            .map(|r| -> EngineResult<PlayerSeasonRecord> {
                let mut record = seed_record(&calculator, r.player_id, &activated, Some(r), now)?;
                record.version += 1;
                Ok(record)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let mut batch = WriteBatch::new()
            .season(ended.clone(), expected_version)
            .season(activated.clone(), next_version);
        for entry in audit_entries {
            batch = batch.audit(entry);
        }

        let bar = progress_bar(old_records.len() as u64, "Seeding next season".to_string());
        for record in &old_records {
            batch = batch.history(PlayerSeasonHistory::from_record(record, now));
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        let records_seeded = seeded.len();
        for record in seeded {
            batch = batch.record(record, 0);
        }
        if let Some(bar) = &bar {
            bar.finish();
        }

        self.commit(batch)?;
        // Old-season ranks are now history
        let old_keys: Vec<(PlayerId, SeasonId)> = old_records.iter().map(|r| r.key()).collect();
        self.invalidate(&old_keys, &[]);

        info!(
            previous = current_season_id,
            next = next_season_id,
            "Season rollover complete: {} records seeded, {} already registered",
            records_seeded,
            registered.len()
        );

        Ok(RolloverReport {
            previous_season: ended,
            next_season: activated,
            records_seeded,
            records_kept: registered.len()
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::{
        config::EngineConfig,
        database::{
            db_structs::{Season, SkillGroupRestriction},
            in_memory::{FixedClock, InMemoryRankCache, InMemoryStore},
            store::{Clock, RankCache, Storage}
        },
        error::EngineError,
        model::{
            orchestrator::{bound_to_season, MatchReport, SeasonOrchestrator},
            promotion::RankEvent,
            structures::{
                game_mode::GameMode,
                season_state::SeasonState,
                tier::{Division, Tier}
            },
            tier_mapper::TierDivision
        },
        utils::test_utils::{generate_draft_season, generate_record, generate_season, test_time}
    };

    type TestOrchestrator = SeasonOrchestrator<InMemoryStore, InMemoryRankCache, FixedClock>;

    fn orchestrator() -> TestOrchestrator {
        SeasonOrchestrator::new(
            InMemoryStore::new(),
            InMemoryRankCache::new(),
            FixedClock::new(test_time()),
            EngineConfig::default()
        )
    }

    fn with_active_season() -> TestOrchestrator {
        let o = orchestrator();
        o.storage().insert_season(&generate_season(1)).unwrap();
        o
    }

    fn report(winner_id: i32, loser_id: i32) -> MatchReport {
        MatchReport {
            season_id: 1,
            winner_id,
            loser_id,
            game_mode: GameMode::Solo
        }
    }

    #[test]
    fn test_bound_to_season_never_moves_against_outcome() {
        let mut season = generate_season(1);
        season.mmr_floor = 1000;
        season.mmr_ceiling = 2000;

        assert_eq!(bound_to_season(1990, 2010, true, &season), 2000);
        assert_eq!(bound_to_season(1010, 990, false, &season), 1000);
        // Already outside the window: never pulled back in against the outcome
        assert_eq!(bound_to_season(900, 880, false, &season), 900);
        assert_eq!(bound_to_season(2100, 2110, true, &season), 2100);
    }

    #[test]
    fn test_record_match_equal_ratings() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 1200), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1200), 0).unwrap();

        let recorded = o.record_match(&report(1, 2)).unwrap();

        assert_eq!(recorded.winner.mmr_after, 1216);
        assert_eq!(recorded.loser.mmr_after, 1184);
        assert_eq!(recorded.result.rating_delta, 16);
        assert_eq!(recorded.result.loser_rating_delta, -16);
        assert!(!recorded.result.is_placement_match);

        let winner = o.storage().get_player_season_record(1, 1).unwrap().unwrap();
        let loser = o.storage().get_player_season_record(2, 1).unwrap().unwrap();
        assert_eq!((winner.wins, winner.win_streak, winner.version), (21, 1, 2));
        assert_eq!((loser.losses, loser.loss_streak), (21, 1));
        // 1184 is below Silver II, no shield
        assert_eq!(loser.division, Some(Division::III));
        assert!(matches!(recorded.loser.event, RankEvent::Demoted { .. }));
        assert_eq!(o.storage().match_results().unwrap().len(), 1);
    }

    #[test]
    fn test_record_match_rejects_self_play() {
        let o = with_active_season();

        assert!(matches!(o.record_match(&report(1, 1)).unwrap_err(), EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_record_match_requires_active_season() {
        let o = orchestrator();
        let mut season = generate_season(1);
        season.state = SeasonState::Paused;
        o.storage().insert_season(&season).unwrap();

        assert!(matches!(
            o.record_match(&report(1, 2)).unwrap_err(),
            EngineError::ValidationFailed(_)
        ));
        assert!(o.storage().match_results().unwrap().is_empty());
    }

    #[test]
    fn test_record_match_unknown_season() {
        let o = orchestrator();

        assert!(matches!(o.record_match(&report(1, 2)).unwrap_err(), EngineError::NotFound { .. }));
    }

    #[test]
    fn test_new_players_are_seeded_and_placed() {
        let o = with_active_season();

        let first = o.record_match(&report(1, 2)).unwrap();
        assert!(first.result.is_placement_match);
        assert_eq!(first.winner.mmr_before, 1200);

        // 10 placements, player 1 wins all of them
        for _ in 1..10 {
            o.record_match(&report(1, 2)).unwrap();
        }

        let winner = o.storage().get_player_season_record(1, 1).unwrap().unwrap();
        let loser = o.storage().get_player_season_record(2, 1).unwrap().unwrap();

        assert!(winner.is_placement_complete);
        assert_eq!(winner.placement_matches_played, 10);
        // 1200 + (1.0 - 0.5) * 400
        assert_eq!(winner.mmr, 1400);
        assert_eq!(loser.mmr, 1000);
        assert_eq!(winner.tier, Tier::Gold);
        assert_eq!(loser.tier, Tier::Silver);
    }

    #[test]
    fn test_final_placement_game_follows_outcome() {
        // Every win/loss pattern over the first nine placements, then player 1
        // takes the tenth
        for pattern in 0u32..512 {
            let o = with_active_season();
            for game in 0..9 {
                let game_report = if pattern & (1 << game) != 0 { report(1, 2) } else { report(2, 1) };
                o.record_match(&game_report).unwrap();
            }

            let last = o.record_match(&report(1, 2)).unwrap();

            assert!(last.winner.placement_completed && last.loser.placement_completed);
            assert!(
                last.winner.delta >= 0,
                "pattern {:09b}: winner {} -> {}",
                pattern,
                last.winner.mmr_before,
                last.winner.mmr_after
            );
            assert!(
                last.loser.delta <= 0,
                "pattern {:09b}: loser {} -> {}",
                pattern,
                last.loser.mmr_before,
                last.loser.mmr_after
            );
            assert!(last.result.rating_delta >= 0);
            assert!(last.result.loser_rating_delta <= 0);
        }
    }

    #[test]
    fn test_placements_never_exceed_requirement() {
        let o = with_active_season();

        for _ in 0..12 {
            o.record_match(&report(1, 2)).unwrap();
        }

        let record = o.storage().get_player_season_record(1, 1).unwrap().unwrap();
        assert_eq!(record.placement_matches_played, 10);
        assert_eq!(record.wins, 12);
    }

    #[test]
    fn test_promotion_series_through_orchestrator() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 1290), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1290), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(3, 1, 1290), 0).unwrap();

        let entered = o.record_match(&report(1, 2)).unwrap();
        assert_eq!(entered.winner.event, RankEvent::EnteredPromos);
        assert_eq!(entered.winner.rank_after, entered.winner.rank_before);

        o.record_match(&report(1, 3)).unwrap();
        let promoted = o.record_match(&report(1, 2)).unwrap();

        assert!(matches!(promoted.winner.event, RankEvent::Promoted { .. }));
        let record = o.storage().get_player_season_record(1, 1).unwrap().unwrap();
        assert_eq!((record.tier, record.division), (Tier::Silver, Some(Division::I)));
        assert!(!record.is_in_promos);
        assert_eq!(record.demotion_shield_games, 3);
    }

    #[test]
    fn test_stale_record_aborts_both_updates() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 1500), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1500), 0).unwrap();

        let mut first = o.storage().get_player_season_record(1, 1).unwrap().unwrap();
        let mut second = o.storage().get_player_season_record(2, 1).unwrap().unwrap();
        first.version += 1;
        second.version += 1;

        // Simulates a concurrent writer landing between read and commit
        let batch = crate::database::store::WriteBatch::new()
            .record(first.clone(), 1)
            .record(second.clone(), 0);
        assert!(o.storage().commit(batch).unwrap_err().is_retryable());

        assert_eq!(o.storage().get_player_season_record(1, 1).unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_cache_invalidated_after_match() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 1500), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1500), 0).unwrap();

        let before = o.player_rank(1, 1).unwrap();
        o.leaderboard(1, None).unwrap();
        assert_eq!(o.cache().get_rank(1, 1).unwrap(), Some(before.clone()));

        o.record_match(&report(1, 2)).unwrap();

        assert_eq!(o.cache().get_rank(1, 1).unwrap(), None);
        assert_eq!(o.cache().get_leaderboard(1).unwrap(), None);
        assert!(o.player_rank(1, 1).unwrap().mmr > before.mmr);
    }

    #[test]
    fn test_cache_outage_does_not_block_matches() {
        let o = with_active_season();
        o.cache().set_unavailable(true);

        assert!(o.record_match(&report(1, 2)).is_ok());
        assert_eq!(o.player_rank(1, 1).unwrap().wins, 1);
        assert!(o.leaderboard(1, None).unwrap().is_empty());
    }

    #[test]
    fn test_player_rank_missing_record() {
        let o = with_active_season();

        assert!(matches!(o.player_rank(5, 1).unwrap_err(), EngineError::NotFound { .. }));
    }

    #[test]
    fn test_leaderboard_limit_and_order() {
        let o = with_active_season();
        for (id, mmr) in [(1, 1500), (2, 2700), (3, 1900)] {
            o.storage().upsert_player_season_record(&generate_record(id, 1, mmr), 0).unwrap();
        }

        let top = o.leaderboard(1, Some(2)).unwrap();

        assert_eq!(top.iter().map(|e| e.player_id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(top[0].position, 1);
    }

    #[test]
    fn test_admin_requires_current_version() {
        let o = with_active_season();
        let season = o.storage().get_season(1).unwrap();

        let err = o.pause_season(1, season.version - 1, "admin", None).unwrap_err();
        assert!(err.is_retryable());

        let paused = o.pause_season(1, season.version, "admin", Some("maintenance")).unwrap();
        assert_eq!(paused.season.state, SeasonState::Paused);
        assert_eq!(o.storage().get_season(1).unwrap().version, season.version + 1);
        assert_eq!(o.storage().audit_log(1).unwrap().len(), 1);

        assert!(matches!(
            o.pause_season(1, season.version + 1, "admin", None).unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_create_and_activate_season() {
        let o = orchestrator();
        let created = o.create_season(generate_draft_season(1)).unwrap();

        let scheduled = o.schedule_season(1, created.version, "admin").unwrap().season;
        let active = o.activate_season(1, scheduled.version, "admin").unwrap().season;

        assert!(active.is_active());
        assert_eq!(o.storage().audit_log(1).unwrap().len(), 2);
    }

    #[test]
    fn test_create_season_rejects_invalid_draft() {
        let o = orchestrator();
        let mut season = generate_draft_season(1);
        season.soft_reset_factor = 2.0;

        assert!(matches!(o.create_season(season).unwrap_err(), EngineError::ValidationFailed(_)));
    }

    #[test]
    fn test_decay_pass_is_idempotent() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 2650), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1500), 0).unwrap();
        o.clock().advance(Duration::days(30));

        let first = o.run_decay_pass(1).unwrap();
        let second = o.run_decay_pass(1).unwrap();

        assert_eq!(first.evaluated, 2);
        assert_eq!(first.decisions.len(), 1);
        assert!(second.decisions.is_empty());
        assert_eq!(o.storage().get_player_season_record(1, 1).unwrap().unwrap().mmr, 2625);
    }

    #[test]
    fn test_decay_pass_needs_active_season() {
        let o = orchestrator();
        o.storage().insert_season(&generate_draft_season(1)).unwrap();

        assert!(matches!(o.run_decay_pass(1).unwrap_err(), EngineError::ValidationFailed(_)));
    }

    #[test]
    fn test_warning_pass_warns_once() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 2650), 0).unwrap();
        o.clock().advance(Duration::days(26));

        assert_eq!(o.run_decay_warning_pass(1).unwrap().warned, vec![1]);
        assert!(o.run_decay_warning_pass(1).unwrap().warned.is_empty());
        assert!(o.storage().get_player_season_record(1, 1).unwrap().unwrap().decay_warning_sent);
    }

    #[test]
    fn test_register_player_seeds_from_previous_season() {
        let o = orchestrator();
        let mut previous = generate_season(1);
        previous.state = SeasonState::Ended;
        o.storage().insert_season(&previous).unwrap();
        o.storage().upsert_player_season_record(&generate_record(7, 1, 2000), 0).unwrap();

        let mut next = generate_draft_season(2);
        next.previous_season_id = Some(1);
        o.storage().insert_season(&next).unwrap();

        let record = o.register_player(7, 2).unwrap();

        assert_eq!(record.mmr, 1600);
        assert_eq!(record.previous_tier, Some(Tier::Platinum));
        assert!(!record.is_placement_complete);
        assert_eq!(o.register_player(7, 2).unwrap(), record);
    }

    #[test]
    fn test_register_player_outside_skill_group() {
        let o = orchestrator();
        let mut season = generate_season(1);
        season.skill_group_restriction = Some(SkillGroupRestriction {
            min_mmr: 2000,
            max_mmr: 5000
        });
        o.storage().insert_season(&season).unwrap();

        assert!(matches!(o.register_player(1, 1).unwrap_err(), EngineError::ValidationFailed(_)));
    }

    #[test]
    fn test_rewards_only_after_end() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 1500), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1100), 0).unwrap();

        assert!(o.season_rewards(1).is_err());

        let season = o.storage().get_season(1).unwrap();
        let ending = o.terminate_season(1, season.version, "admin", Duration::zero()).unwrap().season;
        o.finalize_season(1, ending.version, "admin").unwrap();

        let grants = o.season_rewards(1).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].player_id, 1);
    }

    #[test]
    fn test_start_next_season_soft_resets_everyone() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 2000), 0).unwrap();
        o.storage().upsert_player_season_record(&generate_record(2, 1, 1200), 0).unwrap();
        let next = o.create_season(generate_draft_season(2)).unwrap();
        let current = o.storage().get_season(1).unwrap();

        let report = o.start_next_season(1, current.version, next.id, "admin").unwrap();

        assert_eq!(report.records_seeded, 2);
        assert_eq!(report.previous_season.state, SeasonState::Ended);
        assert_eq!(report.next_season.state, SeasonState::Active);
        assert_eq!(report.next_season.previous_season_id, Some(1));

        let seeded = o.storage().get_player_season_record(1, 2).unwrap().unwrap();
        assert_eq!(seeded.mmr, 1600);
        assert_eq!(
            seeded.previous_rank(),
            Some(TierDivision {
                tier: Tier::Platinum,
                division: Some(Division::II)
            })
        );
        let low = o.storage().get_player_season_record(2, 2).unwrap().unwrap();
        assert_eq!(low.previous_rank().map(|r| r.tier), Some(Tier::Silver));
        assert_eq!(o.storage().history(1).unwrap().len(), 1);
        assert_eq!(o.storage().get_season(1).unwrap().state, SeasonState::Ended);
    }

    #[test]
    fn test_failed_rollover_changes_nothing() {
        let o = with_active_season();
        o.storage().upsert_player_season_record(&generate_record(1, 1, 2000), 0).unwrap();
        let mut next = generate_draft_season(2);
        next.rewards.clear();
        o.storage().insert_season(&next).unwrap();
        let current = o.storage().get_season(1).unwrap();

        // The next season cannot activate without rewards
        assert!(o.start_next_season(1, current.version, 2, "admin").is_err());

        assert_eq!(o.storage().get_season(1).unwrap(), current);
        assert_eq!(o.storage().get_player_season_record(1, 2).unwrap(), None);
        assert!(o.storage().history(1).unwrap().is_empty());
    }

    #[test]
    fn test_new_season_in_other_type_is_independent() {
        let o = with_active_season();
        let mut casual: Season = generate_draft_season(2);
        casual.season_type = crate::model::structures::season_type::SeasonType::Casual;
        casual.state = SeasonState::Scheduled;
        o.storage().insert_season(&casual).unwrap();

        assert!(o.activate_season(2, casual.version, "admin").is_ok());
        assert_eq!(o.clock().now(), test_time());
    }
}
