use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock}
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    database::{
        db_structs::{AuditLogEntry, MatchResult, PlayerId, PlayerSeasonHistory, PlayerSeasonRecord, Season, SeasonId},
        store::{Clock, RankCache, Storage, WriteBatch}
    },
    error::{CacheError, EngineError, EngineResult},
    model::leaderboard::{LeaderboardEntry, RankView}
};

/// Everything the in-memory store holds. Also the on-disk snapshot format
/// used by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub seasons: Vec<Season>,
    pub records: Vec<PlayerSeasonRecord>,
    #[serde(default)]
    pub match_results: Vec<MatchResult>,
    #[serde(default)]
    pub audit_log: Vec<AuditLogEntry>,
    #[serde(default)]
    pub history: Vec<PlayerSeasonHistory>
}

#[derive(Default)]
struct StoreState {
    seasons: IndexMap<SeasonId, Season>,
    records: IndexMap<(PlayerId, SeasonId), PlayerSeasonRecord>,
    match_results: Vec<MatchResult>,
    audit_log: Vec<AuditLogEntry>,
    history: Vec<PlayerSeasonHistory>
}

impl StoreState {
    fn record_version(&self, key: &(PlayerId, SeasonId)) -> u64 {
        self.records.get(key).map(|r| r.version).unwrap_or(0)
    }

    fn check_record(&self, record: &PlayerSeasonRecord, expected_version: u64) -> EngineResult<()> {
        let actual = self.record_version(&record.key());
        if actual != expected_version {
            return Err(EngineError::ConcurrencyConflict {
                entity: "player season record",
                id: format!("{}:{}", record.player_id, record.season_id),
                expected: expected_version,
                actual
            });
        }

        Ok(())
    }

    fn check_season(&self, season: &Season, expected_version: u64) -> EngineResult<()> {
        let actual = self
            .seasons
            .get(&season.id)
            .map(|s| s.version)
            .ok_or_else(|| EngineError::not_found("season", season.id))?;

        if actual != expected_version {
            return Err(EngineError::ConcurrencyConflict {
                entity: "season",
                id: season.id.to_string(),
                expected: expected_version,
                actual
            });
        }

        Ok(())
    }
}

/// Storage backed by in-process maps behind one lock, so batches are atomic.
/// Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let state = StoreState {
            seasons: snapshot.seasons.into_iter().map(|s| (s.id, s)).collect(),
            records: snapshot.records.into_iter().map(|r| (r.key(), r)).collect(),
            match_results: snapshot.match_results,
            audit_log: snapshot.audit_log,
            history: snapshot.history
        };

        InMemoryStore {
            state: Arc::new(RwLock::new(state))
        }
    }

    pub fn snapshot(&self) -> EngineResult<StoreSnapshot> {
        let state = self.read()?;

        Ok(StoreSnapshot {
            seasons: state.seasons.values().cloned().collect(),
            records: state.records.values().cloned().collect(),
            match_results: state.match_results.clone(),
            audit_log: state.audit_log.clone(),
            history: state.history.clone()
        })
    }

    pub fn match_results(&self) -> EngineResult<Vec<MatchResult>> {
        Ok(self.read()?.match_results.clone())
    }

    pub fn audit_log(&self, season_id: SeasonId) -> EngineResult<Vec<AuditLogEntry>> {
        Ok(self
            .read()?
            .audit_log
            .iter()
            .filter(|e| e.season_id == season_id)
            .cloned()
            .collect())
    }

    pub fn history(&self, player_id: PlayerId) -> EngineResult<Vec<PlayerSeasonHistory>> {
        Ok(self
            .read()?
            .history
            .iter()
            .filter(|h| h.player_id == player_id)
            .cloned()
            .collect())
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| EngineError::Storage("store lock poisoned during read".to_string()))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| EngineError::Storage("store lock poisoned during write".to_string()))
    }
}

impl Storage for InMemoryStore {
    fn get_player_season_record(
        &self,
        player_id: PlayerId,
        season_id: SeasonId
    ) -> EngineResult<Option<PlayerSeasonRecord>> {
        Ok(self.read()?.records.get(&(player_id, season_id)).cloned())
    }

    fn upsert_player_season_record(
        &self,
        record: &PlayerSeasonRecord,
        expected_version: u64
    ) -> EngineResult<PlayerSeasonRecord> {
        let mut state = self.write()?;
        state.check_record(record, expected_version)?;
        state.records.insert(record.key(), record.clone());

        Ok(record.clone())
    }

    fn list_player_season_records(&self, season_id: SeasonId) -> EngineResult<Vec<PlayerSeasonRecord>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| r.season_id == season_id)
            .cloned()
            .collect())
    }

    fn append_match_result(&self, result: &MatchResult) -> EngineResult<()> {
        self.write()?.match_results.push(result.clone());
        Ok(())
    }

    fn get_season(&self, season_id: SeasonId) -> EngineResult<Season> {
        self.read()?
            .seasons
            .get(&season_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("season", season_id))
    }

    fn list_seasons(&self) -> EngineResult<Vec<Season>> {
        Ok(self.read()?.seasons.values().cloned().collect())
    }

    fn insert_season(&self, season: &Season) -> EngineResult<Season> {
        let mut state = self.write()?;

        if let Some(existing) = state.seasons.get(&season.id) {
            return Err(EngineError::ConcurrencyConflict {
                entity: "season",
                id: season.id.to_string(),
                expected: 0,
                actual: existing.version
            });
        }

        state.seasons.insert(season.id, season.clone());
        Ok(season.clone())
    }

    fn update_season(&self, season: &Season, expected_version: u64) -> EngineResult<Season> {
        let mut state = self.write()?;
        state.check_season(season, expected_version)?;
        state.seasons.insert(season.id, season.clone());

        Ok(season.clone())
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> EngineResult<()> {
        self.write()?.audit_log.push(entry.clone());
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> EngineResult<()> {
        let mut state = self.write()?;

        for (season, expected) in &batch.seasons {
            state.check_season(season, *expected)?;
        }
        for (record, expected) in &batch.records {
            state.check_record(record, *expected)?;
        }

        debug!(
            seasons = batch.seasons.len(),
            records = batch.records.len(),
            match_results = batch.match_results.len(),
            "Committing write batch"
        );

        for (season, _) in batch.seasons {
            state.seasons.insert(season.id, season);
        }
        for (record, _) in batch.records {
            state.records.insert(record.key(), record);
        }
        state.match_results.extend(batch.match_results);
        state.audit_log.extend(batch.audit_entries);
        state.history.extend(batch.history);

        Ok(())
    }
}

#[derive(Default)]
struct CacheState {
    ranks: HashMap<(PlayerId, SeasonId), RankView>,
    leaderboards: HashMap<SeasonId, Vec<LeaderboardEntry>>,
    invalidations: u64
}

/// Process-local rank cache. Can be switched off to simulate an outage.
#[derive(Clone, Default)]
pub struct InMemoryRankCache {
    state: Arc<Mutex<CacheState>>,
    unavailable: Arc<std::sync::atomic::AtomicBool>
}

impl InMemoryRankCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of invalidation calls served so far.
    pub fn invalidations(&self) -> u64 {
        self.state.lock().map(|s| s.invalidations).unwrap_or(0)
    }

    fn lock(&self, operation: &'static str) -> Result<std::sync::MutexGuard<'_, CacheState>, CacheError> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CacheError::Unavailable(format!("cache offline during {}", operation)));
        }

        self.state.lock().map_err(|_| CacheError::LockPoisoned(operation))
    }
}

impl RankCache for InMemoryRankCache {
    fn get_rank(&self, player_id: PlayerId, season_id: SeasonId) -> Result<Option<RankView>, CacheError> {
        Ok(self.lock("get_rank")?.ranks.get(&(player_id, season_id)).cloned())
    }

    fn put_rank(&self, view: &RankView) -> Result<(), CacheError> {
        self.lock("put_rank")?
            .ranks
            .insert((view.player_id, view.season_id), view.clone());
        Ok(())
    }

    fn get_leaderboard(&self, season_id: SeasonId) -> Result<Option<Vec<LeaderboardEntry>>, CacheError> {
        Ok(self.lock("get_leaderboard")?.leaderboards.get(&season_id).cloned())
    }

    fn put_leaderboard(&self, season_id: SeasonId, entries: &[LeaderboardEntry]) -> Result<(), CacheError> {
        self.lock("put_leaderboard")?
            .leaderboards
            .insert(season_id, entries.to_vec());
        Ok(())
    }

    fn invalidate(&self, player_id: PlayerId, season_id: SeasonId) -> Result<(), CacheError> {
        let mut state = self.lock("invalidate")?;
        state.ranks.remove(&(player_id, season_id));
        state.invalidations += 1;
        Ok(())
    }

    fn invalidate_leaderboard(&self, season_id: SeasonId) -> Result<(), CacheError> {
        let mut state = self.lock("invalidate_leaderboard")?;
        state.leaderboards.remove(&season_id);
        state.invalidations += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replaying scheduled passes.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock {
            now: Arc::new(Mutex::new(now))
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
