use chrono::{DateTime, Utc};

use crate::{
    database::db_structs::{
        AuditLogEntry, MatchResult, PlayerId, PlayerSeasonHistory, PlayerSeasonRecord, Season, SeasonId
    },
    error::{CacheError, EngineResult},
    model::leaderboard::{LeaderboardEntry, RankView}
};

/// Persistence collaborator. Implementations own the optimistic concurrency
/// check: a write whose `expected_version` differs from the persisted version
/// fails with `ConcurrencyConflict` and changes nothing. A record that does
/// not exist yet has version 0.
pub trait Storage: Send + Sync {
    fn get_player_season_record(
        &self,
        player_id: PlayerId,
        season_id: SeasonId
    ) -> EngineResult<Option<PlayerSeasonRecord>>;

    fn upsert_player_season_record(
        &self,
        record: &PlayerSeasonRecord,
        expected_version: u64
    ) -> EngineResult<PlayerSeasonRecord>;

    fn list_player_season_records(&self, season_id: SeasonId) -> EngineResult<Vec<PlayerSeasonRecord>>;

    fn append_match_result(&self, result: &MatchResult) -> EngineResult<()>;

    /// Fails with `NotFound` when the season does not exist.
    fn get_season(&self, season_id: SeasonId) -> EngineResult<Season>;

    fn list_seasons(&self) -> EngineResult<Vec<Season>>;

    /// Fails with `ConcurrencyConflict` if the id is taken.
    fn insert_season(&self, season: &Season) -> EngineResult<Season>;

    fn update_season(&self, season: &Season, expected_version: u64) -> EngineResult<Season>;

    fn append_audit_log(&self, entry: &AuditLogEntry) -> EngineResult<()>;

    /// Applies every write in the batch or none of them. All expected
    /// versions are checked before anything is written.
    fn commit(&self, batch: WriteBatch) -> EngineResult<()>;
}

/// A set of writes applied atomically by [`Storage::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub seasons: Vec<(Season, u64)>,
    pub records: Vec<(PlayerSeasonRecord, u64)>,
    pub match_results: Vec<MatchResult>,
    pub audit_entries: Vec<AuditLogEntry>,
    pub history: Vec<PlayerSeasonHistory>
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn season(mut self, season: Season, expected_version: u64) -> Self {
        self.seasons.push((season, expected_version));
        self
    }

    pub fn record(mut self, record: PlayerSeasonRecord, expected_version: u64) -> Self {
        self.records.push((record, expected_version));
        self
    }

    pub fn match_result(mut self, result: MatchResult) -> Self {
        self.match_results.push(result);
        self
    }

    pub fn audit(mut self, entry: AuditLogEntry) -> Self {
        self.audit_entries.push(entry);
        self
    }

    pub fn history(mut self, row: PlayerSeasonHistory) -> Self {
        self.history.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty()
            && self.records.is_empty()
            && self.match_results.is_empty()
            && self.audit_entries.is_empty()
            && self.history.is_empty()
    }

    /// Players whose records this batch touches, grouped by season.
    pub fn touched_records(&self) -> Vec<(PlayerId, SeasonId)> {
        self.records.iter().map(|(r, _)| r.key()).collect()
    }

    pub fn touched_seasons(&self) -> Vec<SeasonId> {
        let mut ids: Vec<SeasonId> = self
            .seasons
            .iter()
            .map(|(s, _)| s.id)
            .chain(self.records.iter().map(|(r, _)| r.season_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Best-effort rank/leaderboard cache. Callers log failures and carry on.
pub trait RankCache: Send + Sync {
    fn get_rank(&self, player_id: PlayerId, season_id: SeasonId) -> Result<Option<RankView>, CacheError>;

    fn put_rank(&self, view: &RankView) -> Result<(), CacheError>;

    fn get_leaderboard(&self, season_id: SeasonId) -> Result<Option<Vec<LeaderboardEntry>>, CacheError>;

    fn put_leaderboard(&self, season_id: SeasonId, entries: &[LeaderboardEntry]) -> Result<(), CacheError>;

    fn invalidate(&self, player_id: PlayerId, season_id: SeasonId) -> Result<(), CacheError>;

    fn invalidate_leaderboard(&self, season_id: SeasonId) -> Result<(), CacheError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
