//! SQLite-backed entity store
//!
//! Idempotent persistence for match metadata, team participations, prior
//! performances and finished feature rows. Writes are upserts; reads return
//! exactly what was stored, which is what makes re-resolution drift-free.

use crate::data::standings::LeagueDiffs;
use crate::features::{FeatureRow, HistorySlot};
use crate::resolve::history::PriorPerformance;
use crate::resolve::squad::TeamParticipation;
use crate::{
    Competition, LineupError, MatchId, MatchKey, PlayerId, Result, Severity, Side, TeamId,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// Match metadata as maintained by the ingest layer
#[derive(Debug, Clone, PartialEq)]
pub struct MatchInfo {
    pub key: MatchKey,
    pub season: String,
    pub date: NaiveDate,
    /// Domestic league country for league matches, "T" for tournament ones
    pub league: String,
    pub home: TeamId,
    pub away: TeamId,
}

/// A team as maintained by the ingest layer
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    /// Domestic league country, used for the history coverage gate
    pub league: String,
}

/// Idempotent entity persistence and lookup
pub trait Store {
    fn match_info(&self, key: MatchKey) -> Result<Option<MatchInfo>>;
    /// All tournament matches, ordered by date
    fn tournament_matches(&self) -> Result<Vec<MatchInfo>>;
    fn tournament_matches_in_season(&self, season: &str) -> Result<Vec<MatchInfo>>;
    /// League matches linked to a tournament match (externally maintained
    /// many-to-many join)
    fn linked_league_matches(&self, tournament: MatchId) -> Result<Vec<MatchId>>;

    fn team(&self, id: TeamId) -> Result<Option<TeamRecord>>;
    fn put_player(&self, id: PlayerId, name: &str) -> Result<()>;
    fn player_name(&self, id: PlayerId) -> Result<Option<String>>;

    fn participation(&self, team: TeamId, match_key: MatchKey)
        -> Result<Option<TeamParticipation>>;
    fn put_participation(&self, participation: &TeamParticipation) -> Result<()>;

    fn prior_performance(
        &self,
        player: PlayerId,
        match_key: MatchKey,
    ) -> Result<Option<PriorPerformance>>;
    fn put_prior_performance(&self, perf: &PriorPerformance) -> Result<()>;

    /// Whether any feature rows exist for a tournament match (batch skip)
    fn has_performances(&self, tournament: MatchId) -> Result<bool>;
    fn put_feature_row(&self, row: &FeatureRow) -> Result<()>;
    fn feature_row(&self, player: PlayerId, match_id: MatchId) -> Result<Option<FeatureRow>>;
    /// All feature rows, ordered by match then player
    fn feature_rows(&self) -> Result<Vec<FeatureRow>>;
}

/// Store implementation over a local SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                league TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER NOT NULL,
                competition TEXT NOT NULL,
                season TEXT NOT NULL,
                date TEXT NOT NULL,
                league TEXT NOT NULL,
                home_team_id INTEGER NOT NULL,
                away_team_id INTEGER NOT NULL,
                PRIMARY KEY (id, competition)
            );

            CREATE TABLE IF NOT EXISTS match_links (
                tournament_id INTEGER NOT NULL,
                league_id INTEGER NOT NULL,
                PRIMARY KEY (tournament_id, league_id)
            );

            CREATE TABLE IF NOT EXISTS participations (
                team_id INTEGER NOT NULL,
                match_id INTEGER NOT NULL,
                competition TEXT NOT NULL,
                side TEXT NOT NULL,
                predicted TEXT NOT NULL,
                starting TEXT NOT NULL,
                bench TEXT NOT NULL,
                substitutes TEXT NOT NULL,
                missing TEXT NOT NULL,
                malformed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (team_id, match_id, competition)
            );

            CREATE TABLE IF NOT EXISTS prior_performances (
                player_id INTEGER NOT NULL,
                match_id INTEGER NOT NULL,
                competition TEXT NOT NULL,
                team_id INTEGER NOT NULL,
                predicted INTEGER NOT NULL,
                starting INTEGER NOT NULL,
                substitute INTEGER NOT NULL,
                bench_unused INTEGER NOT NULL,
                missing INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                played_minutes INTEGER NOT NULL,
                rating REAL NOT NULL,
                diff_rival REAL,
                diff_best REAL,
                goals INTEGER NOT NULL DEFAULT 0,
                assists INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                bonuses INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (player_id, match_id, competition)
            );

            CREATE TABLE IF NOT EXISTS performances (
                player_id INTEGER NOT NULL,
                match_id INTEGER NOT NULL,
                team_id INTEGER NOT NULL,
                player_name TEXT NOT NULL,
                history TEXT NOT NULL,
                prev_t_start REAL NOT NULL,
                prev_t_missing REAL NOT NULL,
                prev_t_rating REAL NOT NULL,
                missing INTEGER NOT NULL,
                predicted INTEGER NOT NULL,
                season_minutes INTEGER NOT NULL,
                season_percentage REAL NOT NULL,
                last_percentage REAL NOT NULL,
                team_news INTEGER NOT NULL,
                starting INTEGER NOT NULL,
                low_confidence INTEGER NOT NULL,
                insufficient_history INTEGER NOT NULL,
                PRIMARY KEY (player_id, match_id)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(competition, season);
            CREATE INDEX IF NOT EXISTS idx_performances_match ON performances(match_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== Ingest-side writes ====================

    pub fn put_team(&self, team: &TeamRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO teams (id, name, league) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, league = excluded.league",
            params![team.id.0, team.name, team.league],
        )?;
        Ok(())
    }

    pub fn put_match_info(&self, info: &MatchInfo) -> Result<()> {
        self.conn.execute(
            "INSERT INTO matches (id, competition, season, date, league, home_team_id, away_team_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id, competition) DO UPDATE SET
                season = excluded.season,
                date = excluded.date,
                league = excluded.league,
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id",
            params![
                info.key.id.0,
                info.key.competition.code(),
                info.season,
                info.date.format("%Y-%m-%d").to_string(),
                info.league,
                info.home.0,
                info.away.0,
            ],
        )?;
        Ok(())
    }

    pub fn link_matches(&self, tournament: MatchId, league: MatchId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO match_links (tournament_id, league_id) VALUES (?1, ?2)",
            params![tournament.0, league.0],
        )?;
        Ok(())
    }

    // ==================== Row mapping ====================

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<MatchInfo> {
        let id = MatchId(row.get(0)?);
        let competition_code: String = row.get(1)?;
        let competition = Competition::from_code(&competition_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown competition code '{}'", competition_code).into(),
            )
        })?;
        let date_str: String = row.get(3)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(MatchInfo {
            key: MatchKey { competition, id },
            season: row.get(2)?,
            date,
            league: row.get(4)?,
            home: TeamId(row.get(5)?),
            away: TeamId(row.get(6)?),
        })
    }

    fn matches_query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MatchInfo>> {
        let mut stmt = self.conn.prepare(sql)?;
        let matches = stmt
            .query_map(args, Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }
}

const MATCH_COLUMNS: &str =
    "id, competition, season, date, league, home_team_id, away_team_id";

fn ids_to_json(ids: &[PlayerId]) -> String {
    let raw: Vec<i64> = ids.iter().map(|p| p.0).collect();
    serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string())
}

fn ids_from_json(json: &str) -> Result<Vec<PlayerId>> {
    let raw: Vec<i64> =
        serde_json::from_str(json).map_err(|e| LineupError::Parse(e.to_string()))?;
    Ok(raw.into_iter().map(PlayerId).collect())
}

fn missing_to_json(missing: &HashMap<PlayerId, Severity>) -> String {
    let raw: HashMap<i64, u8> = missing.iter().map(|(p, s)| (p.0, s.level())).collect();
    serde_json::to_string(&raw).unwrap_or_else(|_| "{}".to_string())
}

fn missing_from_json(json: &str) -> Result<HashMap<PlayerId, Severity>> {
    let raw: HashMap<i64, u8> =
        serde_json::from_str(json).map_err(|e| LineupError::Parse(e.to_string()))?;
    Ok(raw
        .into_iter()
        .filter_map(|(id, level)| Severity::from_level(level).map(|s| (PlayerId(id), s)))
        .collect())
}

impl Store for SqliteStore {
    fn match_info(&self, key: MatchKey) -> Result<Option<MatchInfo>> {
        let info = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM matches WHERE id = ?1 AND competition = ?2",
                    MATCH_COLUMNS
                ),
                params![key.id.0, key.competition.code()],
                SqliteStore::row_to_match,
            )
            .optional()?;
        Ok(info)
    }

    fn tournament_matches(&self) -> Result<Vec<MatchInfo>> {
        self.matches_query(
            &format!(
                "SELECT {} FROM matches WHERE competition = 'T' ORDER BY date",
                MATCH_COLUMNS
            ),
            &[],
        )
    }

    fn tournament_matches_in_season(&self, season: &str) -> Result<Vec<MatchInfo>> {
        self.matches_query(
            &format!(
                "SELECT {} FROM matches WHERE competition = 'T' AND season = ?1 ORDER BY date",
                MATCH_COLUMNS
            ),
            &[&season],
        )
    }

    fn linked_league_matches(&self, tournament: MatchId) -> Result<Vec<MatchId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT league_id FROM match_links WHERE tournament_id = ?1")?;
        let ids = stmt
            .query_map(params![tournament.0], |row| Ok(MatchId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn team(&self, id: TeamId) -> Result<Option<TeamRecord>> {
        let team = self
            .conn
            .query_row(
                "SELECT id, name, league FROM teams WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(TeamRecord {
                        id: TeamId(row.get(0)?),
                        name: row.get(1)?,
                        league: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(team)
    }

    fn put_player(&self, id: PlayerId, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO players (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id.0, name],
        )?;
        Ok(())
    }

    fn player_name(&self, id: PlayerId) -> Result<Option<String>> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM players WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    fn participation(
        &self,
        team: TeamId,
        match_key: MatchKey,
    ) -> Result<Option<TeamParticipation>> {
        let row = self
            .conn
            .query_row(
                "SELECT side, predicted, starting, bench, substitutes, missing, malformed
                 FROM participations
                 WHERE team_id = ?1 AND match_id = ?2 AND competition = ?3",
                params![team.0, match_key.id.0, match_key.competition.code()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, bool>(6)?,
                    ))
                },
            )
            .optional()?;

        let (side_code, predicted, starting, bench, substitutes, missing, malformed) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let side = Side::from_code(&side_code)
            .ok_or_else(|| LineupError::Parse(format!("unknown side '{}'", side_code)))?;
        Ok(Some(TeamParticipation {
            team,
            side,
            match_key,
            predicted: ids_from_json(&predicted)?,
            starting: ids_from_json(&starting)?,
            bench: ids_from_json(&bench)?,
            substitutes: ids_from_json(&substitutes)?,
            missing: missing_from_json(&missing)?,
            malformed,
        }))
    }

    fn put_participation(&self, p: &TeamParticipation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO participations
                (team_id, match_id, competition, side, predicted, starting, bench,
                 substitutes, missing, malformed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(team_id, match_id, competition) DO UPDATE SET
                side = excluded.side,
                predicted = excluded.predicted,
                starting = excluded.starting,
                bench = excluded.bench,
                substitutes = excluded.substitutes,
                missing = excluded.missing,
                malformed = excluded.malformed",
            params![
                p.team.0,
                p.match_key.id.0,
                p.match_key.competition.code(),
                p.side.code(),
                ids_to_json(&p.predicted),
                ids_to_json(&p.starting),
                ids_to_json(&p.bench),
                ids_to_json(&p.substitutes),
                missing_to_json(&p.missing),
                p.malformed,
            ],
        )?;
        Ok(())
    }

    fn prior_performance(
        &self,
        player: PlayerId,
        match_key: MatchKey,
    ) -> Result<Option<PriorPerformance>> {
        let perf = self
            .conn
            .query_row(
                "SELECT team_id, predicted, starting, substitute, bench_unused, missing,
                        duration, played_minutes, rating, diff_rival, diff_best,
                        goals, assists, errors, bonuses
                 FROM prior_performances
                 WHERE player_id = ?1 AND match_id = ?2 AND competition = ?3",
                params![player.0, match_key.id.0, match_key.competition.code()],
                |row| {
                    let diff_rival: Option<f32> = row.get(9)?;
                    let diff_best: Option<f32> = row.get(10)?;
                    let diffs = match (diff_rival, diff_best) {
                        (Some(vs_rival), Some(vs_best)) => {
                            Some(LeagueDiffs { vs_rival, vs_best })
                        }
                        _ => None,
                    };
                    Ok(PriorPerformance {
                        player,
                        match_key,
                        team: TeamId(row.get(0)?),
                        predicted: row.get(1)?,
                        starting: row.get(2)?,
                        substitute: row.get(3)?,
                        bench_unused: row.get(4)?,
                        missing: Severity::from_level(row.get(5)?),
                        duration: row.get(6)?,
                        played_minutes: row.get(7)?,
                        rating: row.get(8)?,
                        diffs,
                        goals: row.get(11)?,
                        assists: row.get(12)?,
                        errors: row.get(13)?,
                        bonuses: row.get(14)?,
                    })
                },
            )
            .optional()?;
        Ok(perf)
    }

    fn put_prior_performance(&self, perf: &PriorPerformance) -> Result<()> {
        self.conn.execute(
            "INSERT INTO prior_performances
                (player_id, match_id, competition, team_id, predicted, starting,
                 substitute, bench_unused, missing, duration, played_minutes, rating,
                 diff_rival, diff_best, goals, assists, errors, bonuses)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(player_id, match_id, competition) DO NOTHING",
            params![
                perf.player.0,
                perf.match_key.id.0,
                perf.match_key.competition.code(),
                perf.team.0,
                perf.predicted,
                perf.starting,
                perf.substitute,
                perf.bench_unused,
                crate::severity_level(perf.missing),
                perf.duration,
                perf.played_minutes,
                perf.rating,
                perf.diffs.map(|d| d.vs_rival),
                perf.diffs.map(|d| d.vs_best),
                perf.goals,
                perf.assists,
                perf.errors,
                perf.bonuses,
            ],
        )?;
        Ok(())
    }

    fn has_performances(&self, tournament: MatchId) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM performances WHERE match_id = ?1",
            params![tournament.0],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn put_feature_row(&self, row: &FeatureRow) -> Result<()> {
        let history = serde_json::to_string(&row.history)
            .map_err(|e| LineupError::Parse(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO performances
                (player_id, match_id, team_id, player_name, history,
                 prev_t_start, prev_t_missing, prev_t_rating, missing, predicted,
                 season_minutes, season_percentage, last_percentage, team_news,
                 starting, low_confidence, insufficient_history)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(player_id, match_id) DO UPDATE SET
                team_id = excluded.team_id,
                player_name = excluded.player_name,
                history = excluded.history,
                prev_t_start = excluded.prev_t_start,
                prev_t_missing = excluded.prev_t_missing,
                prev_t_rating = excluded.prev_t_rating,
                missing = excluded.missing,
                predicted = excluded.predicted,
                season_minutes = excluded.season_minutes,
                season_percentage = excluded.season_percentage,
                last_percentage = excluded.last_percentage,
                team_news = excluded.team_news,
                starting = excluded.starting,
                low_confidence = excluded.low_confidence,
                insufficient_history = excluded.insufficient_history",
            params![
                row.player.0,
                row.match_id.0,
                row.team.0,
                row.player_name,
                history,
                row.prev_tournament_start,
                row.prev_tournament_missing,
                row.prev_tournament_rating,
                row.missing,
                row.predicted,
                row.season_minutes,
                row.season_percentage,
                row.last_percentage,
                row.in_team_news,
                row.starting,
                row.low_confidence,
                row.insufficient_history,
            ],
        )?;
        Ok(())
    }

    fn feature_row(&self, player: PlayerId, match_id: MatchId) -> Result<Option<FeatureRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM performances WHERE player_id = ?1 AND match_id = ?2",
                    FEATURE_COLUMNS
                ),
                params![player.0, match_id.0],
                row_to_feature,
            )
            .optional()?;
        row.map(feature_from_parts).transpose()
    }

    fn feature_rows(&self) -> Result<Vec<FeatureRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM performances ORDER BY match_id, player_id",
            FEATURE_COLUMNS
        ))?;
        let parts = stmt
            .query_map([], row_to_feature)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        parts.into_iter().map(feature_from_parts).collect()
    }
}

const FEATURE_COLUMNS: &str = "player_id, match_id, team_id, player_name, history, \
     prev_t_start, prev_t_missing, prev_t_rating, missing, predicted, season_minutes, \
     season_percentage, last_percentage, team_news, starting, low_confidence, \
     insufficient_history";

type FeatureParts = (
    i64,
    i64,
    i64,
    String,
    String,
    f32,
    f32,
    f32,
    u8,
    bool,
    u32,
    f32,
    f32,
    bool,
    bool,
    bool,
    bool,
);

fn row_to_feature(row: &rusqlite::Row) -> rusqlite::Result<FeatureParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
        row.get(16)?,
    ))
}

fn feature_from_parts(parts: FeatureParts) -> Result<FeatureRow> {
    let (
        player,
        match_id,
        team,
        player_name,
        history_json,
        prev_t_start,
        prev_t_missing,
        prev_t_rating,
        missing,
        predicted,
        season_minutes,
        season_percentage,
        last_percentage,
        team_news,
        starting,
        low_confidence,
        insufficient_history,
    ) = parts;
    let history: Vec<HistorySlot> =
        serde_json::from_str(&history_json).map_err(|e| LineupError::Parse(e.to_string()))?;
    Ok(FeatureRow {
        player: PlayerId(player),
        match_id: MatchId(match_id),
        team: TeamId(team),
        player_name,
        history,
        prev_tournament_start: prev_t_start,
        prev_tournament_missing: prev_t_missing,
        prev_tournament_rating: prev_t_rating,
        missing,
        predicted,
        season_minutes,
        season_percentage,
        last_percentage,
        in_team_news: team_news,
        starting,
        low_confidence,
        insufficient_history,
    })
}
