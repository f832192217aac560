//! Document accessor: structured read access to one match's parsed documents
//!
//! The scraping layer stores each match's squad sheet, incident timeline and
//! per-player ratings already extracted from the raw markup. `SqliteDocs`
//! reads that output; `FixtureDocs` builds the same data in memory for tests.

use crate::{LineupError, MatchKey, PlayerId, Result, Severity, Side, TeamId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// One timeline event as parsed from the match centre document.
///
/// The kind is the site's label string; classification into gameplay
/// incidents happens in the incident analyzer.
#[derive(Debug, Clone)]
pub struct RawIncident {
    pub side: Side,
    pub team: TeamId,
    pub minute: u32,
    pub player: PlayerId,
    pub kind: String,
}

/// Read access to one match's parsed documents
pub trait MatchDocs {
    /// Predicted lineup for a side, in published order
    fn predicted_squad(&self, side: Side) -> Result<Vec<PlayerId>>;
    /// Starting lineup from the pitch diagram
    fn starting_xi(&self, side: Side) -> Result<Vec<PlayerId>>;
    /// Bench players and the subset that was substituted in
    fn bench(&self, side: Side) -> Result<(Vec<PlayerId>, Vec<PlayerId>)>;
    /// Missing players with severity from the team-news table
    fn missing_players(&self, side: Side) -> Result<HashMap<PlayerId, Severity>>;
    /// Full incident timeline, both sides
    fn timeline(&self) -> Result<Vec<RawIncident>>;
    /// Match rating for a player, `None` when unrated
    fn rating(&self, player: PlayerId) -> Result<Option<f32>>;
    /// Pre-match team news text for a side
    fn team_news(&self, side: Side) -> Result<String>;
    /// Display name for a player, if the documents mention one
    fn player_name(&self, player: PlayerId) -> Result<Option<String>>;
    /// Match duration in minutes (93 nominal, 120 with extra time, extended
    /// past the last stoppage-time incident)
    fn duration(&self) -> Result<u32>;
}

/// Opens per-match document accessors
pub trait DocumentProvider {
    fn open(&self, key: MatchKey) -> Result<Box<dyn MatchDocs + '_>>;
}

// ==================== SQLite adapter ====================

/// Document accessor over the scraping layer's pre-parsed SQLite output
pub struct SqliteDocs {
    conn: Connection,
}

impl SqliteDocs {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(SqliteDocs { conn })
    }
}

impl DocumentProvider for SqliteDocs {
    fn open(&self, key: MatchKey) -> Result<Box<dyn MatchDocs + '_>> {
        Ok(Box::new(SqliteMatchDocs {
            conn: &self.conn,
            key,
        }))
    }
}

struct SqliteMatchDocs<'c> {
    conn: &'c Connection,
    key: MatchKey,
}

impl SqliteMatchDocs<'_> {
    fn squad_column(&self, side: Side, column: &str) -> Result<Vec<PlayerId>> {
        let json: String = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM squad_sheets
                     WHERE match_id = ?1 AND competition = ?2 AND side = ?3",
                    column
                ),
                params![self.key.id.0, self.key.competition.code(), side.code()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(LineupError::MatchNotFound(self.key.id))?;
        let ids: Vec<i64> =
            serde_json::from_str(&json).map_err(|e| LineupError::Parse(e.to_string()))?;
        Ok(ids.into_iter().map(PlayerId).collect())
    }
}

impl MatchDocs for SqliteMatchDocs<'_> {
    fn predicted_squad(&self, side: Side) -> Result<Vec<PlayerId>> {
        self.squad_column(side, "predicted")
    }

    fn starting_xi(&self, side: Side) -> Result<Vec<PlayerId>> {
        self.squad_column(side, "starting")
    }

    fn bench(&self, side: Side) -> Result<(Vec<PlayerId>, Vec<PlayerId>)> {
        Ok((
            self.squad_column(side, "bench")?,
            self.squad_column(side, "substitutes")?,
        ))
    }

    fn missing_players(&self, side: Side) -> Result<HashMap<PlayerId, Severity>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT missing FROM squad_sheets
                 WHERE match_id = ?1 AND competition = ?2 AND side = ?3",
                params![self.key.id.0, self.key.competition.code(), side.code()],
                |row| row.get(0),
            )
            .optional()?;
        let map: HashMap<i64, u8> = match json {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| LineupError::Parse(e.to_string()))?
            }
            None => HashMap::new(),
        };
        Ok(map
            .into_iter()
            .filter_map(|(id, level)| Severity::from_level(level).map(|s| (PlayerId(id), s)))
            .collect())
    }

    fn timeline(&self) -> Result<Vec<RawIncident>> {
        let mut stmt = self.conn.prepare(
            "SELECT side, team_id, minute, player_id, kind FROM timeline_events
             WHERE match_id = ?1 AND competition = ?2
             ORDER BY minute, seq",
        )?;
        let events = stmt
            .query_map(
                params![self.key.id.0, self.key.competition.code()],
                |row| {
                    let side_code: String = row.get(0)?;
                    Ok((
                        side_code,
                        TeamId(row.get(1)?),
                        row.get::<_, u32>(2)?,
                        PlayerId(row.get(3)?),
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut incidents = Vec::with_capacity(events.len());
        for (side_code, team, minute, player, kind) in events {
            let side = Side::from_code(&side_code)
                .ok_or_else(|| LineupError::Parse(format!("unknown side '{}'", side_code)))?;
            incidents.push(RawIncident {
                side,
                team,
                minute,
                player,
                kind,
            });
        }
        Ok(incidents)
    }

    fn rating(&self, player: PlayerId) -> Result<Option<f32>> {
        let rating: Option<f32> = self
            .conn
            .query_row(
                "SELECT rating FROM ratings
                 WHERE match_id = ?1 AND competition = ?2 AND player_id = ?3",
                params![self.key.id.0, self.key.competition.code(), player.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rating)
    }

    fn team_news(&self, side: Side) -> Result<String> {
        let news: Option<String> = self
            .conn
            .query_row(
                "SELECT news FROM squad_sheets
                 WHERE match_id = ?1 AND competition = ?2 AND side = ?3",
                params![self.key.id.0, self.key.competition.code(), side.code()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(news.unwrap_or_default())
    }

    fn player_name(&self, player: PlayerId) -> Result<Option<String>> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM document_players
                 WHERE match_id = ?1 AND competition = ?2 AND player_id = ?3",
                params![self.key.id.0, self.key.competition.code(), player.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    fn duration(&self) -> Result<u32> {
        let duration: Option<u32> = self
            .conn
            .query_row(
                "SELECT duration FROM documents
                 WHERE match_id = ?1 AND competition = ?2",
                params![self.key.id.0, self.key.competition.code()],
                |row| row.get(0),
            )
            .optional()?;
        let duration = duration.ok_or(LineupError::MatchNotFound(self.key.id))?;
        let last_minute: Option<u32> = self.conn.query_row(
            "SELECT MAX(minute) FROM timeline_events
             WHERE match_id = ?1 AND competition = ?2",
            params![self.key.id.0, self.key.competition.code()],
            |row| row.get(0),
        )?;
        Ok(refine_duration(duration, last_minute))
    }
}

/// Stoppage time: an incident at or past the nominal duration extends the
/// match to one minute beyond it
fn refine_duration(nominal: u32, last_incident: Option<u32>) -> u32 {
    match last_incident {
        Some(minute) if minute >= nominal => minute + 1,
        _ => nominal,
    }
}

// ==================== In-memory fixture (for testing) ====================

/// One side's fixture documents
#[derive(Debug, Clone, Default)]
pub struct FixtureSheet {
    pub predicted: Vec<PlayerId>,
    pub starting: Vec<PlayerId>,
    pub bench: Vec<PlayerId>,
    pub substitutes: Vec<PlayerId>,
    pub missing: HashMap<PlayerId, Severity>,
    pub news: String,
}

/// In-memory documents for one match (for testing)
#[derive(Debug, Clone)]
pub struct FixtureMatch {
    pub duration: u32,
    pub home: FixtureSheet,
    pub away: FixtureSheet,
    pub timeline: Vec<RawIncident>,
    pub ratings: HashMap<PlayerId, f32>,
    pub names: HashMap<PlayerId, String>,
}

impl Default for FixtureMatch {
    fn default() -> Self {
        FixtureMatch {
            duration: 93,
            home: FixtureSheet::default(),
            away: FixtureSheet::default(),
            timeline: Vec::new(),
            ratings: HashMap::new(),
            names: HashMap::new(),
        }
    }
}

impl FixtureMatch {
    fn sheet(&self, side: Side) -> &FixtureSheet {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

/// In-memory document provider (for testing)
#[derive(Debug, Clone, Default)]
pub struct FixtureDocs {
    matches: HashMap<MatchKey, FixtureMatch>,
}

impl FixtureDocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MatchKey, docs: FixtureMatch) {
        self.matches.insert(key, docs);
    }
}

impl DocumentProvider for FixtureDocs {
    fn open(&self, key: MatchKey) -> Result<Box<dyn MatchDocs + '_>> {
        let fixture = self
            .matches
            .get(&key)
            .ok_or(LineupError::MatchNotFound(key.id))?;
        Ok(Box::new(FixtureMatchDocs { fixture }))
    }
}

struct FixtureMatchDocs<'f> {
    fixture: &'f FixtureMatch,
}

impl MatchDocs for FixtureMatchDocs<'_> {
    fn predicted_squad(&self, side: Side) -> Result<Vec<PlayerId>> {
        Ok(self.fixture.sheet(side).predicted.clone())
    }

    fn starting_xi(&self, side: Side) -> Result<Vec<PlayerId>> {
        Ok(self.fixture.sheet(side).starting.clone())
    }

    fn bench(&self, side: Side) -> Result<(Vec<PlayerId>, Vec<PlayerId>)> {
        let sheet = self.fixture.sheet(side);
        Ok((sheet.bench.clone(), sheet.substitutes.clone()))
    }

    fn missing_players(&self, side: Side) -> Result<HashMap<PlayerId, Severity>> {
        Ok(self.fixture.sheet(side).missing.clone())
    }

    fn timeline(&self) -> Result<Vec<RawIncident>> {
        Ok(self.fixture.timeline.clone())
    }

    fn rating(&self, player: PlayerId) -> Result<Option<f32>> {
        Ok(self.fixture.ratings.get(&player).copied())
    }

    fn team_news(&self, side: Side) -> Result<String> {
        Ok(self.fixture.sheet(side).news.clone())
    }

    fn player_name(&self, player: PlayerId) -> Result<Option<String>> {
        Ok(self.fixture.names.get(&player).cloned())
    }

    fn duration(&self) -> Result<u32> {
        let last = self.fixture.timeline.iter().map(|i| i.minute).max();
        Ok(refine_duration(self.fixture.duration, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchId;

    #[test]
    fn test_duration_refinement() {
        assert_eq!(refine_duration(93, None), 93);
        assert_eq!(refine_duration(93, Some(60)), 93);
        assert_eq!(refine_duration(93, Some(93)), 94);
        assert_eq!(refine_duration(93, Some(96)), 97);
        assert_eq!(refine_duration(120, Some(121)), 122);
    }

    #[test]
    fn test_fixture_duration_extends_past_late_incident() {
        let key = MatchKey::league(MatchId(1));
        let mut docs = FixtureDocs::new();
        docs.insert(
            key,
            FixtureMatch {
                timeline: vec![RawIncident {
                    side: Side::Home,
                    team: TeamId(1),
                    minute: 95,
                    player: PlayerId(9),
                    kind: "Goal".to_string(),
                }],
                ..FixtureMatch::default()
            },
        );
        assert_eq!(docs.open(key).unwrap().duration().unwrap(), 96);
    }
}
