//! League standings lookup
//!
//! Snapshots of domestic league tables, one per league/season/matchday,
//! queried for the latest snapshot strictly before a given date. Prior
//! performances use them for points differentials against the opponent
//! and the league leader.

use crate::{Result, TeamId};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

/// One team's row in a standings snapshot
#[derive(Debug, Clone, Copy)]
pub struct StandingRow {
    pub team: TeamId,
    pub position: u32,
    pub points: i32,
}

/// League table snapshot lookup by league, season and date
pub trait StandingsAccessor {
    /// Latest snapshot strictly before `date`, or `None` when no table for
    /// this league/season has been recorded yet
    fn table_snapshot(
        &self,
        league: &str,
        season: &str,
        date: NaiveDate,
    ) -> Result<Option<Vec<StandingRow>>>;
}

/// Points differentials derived from a snapshot for one fixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeagueDiffs {
    /// Team points minus opponent points
    pub vs_rival: f32,
    /// Team points minus leader points (0 when the team leads)
    pub vs_best: f32,
}

impl LeagueDiffs {
    /// Compute differentials for a team against its opponent within a
    /// snapshot. `None` when either side is absent from the table
    /// (promoted mid-season data gaps).
    pub fn from_snapshot(snapshot: &[StandingRow], team: TeamId, rival: TeamId) -> Option<Self> {
        let team_points = snapshot.iter().find(|r| r.team == team)?.points;
        let rival_points = snapshot.iter().find(|r| r.team == rival)?.points;
        let best_points = snapshot.iter().map(|r| r.points).max()?;
        Some(LeagueDiffs {
            vs_rival: (team_points - rival_points) as f32,
            vs_best: (team_points - best_points) as f32,
        })
    }
}

// ==================== SQLite adapter ====================

/// Standings accessor over the scraping layer's league tables database
pub struct SqliteStandings {
    conn: Connection,
}

impl SqliteStandings {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(SqliteStandings { conn })
    }
}

impl StandingsAccessor for SqliteStandings {
    fn table_snapshot(
        &self,
        league: &str,
        season: &str,
        date: NaiveDate,
    ) -> Result<Option<Vec<StandingRow>>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, position, points FROM standings
             WHERE league = ?1 AND season = ?2
               AND snapshot_date = (SELECT MAX(snapshot_date) FROM standings
                                    WHERE league = ?1 AND season = ?2 AND snapshot_date < ?3)
             ORDER BY position",
        )?;
        let rows = stmt
            .query_map(
                params![league, season, date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(StandingRow {
                        team: TeamId(row.get(0)?),
                        position: row.get(1)?,
                        points: row.get(2)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

// ==================== In-memory fixture (for testing) ====================

/// In-memory standings accessor (for testing)
#[derive(Debug, Clone, Default)]
pub struct FixtureStandings {
    snapshots: HashMap<(String, String), Vec<(NaiveDate, Vec<StandingRow>)>>,
}

impl FixtureStandings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        league: &str,
        season: &str,
        snapshot_date: NaiveDate,
        rows: Vec<StandingRow>,
    ) {
        self.snapshots
            .entry((league.to_string(), season.to_string()))
            .or_default()
            .push((snapshot_date, rows));
    }
}

impl StandingsAccessor for FixtureStandings {
    fn table_snapshot(
        &self,
        league: &str,
        season: &str,
        date: NaiveDate,
    ) -> Result<Option<Vec<StandingRow>>> {
        let snapshots = match self.snapshots.get(&(league.to_string(), season.to_string())) {
            Some(s) => s,
            None => return Ok(None),
        };
        Ok(snapshots
            .iter()
            .filter(|(d, _)| *d < date)
            .max_by_key(|(d, _)| *d)
            .map(|(_, rows)| rows.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(team: i64, position: u32, points: i32) -> StandingRow {
        StandingRow {
            team: TeamId(team),
            position,
            points,
        }
    }

    #[test]
    fn test_diffs_from_snapshot() {
        let snapshot = vec![row(1, 1, 40), row(2, 2, 33), row(3, 3, 20)];
        let diffs = LeagueDiffs::from_snapshot(&snapshot, TeamId(2), TeamId(3)).unwrap();
        assert_eq!(diffs.vs_rival, 13.0);
        assert_eq!(diffs.vs_best, -7.0);

        let leader = LeagueDiffs::from_snapshot(&snapshot, TeamId(1), TeamId(2)).unwrap();
        assert_eq!(leader.vs_best, 0.0);
    }

    #[test]
    fn test_diffs_missing_team() {
        let snapshot = vec![row(1, 1, 40)];
        assert!(LeagueDiffs::from_snapshot(&snapshot, TeamId(1), TeamId(99)).is_none());
    }

    #[test]
    fn test_fixture_picks_latest_before_date() {
        let mut standings = FixtureStandings::new();
        let d = |day| NaiveDate::from_ymd_opt(2019, 10, day).unwrap();
        standings.insert("England", "2019/2020", d(5), vec![row(1, 1, 10)]);
        standings.insert("England", "2019/2020", d(12), vec![row(1, 1, 13)]);

        let snapshot = standings
            .table_snapshot("England", "2019/2020", d(14))
            .unwrap()
            .unwrap();
        assert_eq!(snapshot[0].points, 13);

        // A snapshot dated the match day itself is not visible
        let snapshot = standings
            .table_snapshot("England", "2019/2020", d(12))
            .unwrap()
            .unwrap();
        assert_eq!(snapshot[0].points, 10);

        assert!(standings
            .table_snapshot("England", "2019/2020", d(5))
            .unwrap()
            .is_none());
    }
}
