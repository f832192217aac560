//! Lineup decision feature pipeline
//!
//! Resolves knockout-tournament matches into per-player feature rows for a
//! downstream starting-XI classifier. The core is an entity-resolution engine
//! over time-ordered matches: squads, incident timelines and a rolling window
//! of recent league and tournament history per player.

pub mod data;
pub mod features;
pub mod registry;
pub mod resolve;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a match (site-assigned, shared by both competitions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Match({})", self.0)
    }
}

/// Unique identifier for a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Which competition a match belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Competition {
    Tournament,
    League,
}

impl Competition {
    pub fn code(&self) -> &'static str {
        match self {
            Competition::Tournament => "T",
            Competition::League => "L",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "T" => Some(Competition::Tournament),
            "L" => Some(Competition::League),
            _ => None,
        }
    }
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Competition::Tournament => write!(f, "tournament"),
            Competition::League => write!(f, "league"),
        }
    }
}

/// Composite match identity. The numeric id space is shared between
/// competitions, so a bare `MatchId` is ambiguous on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub competition: Competition,
    pub id: MatchId,
}

impl MatchKey {
    pub fn tournament(id: MatchId) -> Self {
        MatchKey {
            competition: Competition::Tournament,
            id,
        }
    }

    pub fn league(id: MatchId) -> Self {
        MatchKey {
            competition: Competition::League,
            id,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.competition.code(), self.id.0)
    }
}

/// Home or away side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn code(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "home" => Some(Side::Home),
            "away" => Some(Side::Away),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Severity of a pre-match fitness doubt from the team-news table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Doubtful,
    Out,
}

impl Severity {
    /// Numeric encoding used in feature vectors (absent = 0)
    pub fn level(&self) -> u8 {
        match self {
            Severity::Doubtful => 1,
            Severity::Out => 2,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Severity::Doubtful),
            2 => Some(Severity::Out),
            _ => None,
        }
    }
}

/// Numeric encoding of an optional severity (0 = fully available)
pub fn severity_level(severity: Option<Severity>) -> u8 {
    severity.map(|s| s.level()).unwrap_or(0)
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum LineupError {
    #[error("Malformed squad for {team} in {match_key}: {predicted} predicted, {starting} starting (expected 11/11)")]
    MalformedSquad {
        match_key: MatchKey,
        team: TeamId,
        predicted: usize,
        starting: usize,
    },

    #[error("Cyclic dependency resolving {0}: match is already being resolved")]
    CyclicDependency(MatchKey),

    #[error("Missing prior performance for {player} in {match_key}")]
    MissingDependency {
        player: PlayerId,
        match_key: MatchKey,
    },

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, LineupError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub standings_path: String,
    pub export_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of most recent league matches per history window
    pub window: usize,
    /// Minimum resolvable prior league matches before a row is trainable
    pub min_history: usize,
    /// Rating substituted when too few prior ratings exist to impute a mean
    pub neutral_rating: f32,
    /// Out-of-range filler for history slots with no data at all
    pub sentinel: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                database_path: "data/matches.db".to_string(),
                standings_path: "data/league_tables.db".to_string(),
                export_path: "data/features.csv".to_string(),
            },
            history: HistoryConfig {
                window: 5,
                min_history: 5,
                neutral_rating: 5.0,
                sentinel: 99.0,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LineupError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| LineupError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LineupError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_levels() {
        assert_eq!(severity_level(None), 0);
        assert_eq!(severity_level(Some(Severity::Doubtful)), 1);
        assert_eq!(severity_level(Some(Severity::Out)), 2);
        assert_eq!(Severity::from_level(2), Some(Severity::Out));
        assert_eq!(Severity::from_level(0), None);
    }

    #[test]
    fn test_match_key_display() {
        assert_eq!(MatchKey::tournament(MatchId(1549539)).to_string(), "T:1549539");
        assert_eq!(MatchKey::league(MatchId(7)).to_string(), "L:7");
    }

    #[test]
    fn test_competition_codes() {
        assert_eq!(Competition::from_code("T"), Some(Competition::Tournament));
        assert_eq!(Competition::from_code("L"), Some(Competition::League));
        assert_eq!(Competition::from_code("X"), None);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.window, 5);
        assert_eq!(config.history.neutral_rating, 5.0);
        assert_eq!(config.history.sentinel, 99.0);
    }
}
