//! External collaborators: match documents, entity store, league standings
//!
//! Everything behind these traits is produced by the scraping/parsing layer,
//! which is out of scope here. The SQLite adapters read its pre-parsed output.

pub mod docs;
pub mod standings;
pub mod store;

pub use docs::{DocumentProvider, MatchDocs, RawIncident, SqliteDocs};
pub use standings::{SqliteStandings, StandingRow, StandingsAccessor};
pub use store::{MatchInfo, SqliteStore, Store, TeamRecord};
