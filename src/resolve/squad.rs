//! Squad resolution for one team in one match
//!
//! Produces the `TeamParticipation`: predicted XI, starting XI, bench,
//! substitutes used and missing players, with the 11/11 shape invariant
//! enforced. Participations already in the store are returned verbatim.

use crate::data::{MatchDocs, Store};
use crate::{LineupError, MatchKey, PlayerId, Result, Severity, Side, TeamId};
use std::collections::{BTreeSet, HashMap};

/// One team's squad in one match
#[derive(Debug, Clone, PartialEq)]
pub struct TeamParticipation {
    pub team: TeamId,
    pub side: Side,
    pub match_key: MatchKey,
    /// Published lineup forecast, 11 players
    pub predicted: Vec<PlayerId>,
    /// Actual starting lineup, 11 players
    pub starting: Vec<PlayerId>,
    /// Players named on the bench
    pub bench: Vec<PlayerId>,
    /// Bench players who came on
    pub substitutes: Vec<PlayerId>,
    /// Pre-match fitness doubts
    pub missing: HashMap<PlayerId, Severity>,
    /// Set when the 11/11 invariant failed; rows derived from this squad
    /// are flagged low-confidence
    pub malformed: bool,
}

impl TeamParticipation {
    /// Union of predicted, starting, bench and missing players, sorted for
    /// deterministic iteration order
    pub fn all_squad(&self) -> Vec<PlayerId> {
        let mut all: BTreeSet<PlayerId> = BTreeSet::new();
        all.extend(&self.predicted);
        all.extend(&self.starting);
        all.extend(&self.bench);
        all.extend(self.missing.keys());
        all.into_iter().collect()
    }

    pub fn is_predicted(&self, player: PlayerId) -> bool {
        self.predicted.contains(&player)
    }

    pub fn is_starting(&self, player: PlayerId) -> bool {
        self.starting.contains(&player)
    }

    pub fn on_bench(&self, player: PlayerId) -> bool {
        self.bench.contains(&player)
    }

    pub fn is_substitute(&self, player: PlayerId) -> bool {
        self.substitutes.contains(&player)
    }

    pub fn missing_severity(&self, player: PlayerId) -> Option<Severity> {
        self.missing.get(&player).copied()
    }
}

/// Resolve one team's participation in a match.
///
/// Returns the persisted participation when the store already has one
/// (idempotent short-circuit); otherwise reads the squad sheet from the
/// documents, validates the 11/11 invariant and persists before returning.
/// A shape violation is recorded on the participation rather than aborting,
/// since partial squads still yield usable feature rows.
pub fn resolve_squad(
    store: &dyn Store,
    docs: &dyn MatchDocs,
    match_key: MatchKey,
    side: Side,
    team: TeamId,
) -> Result<TeamParticipation> {
    if let Some(existing) = store.participation(team, match_key)? {
        log::debug!("Participation of {} in {} already stored", team, match_key);
        return Ok(existing);
    }

    let predicted = docs.predicted_squad(side)?;
    let starting = docs.starting_xi(side)?;
    let (bench, substitutes) = docs.bench(side)?;
    let missing = docs.missing_players(side)?;

    let malformed = predicted.len() != 11 || starting.len() != 11;
    if malformed {
        let err = LineupError::MalformedSquad {
            match_key,
            team,
            predicted: predicted.len(),
            starting: starting.len(),
        };
        log::error!("{}", err);
    }

    let participation = TeamParticipation {
        team,
        side,
        match_key,
        predicted,
        starting,
        bench,
        substitutes,
        missing,
        malformed,
    };

    // Record display names for every squad member the documents know about
    for player in participation.all_squad() {
        if store.player_name(player)?.is_none() {
            match docs.player_name(player)? {
                Some(name) => store.put_player(player, &name)?,
                None => log::warn!("No name for {} in {}", player, match_key),
            }
        }
    }

    store.put_participation(&participation)?;
    log::debug!("Participation of {} in {} resolved", team, match_key);
    Ok(participation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::docs::{FixtureDocs, FixtureMatch, FixtureSheet};
    use crate::data::{DocumentProvider, SqliteStore};
    use crate::MatchId;

    fn players(range: std::ops::Range<i64>) -> Vec<PlayerId> {
        range.map(PlayerId).collect()
    }

    fn fixture_with_home_sheet(sheet: FixtureSheet) -> (FixtureDocs, MatchKey) {
        let key = MatchKey::tournament(MatchId(100));
        let mut docs = FixtureDocs::new();
        docs.insert(
            key,
            FixtureMatch {
                home: sheet,
                ..FixtureMatch::default()
            },
        );
        (docs, key)
    }

    #[test]
    fn test_resolve_well_formed_squad() {
        let store = SqliteStore::in_memory().unwrap();
        let sheet = FixtureSheet {
            predicted: players(1..12),
            starting: players(1..12),
            bench: players(12..19),
            substitutes: players(12..14),
            missing: HashMap::from([(PlayerId(30), Severity::Out)]),
            news: String::new(),
        };
        let (provider, key) = fixture_with_home_sheet(sheet);
        let docs = provider.open(key).unwrap();

        let part = resolve_squad(&store, docs.as_ref(), key, Side::Home, TeamId(5)).unwrap();
        assert!(!part.malformed);
        assert_eq!(part.predicted.len(), 11);
        assert_eq!(part.starting.len(), 11);
        // union: 11 starters + 7 bench + 1 missing
        assert_eq!(part.all_squad().len(), 19);
        assert!(part.is_substitute(PlayerId(12)));
        assert_eq!(part.missing_severity(PlayerId(30)), Some(Severity::Out));
    }

    #[test]
    fn test_malformed_squad_flagged_not_fatal() {
        let store = SqliteStore::in_memory().unwrap();
        let sheet = FixtureSheet {
            predicted: players(1..10), // only 9 parsed
            starting: players(1..12),
            ..FixtureSheet::default()
        };
        let (provider, key) = fixture_with_home_sheet(sheet);
        let docs = provider.open(key).unwrap();

        let part = resolve_squad(&store, docs.as_ref(), key, Side::Home, TeamId(5)).unwrap();
        assert!(part.malformed);
        assert_eq!(part.predicted.len(), 9);
    }

    #[test]
    fn test_store_short_circuit() {
        let store = SqliteStore::in_memory().unwrap();
        let sheet = FixtureSheet {
            predicted: players(1..12),
            starting: players(1..12),
            ..FixtureSheet::default()
        };
        let (provider, key) = fixture_with_home_sheet(sheet);
        let docs = provider.open(key).unwrap();

        let first = resolve_squad(&store, docs.as_ref(), key, Side::Home, TeamId(5)).unwrap();

        // Mutated documents must not affect the second resolution
        let mut mutated = FixtureDocs::new();
        mutated.insert(key, FixtureMatch::default());
        let docs = mutated.open(key).unwrap();
        let second = resolve_squad(&store, docs.as_ref(), key, Side::Home, TeamId(5)).unwrap();
        assert_eq!(first, second);
    }
}
