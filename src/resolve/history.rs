//! History resolution
//!
//! For a team in a tournament match, finds its N most recent qualifying
//! league matches and its most recent earlier tournament match, resolves a
//! `PriorPerformance` for every squad member in each, and assembles the
//! per-player history windows that feed feature extraction.

use crate::data::standings::LeagueDiffs;
use crate::data::{MatchInfo, Store};
use crate::resolve::incidents::{self, PlayState};
use crate::resolve::squad::{self, TeamParticipation};
use crate::resolve::{ResolvedMatch, Resolver};
use crate::{Competition, LineupError, MatchKey, PlayerId, Result, Severity, Side, TeamId};
use std::collections::HashMap;

/// A historical match record for one player, used only as a feature source
#[derive(Debug, Clone, PartialEq)]
pub struct PriorPerformance {
    pub player: PlayerId,
    pub match_key: MatchKey,
    pub team: TeamId,
    pub predicted: bool,
    pub starting: bool,
    pub substitute: bool,
    pub bench_unused: bool,
    pub missing: Option<Severity>,
    pub duration: u32,
    pub played_minutes: u32,
    /// 0.0 when unrated (did not play, or rating markup absent)
    pub rating: f32,
    /// League standings differentials; `None` for tournament matches and
    /// league matches without a standings snapshot
    pub diffs: Option<LeagueDiffs>,
    pub goals: u8,
    pub assists: u8,
    pub errors: u8,
    pub bonuses: u8,
}

/// One player's resolved history window
#[derive(Debug, Clone, Default)]
pub struct PlayerHistory {
    /// Most-recent-first league performances, up to the configured window
    pub league: Vec<PriorPerformance>,
    /// Most recent earlier tournament performance, if any
    pub tournament: Option<PriorPerformance>,
}

/// Resolved history for every squad member of one participation
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    per_player: HashMap<PlayerId, PlayerHistory>,
    /// Players whose rows must be skipped (missing prior performances)
    pub skipped: Vec<PlayerId>,
}

impl HistoryWindow {
    pub fn get(&self, player: PlayerId) -> Option<&PlayerHistory> {
        self.per_player.get(&player)
    }

    pub fn len(&self) -> usize {
        self.per_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_player.is_empty()
    }
}

/// Whether preview documents (and so history) exist for a league season.
///
/// The top five leagues are covered for every season; smaller leagues gained
/// coverage later. Teams outside coverage get no history window and produce
/// no feature rows.
pub fn history_coverage(league: &str, season: &str) -> bool {
    match league {
        "England" | "Spain" | "Germany" | "Italy" | "France" => true,
        "Netherlands" | "Russia" => season >= "2013/2014",
        "Turkey" => season >= "2014/2015",
        "Portugal" => season >= "2016/2017",
        _ => false,
    }
}

/// League matches linked to a tournament match that involve the given team,
/// most recent first, capped at the window size
pub fn league_candidates(
    store: &dyn Store,
    tournament: &MatchInfo,
    team: TeamId,
    window: usize,
) -> Result<Vec<MatchInfo>> {
    let mut involving = Vec::new();
    for id in store.linked_league_matches(tournament.key.id)? {
        let info = store
            .match_info(MatchKey::league(id))?
            .ok_or(LineupError::MatchNotFound(id))?;
        if info.home == team || info.away == team {
            involving.push(info);
        }
    }
    involving.sort_by(|a, b| b.date.cmp(&a.date));
    involving.truncate(window);
    Ok(involving)
}

/// The team's most recent tournament match in the same season strictly
/// before the current one
pub fn prior_tournament_candidate(
    store: &dyn Store,
    current: &MatchInfo,
    team: TeamId,
) -> Result<Option<MatchInfo>> {
    let candidates = store.tournament_matches_in_season(&current.season)?;
    Ok(candidates
        .into_iter()
        .filter(|m| (m.home == team || m.away == team) && m.date < current.date)
        .max_by_key(|m| m.date))
}

impl Resolver<'_> {
    /// Resolve the full history window for one tournament participation.
    ///
    /// Every candidate match is resolved through the registry, so a league
    /// match shared with the sibling team's history is resolved once per
    /// batch. Players for whom a prior performance cannot be produced are
    /// reported in `skipped` and excluded, not fatal for the match.
    pub fn resolve_history(
        &mut self,
        current: &ResolvedMatch,
        participation: &TeamParticipation,
    ) -> Result<HistoryWindow> {
        let team = participation.team;
        let squad = participation.all_squad();

        let league_matches = league_candidates(
            self.store,
            &current.info,
            team,
            self.config.history.window,
        )?;
        let tournament_match = prior_tournament_candidate(self.store, &current.info, team)?;

        log::debug!(
            "{} in {}: {} league candidates, tournament prior: {}",
            team,
            current.info.key,
            league_matches.len(),
            tournament_match
                .as_ref()
                .map(|m| m.key.to_string())
                .unwrap_or_else(|| "none".to_string()),
        );

        for info in &league_matches {
            self.resolve_prior(info, team, &squad)?;
        }
        if let Some(info) = &tournament_match {
            self.resolve_prior(info, team, &squad)?;
        }

        // Assemble per-player windows from the store; a gap means a prior
        // pass failed for that player and only their row is dropped
        let mut window = HistoryWindow::default();
        'players: for &player in &squad {
            let mut history = PlayerHistory::default();
            for info in &league_matches {
                match self.store.prior_performance(player, info.key)? {
                    Some(perf) => history.league.push(perf),
                    None => {
                        let err = LineupError::MissingDependency {
                            player,
                            match_key: info.key,
                        };
                        log::error!("Skipping feature row: {}", err);
                        window.skipped.push(player);
                        continue 'players;
                    }
                }
            }
            if let Some(info) = &tournament_match {
                history.tournament = self.store.prior_performance(player, info.key)?;
            }
            window.per_player.insert(player, history);
        }
        Ok(window)
    }

    /// Resolve one prior match and persist a `PriorPerformance` for every
    /// player of the tournament squad. Already-stored performances are kept
    /// verbatim (idempotent).
    fn resolve_prior(
        &mut self,
        info: &MatchInfo,
        team: TeamId,
        squad: &[PlayerId],
    ) -> Result<()> {
        let mut pending: Vec<PlayerId> = Vec::new();
        for &player in squad {
            if self.store.prior_performance(player, info.key)?.is_none() {
                pending.push(player);
            }
        }
        if pending.is_empty() {
            log::debug!("All prior performances for {} already stored", info.key);
            return Ok(());
        }

        let resolved = self.resolve_match(info.key)?;
        let side = if info.home == team {
            Side::Home
        } else {
            Side::Away
        };
        let docs = self.docs.open(info.key)?;
        let participation =
            squad::resolve_squad(self.store, docs.as_ref(), info.key, side, team)?;
        let states = incidents::analyze(&participation, &docs.timeline()?, resolved.duration);
        let diffs = self.league_diffs(info, team)?;

        for player in pending {
            let summary = states.get(&player);
            let state = summary.map(|s| s.state).unwrap_or(PlayState::Unused);
            let played = summary.map(|s| s.minutes).unwrap_or(0);
            let rated = matches!(state, PlayState::Starter | PlayState::Substitute);
            let rating = if rated {
                docs.rating(player)?.unwrap_or(0.0)
            } else {
                0.0
            };

            let perf = PriorPerformance {
                player,
                match_key: info.key,
                team,
                predicted: participation.is_predicted(player),
                starting: state == PlayState::Starter,
                substitute: state == PlayState::Substitute,
                bench_unused: state == PlayState::BenchUnused,
                missing: participation.missing_severity(player),
                duration: resolved.duration,
                played_minutes: played,
                rating,
                diffs,
                goals: summary.map(|s| s.goals).unwrap_or(0),
                assists: summary.map(|s| s.assists).unwrap_or(0),
                errors: summary.map(|s| s.errors).unwrap_or(0),
                bonuses: summary.map(|s| s.bonuses).unwrap_or(0),
            };
            self.store.put_prior_performance(&perf)?;
        }
        Ok(())
    }

    fn league_diffs(&self, info: &MatchInfo, team: TeamId) -> Result<Option<LeagueDiffs>> {
        if info.key.competition != Competition::League {
            return Ok(None);
        }
        let snapshot =
            self.standings
                .table_snapshot(&info.league, &info.season, info.date)?;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                log::warn!(
                    "No standings snapshot for {} {} before {}",
                    info.league,
                    info.season,
                    info.date
                );
                return Ok(None);
            }
        };
        let rival = if info.home == team { info.away } else { info.home };
        Ok(LeagueDiffs::from_snapshot(&snapshot, team, rival))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_coverage() {
        assert!(history_coverage("England", "2010/2011"));
        assert!(history_coverage("Spain", "2019/2020"));
        assert!(!history_coverage("Netherlands", "2012/2013"));
        assert!(history_coverage("Netherlands", "2013/2014"));
        assert!(!history_coverage("Turkey", "2013/2014"));
        assert!(history_coverage("Turkey", "2014/2015"));
        assert!(!history_coverage("Portugal", "2015/2016"));
        assert!(history_coverage("Portugal", "2016/2017"));
        assert!(!history_coverage("Scotland", "2019/2020"));
    }
}
