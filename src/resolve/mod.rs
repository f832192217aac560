//! Match resolution orchestration
//!
//! The `Resolver` drives one top-level tournament match end to end: squad
//! resolution for both teams, history resolution (which recursively resolves
//! prior matches through the registry), and feature extraction, writing
//! finished rows through the store.

pub mod history;
pub mod incidents;
pub mod squad;

use crate::data::{DocumentProvider, MatchInfo, StandingsAccessor, Store};
use crate::features;
use crate::registry::Registry;
use crate::{Config, LineupError, MatchId, MatchKey, Result, Side};
use std::rc::Rc;

/// A match with its metadata and document-derived duration
#[derive(Debug, Clone)]
pub struct ResolvedMatch {
    pub info: MatchInfo,
    /// Minutes actually played: 93 nominal, 120 with extra time
    pub duration: u32,
}

impl ResolvedMatch {
    pub fn key(&self) -> MatchKey {
        self.info.key
    }
}

/// Outcome summary for one top-level match resolution
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub match_id: MatchId,
    pub rows_written: usize,
    /// Players dropped because a prior performance could not be resolved
    pub players_skipped: usize,
    /// Teams dropped because their league lacks history coverage
    pub teams_skipped: usize,
    /// Rows flagged low-confidence (malformed squad)
    pub low_confidence: usize,
}

/// Resolves matches and their dependencies against the external collaborators
pub struct Resolver<'a> {
    pub(crate) config: &'a Config,
    pub(crate) store: &'a dyn Store,
    pub(crate) docs: &'a dyn DocumentProvider,
    pub(crate) standings: &'a dyn StandingsAccessor,
    registry: Registry<ResolvedMatch>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn Store,
        docs: &'a dyn DocumentProvider,
        standings: &'a dyn StandingsAccessor,
    ) -> Self {
        Resolver {
            config,
            store,
            docs,
            standings,
            registry: Registry::new(),
        }
    }

    /// Fully resolve one tournament match and write its feature rows.
    ///
    /// The registry is torn down afterwards regardless of outcome, so each
    /// top-level match starts from a clean arena.
    pub fn process_tournament_match(&mut self, id: MatchId) -> Result<MatchReport> {
        let result = self.process_inner(id);
        self.registry.clear();
        result
    }

    fn process_inner(&mut self, id: MatchId) -> Result<MatchReport> {
        let key = MatchKey::tournament(id);
        let resolved = self.resolve_match(key)?;
        let docs = self.docs.open(key)?;

        let mut report = MatchReport {
            match_id: id,
            rows_written: 0,
            players_skipped: 0,
            teams_skipped: 0,
            low_confidence: 0,
        };

        for side in [Side::Home, Side::Away] {
            let team = match side {
                Side::Home => resolved.info.home,
                Side::Away => resolved.info.away,
            };
            let record = self
                .store
                .team(team)?
                .ok_or(LineupError::TeamNotFound(team))?;
            if !history::history_coverage(&record.league, &resolved.info.season) {
                log::info!(
                    "Skipping {} ({}) in {}: no history coverage for {} in {}",
                    record.name,
                    team,
                    key,
                    record.league,
                    resolved.info.season
                );
                report.teams_skipped += 1;
                continue;
            }

            let participation =
                squad::resolve_squad(self.store, docs.as_ref(), key, side, team)?;
            let window = self.resolve_history(&resolved, &participation)?;
            let news = docs.team_news(side)?;

            for player in participation.all_squad() {
                let player_history = match window.get(player) {
                    Some(h) => h,
                    None => {
                        report.players_skipped += 1;
                        continue;
                    }
                };
                let name = self.store.player_name(player)?.unwrap_or_default();
                let row = features::extract(
                    &self.config.history,
                    &resolved,
                    &participation,
                    player,
                    &name,
                    player_history,
                    &news,
                );
                if row.low_confidence {
                    report.low_confidence += 1;
                }
                self.store.put_feature_row(&row)?;
                report.rows_written += 1;
            }
        }

        log::info!(
            "{}: {} rows written, {} players skipped, {} teams skipped",
            key,
            report.rows_written,
            report.players_skipped,
            report.teams_skipped
        );
        Ok(report)
    }

    /// Resolve a match's metadata through the registry.
    ///
    /// At most one resolution per key per batch; re-entering a key that is
    /// still being resolved surfaces the cycle instead of looping.
    pub(crate) fn resolve_match(&mut self, key: MatchKey) -> Result<Rc<ResolvedMatch>> {
        if let Some(resolved) = self.registry.get(key) {
            return Ok(resolved);
        }
        self.registry.begin(key)?;
        match self.build_match(key) {
            Ok(resolved) => Ok(self.registry.finish(key, resolved)),
            Err(e) => {
                self.registry.abandon(key);
                Err(e)
            }
        }
    }

    fn build_match(&mut self, key: MatchKey) -> Result<ResolvedMatch> {
        let info = self
            .store
            .match_info(key)?
            .ok_or(LineupError::MatchNotFound(key.id))?;
        let duration = self.docs.open(key)?.duration()?;
        log::debug!("Resolved {} ({} minutes, {})", key, duration, info.date);
        Ok(ResolvedMatch { info, duration })
    }
}
