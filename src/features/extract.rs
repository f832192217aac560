//! Feature extraction
//!
//! Computes the final per-player feature vector from a tournament
//! participation and the player's resolved history window, applying the
//! rating imputation and missing-slot sentinel policies.

use crate::resolve::history::{PlayerHistory, PriorPerformance};
use crate::resolve::squad::TeamParticipation;
use crate::resolve::ResolvedMatch;
use crate::{severity_level, HistoryConfig, MatchId, PlayerId, Severity, TeamId};
use deunicode::deunicode;
use serde::{Deserialize, Serialize};

/// One history slot of the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySlot {
    pub start: f32,
    pub missing: f32,
    pub rating: f32,
    pub diff_rival: f32,
    pub diff_best: f32,
}

impl HistorySlot {
    /// Filler for slots with no underlying match: an out-of-range value the
    /// downstream model can learn to treat as "no data"
    pub fn sentinel(value: f32) -> Self {
        HistorySlot {
            start: value,
            missing: value,
            rating: value,
            diff_rival: value,
            diff_best: value,
        }
    }
}

/// The finished feature row for one player in one tournament match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub player: PlayerId,
    pub match_id: MatchId,
    pub team: TeamId,
    pub player_name: String,
    /// League history, most recent first, exactly `window` slots
    pub history: Vec<HistorySlot>,
    pub prev_tournament_start: f32,
    pub prev_tournament_missing: f32,
    pub prev_tournament_rating: f32,
    /// Severity level for the current match (0 = available)
    pub missing: u8,
    pub predicted: bool,
    pub season_minutes: u32,
    pub season_percentage: f32,
    pub last_percentage: f32,
    pub in_team_news: bool,
    /// The classification target: did the manager start this player
    pub starting: bool,
    pub low_confidence: bool,
    pub insufficient_history: bool,
}

/// Replace unrated (zero) entries among prior ratings.
///
/// With 1–3 zeros the replacement is the mean of the non-zero ratings,
/// rounded to one decimal; with more zeros than that (or nothing non-zero to
/// average) every zero becomes the fixed neutral default. Thresholds are
/// empirical and tied to a window of 5.
pub fn impute_ratings(ratings: &[f32], neutral: f32) -> Vec<f32> {
    let zeros = ratings.iter().filter(|r| **r == 0.0).count();
    if zeros == 0 {
        return ratings.to_vec();
    }
    let non_zero: Vec<f32> = ratings.iter().copied().filter(|r| *r != 0.0).collect();
    let replacement = if zeros <= 3 && !non_zero.is_empty() {
        let mean = non_zero.iter().sum::<f32>() / non_zero.len() as f32;
        (mean * 10.0).round() / 10.0
    } else {
        neutral
    };
    ratings
        .iter()
        .map(|r| if *r == 0.0 { replacement } else { *r })
        .collect()
}

/// Whether a player's name appears in the pre-match team news, with
/// diacritics folded on both sides
pub fn mentioned_in_news(name: &str, news: &str) -> bool {
    if name.is_empty() || news.is_empty() {
        return false;
    }
    news.contains(name) || deunicode(news).contains(&deunicode(name))
}

fn slot_from(perf: &PriorPerformance, rating: f32) -> HistorySlot {
    let (diff_rival, diff_best) = match perf.diffs {
        Some(diffs) => (diffs.vs_rival, diffs.vs_best),
        None => (-1.0, -1.0),
    };
    HistorySlot {
        start: if perf.starting { 1.0 } else { 0.0 },
        missing: severity_level(perf.missing) as f32,
        rating,
        diff_rival,
        diff_best,
    }
}

/// Playing-time aggregate: played minutes summed over every performance,
/// against the durations of the matches the player was not ruled out of
fn playing_time(perfs: &[&PriorPerformance]) -> (u32, u32) {
    let played = perfs.iter().map(|p| p.played_minutes).sum();
    let possible = perfs
        .iter()
        .filter(|p| p.missing != Some(Severity::Out))
        .map(|p| p.duration)
        .sum();
    (played, possible)
}

fn percentage(played: u32, possible: u32) -> f32 {
    if possible == 0 {
        return 0.0;
    }
    let ratio = played as f32 / possible as f32;
    (ratio * 1000.0).round() / 1000.0
}

/// Derive the feature row for one squad member of a tournament match
pub fn extract(
    config: &HistoryConfig,
    current: &ResolvedMatch,
    participation: &TeamParticipation,
    player: PlayerId,
    name: &str,
    history: &PlayerHistory,
    news: &str,
) -> FeatureRow {
    let league_ratings: Vec<f32> = history.league.iter().map(|p| p.rating).collect();
    let imputed = impute_ratings(&league_ratings, config.neutral_rating);

    let mut slots = Vec::with_capacity(config.window);
    for i in 0..config.window {
        match history.league.get(i) {
            Some(perf) => slots.push(slot_from(perf, imputed[i])),
            None => slots.push(HistorySlot::sentinel(config.sentinel)),
        }
    }

    let (prev_t_start, prev_t_missing, prev_t_rating) = match &history.tournament {
        Some(perf) => (
            if perf.starting { 1.0 } else { 0.0 },
            severity_level(perf.missing) as f32,
            perf.rating,
        ),
        None => (config.sentinel, config.sentinel, config.sentinel),
    };

    let all_perfs: Vec<&PriorPerformance> = history
        .league
        .iter()
        .chain(history.tournament.iter())
        .collect();
    let (season_played, season_possible) = playing_time(&all_perfs);
    let league_perfs: Vec<&PriorPerformance> = history.league.iter().collect();
    let (last_played, last_possible) = playing_time(&league_perfs);

    let insufficient_history =
        history.league.len() < config.min_history || season_possible == 0;

    FeatureRow {
        player,
        match_id: current.info.key.id,
        team: participation.team,
        player_name: name.to_string(),
        history: slots,
        prev_tournament_start: prev_t_start,
        prev_tournament_missing: prev_t_missing,
        prev_tournament_rating: prev_t_rating,
        missing: severity_level(participation.missing_severity(player)),
        predicted: participation.is_predicted(player),
        season_minutes: season_played,
        season_percentage: percentage(season_played, season_possible),
        last_percentage: percentage(last_played, last_possible),
        in_team_news: mentioned_in_news(name, news),
        starting: participation.is_starting(player),
        low_confidence: participation.malformed,
        insufficient_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MatchInfo;
    use crate::resolve::squad::TeamParticipation;
    use crate::{MatchKey, Side};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn config() -> HistoryConfig {
        HistoryConfig {
            window: 5,
            min_history: 5,
            neutral_rating: 5.0,
            sentinel: 99.0,
        }
    }

    fn prior(match_id: i64, rating: f32, played: u32, duration: u32) -> PriorPerformance {
        PriorPerformance {
            player: PlayerId(1),
            match_key: MatchKey::league(MatchId(match_id)),
            team: TeamId(5),
            predicted: true,
            starting: played > 0,
            substitute: false,
            bench_unused: false,
            missing: None,
            duration,
            played_minutes: played,
            rating,
            diffs: None,
            goals: 0,
            assists: 0,
            errors: 0,
            bonuses: 0,
        }
    }

    fn current_match() -> ResolvedMatch {
        ResolvedMatch {
            info: MatchInfo {
                key: MatchKey::tournament(MatchId(900)),
                season: "2019/2020".to_string(),
                date: NaiveDate::from_ymd_opt(2020, 2, 18).unwrap(),
                league: "T".to_string(),
                home: TeamId(5),
                away: TeamId(6),
            },
            duration: 93,
        }
    }

    fn participation() -> TeamParticipation {
        TeamParticipation {
            team: TeamId(5),
            side: Side::Home,
            match_key: MatchKey::tournament(MatchId(900)),
            predicted: vec![PlayerId(1)],
            starting: vec![PlayerId(1)],
            bench: vec![],
            substitutes: vec![],
            missing: HashMap::new(),
            malformed: false,
        }
    }

    #[test]
    fn test_impute_two_zeros_take_mean() {
        let imputed = impute_ratings(&[0.0, 0.0, 7.2, 6.8, 7.0], 5.0);
        assert_eq!(imputed, vec![7.0, 7.0, 7.2, 6.8, 7.0]);
    }

    #[test]
    fn test_impute_all_zeros_take_neutral() {
        let imputed = impute_ratings(&[0.0; 5], 5.0);
        assert_eq!(imputed, vec![5.0; 5]);
    }

    #[test]
    fn test_impute_four_zeros_take_neutral() {
        let imputed = impute_ratings(&[0.0, 0.0, 0.0, 0.0, 6.4], 5.0);
        assert_eq!(imputed, vec![5.0, 5.0, 5.0, 5.0, 6.4]);
    }

    #[test]
    fn test_impute_no_zeros_unchanged() {
        let ratings = [6.1, 7.3, 6.9, 7.0, 6.5];
        assert_eq!(impute_ratings(&ratings, 5.0), ratings.to_vec());
    }

    #[test]
    fn test_mean_rounded_to_one_decimal() {
        // mean of 6.8 and 7.1 is 6.95, rounds to 7.0 (ties away from zero)
        let imputed = impute_ratings(&[0.0, 6.8, 7.1], 5.0);
        assert_eq!(imputed[0], 7.0);
    }

    #[test]
    fn test_news_mention_with_diacritics() {
        assert!(mentioned_in_news(
            "Mbappé",
            "Mbappe is expected to recover in time"
        ));
        assert!(mentioned_in_news("Silva", "Silva remains doubtful"));
        assert!(!mentioned_in_news("Kane", "No fresh injury concerns"));
        assert!(!mentioned_in_news("", "anything"));
    }

    #[test]
    fn test_missing_slots_carry_sentinel() {
        let history = PlayerHistory {
            league: vec![
                prior(1, 6.5, 93, 93),
                prior(2, 7.0, 93, 93),
                prior(3, 6.8, 60, 93),
            ],
            tournament: None,
        };
        let row = extract(
            &config(),
            &current_match(),
            &participation(),
            PlayerId(1),
            "Player One",
            &history,
            "",
        );

        assert_eq!(row.history.len(), 5);
        assert_eq!(row.history[0].rating, 6.5);
        assert_eq!(row.history[3], HistorySlot::sentinel(99.0));
        assert_eq!(row.history[4], HistorySlot::sentinel(99.0));
        assert!(row.insufficient_history);
        // no earlier tournament match either
        assert_eq!(row.prev_tournament_rating, 99.0);
    }

    #[test]
    fn test_season_percentage_bounds() {
        let history = PlayerHistory {
            league: (1..=5).map(|i| prior(i, 7.0, 93, 93)).collect(),
            tournament: Some(PriorPerformance {
                match_key: MatchKey::tournament(MatchId(800)),
                ..prior(800, 7.2, 93, 93)
            }),
        };
        let row = extract(
            &config(),
            &current_match(),
            &participation(),
            PlayerId(1),
            "Player One",
            &history,
            "",
        );
        assert_eq!(row.season_percentage, 1.0);
        assert_eq!(row.season_minutes, 93 * 6);
        assert!(!row.insufficient_history);
        assert!(row.starting);
        assert!(row.predicted);
    }

    #[test]
    fn test_zero_denominator_yields_zero_and_flag() {
        // all prior matches missed through injury: nothing to divide by
        let mut out = prior(1, 0.0, 0, 93);
        out.missing = Some(Severity::Out);
        out.starting = false;
        let history = PlayerHistory {
            league: (0..5)
                .map(|i| {
                    let mut p = out.clone();
                    p.match_key = MatchKey::league(MatchId(i));
                    p
                })
                .collect(),
            tournament: None,
        };
        let row = extract(
            &config(),
            &current_match(),
            &participation(),
            PlayerId(1),
            "Player One",
            &history,
            "",
        );
        assert_eq!(row.season_percentage, 0.0);
        assert!(row.insufficient_history);
    }

    #[test]
    fn test_out_matches_excluded_from_denominator() {
        let mut history = PlayerHistory {
            league: (1..=5).map(|i| prior(i, 7.0, 93, 93)).collect(),
            tournament: None,
        };
        history.league[4].missing = Some(Severity::Out);
        history.league[4].played_minutes = 0;
        history.league[4].starting = false;
        history.league[4].rating = 7.0; // rated elsewhere, keep imputation out of it

        let row = extract(
            &config(),
            &current_match(),
            &participation(),
            PlayerId(1),
            "Player One",
            &history,
            "",
        );
        // 4 * 93 played over 4 * 93 possible
        assert_eq!(row.season_percentage, 1.0);
    }
}
