//! Incident analysis
//!
//! Classifies a match timeline into per-player play states and computes the
//! minutes actually played from the discrete substitution and red-card
//! events. Also tallies goal involvement used by prior-performance records.

use crate::data::RawIncident;
use crate::resolve::squad::TeamParticipation;
use crate::PlayerId;
use std::collections::HashMap;

/// Recognized gameplay incident kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentKind {
    Goal,
    PenaltyScored,
    PenaltyMissed,
    PenaltySaved,
    OwnGoal,
    Assist,
    YellowCard,
    RedCard,
    SubIn,
    SubOut,
    ShotOnPost,
    GoalLineClearance,
    ErrorLeadingToGoal,
}

impl IncidentKind {
    /// Classify a site label. `None` for unknown labels, which are dropped
    /// with a warning rather than failing the match.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Goal" => Some(IncidentKind::Goal),
            "Penalty scored" => Some(IncidentKind::PenaltyScored),
            "Penalty missed" => Some(IncidentKind::PenaltyMissed),
            "Penalty Saved" => Some(IncidentKind::PenaltySaved),
            "Own goal" => Some(IncidentKind::OwnGoal),
            "Assist" => Some(IncidentKind::Assist),
            "Yellow Card" => Some(IncidentKind::YellowCard),
            "Red Card" => Some(IncidentKind::RedCard),
            "Sub in" => Some(IncidentKind::SubIn),
            "Sub out" => Some(IncidentKind::SubOut),
            "Shot on post" => Some(IncidentKind::ShotOnPost),
            "Clearance off the line" => Some(IncidentKind::GoalLineClearance),
            "Error lead to goal" => Some(IncidentKind::ErrorLeadingToGoal),
            _ => None,
        }
    }
}

/// A classified timeline event attributed to one player
#[derive(Debug, Clone, Copy)]
pub struct Incident {
    pub minute: u32,
    pub player: PlayerId,
    pub kind: IncidentKind,
}

/// How a squad member took part in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// In the starting lineup
    Starter,
    /// Came on from the bench
    Substitute,
    /// Named on the bench, never used
    BenchUnused,
    /// In the squad (predicted or missing) without a matchday role
    Unused,
}

/// Per-player summary of one match's timeline
#[derive(Debug, Clone, Copy)]
pub struct PlaySummary {
    pub state: PlayState,
    pub minutes: u32,
    pub goals: u8,
    pub assists: u8,
    /// Own goals, errors leading to goals, missed penalties and cards
    pub errors: u8,
    /// Shots on post, goal-line clearances and saved penalties
    pub bonuses: u8,
}

impl PlaySummary {
    fn unused(state: PlayState) -> Self {
        PlaySummary {
            state,
            minutes: 0,
            goals: 0,
            assists: 0,
            errors: 0,
            bonuses: 0,
        }
    }
}

/// Analyze a timeline for one participation.
///
/// Only events on the participation's side and team count. There is at most
/// one substitution-in, one substitution-out and one red card per player per
/// match; played minutes follow from those three events and the match
/// duration, clamped into `[0, duration]`.
pub fn analyze(
    participation: &TeamParticipation,
    timeline: &[RawIncident],
    duration: u32,
) -> HashMap<PlayerId, PlaySummary> {
    let mut per_player: HashMap<PlayerId, Vec<Incident>> = HashMap::new();
    for raw in timeline {
        if raw.side != participation.side || raw.team != participation.team {
            continue;
        }
        let kind = match IncidentKind::from_label(&raw.kind) {
            Some(kind) => kind,
            None => {
                log::warn!(
                    "Dropping unknown incident kind '{}' at minute {} in {}",
                    raw.kind,
                    raw.minute,
                    participation.match_key
                );
                continue;
            }
        };
        per_player.entry(raw.player).or_default().push(Incident {
            minute: raw.minute,
            player: raw.player,
            kind,
        });
    }

    let mut summaries = HashMap::new();
    for player in participation.all_squad() {
        let incidents = per_player.get(&player).map(Vec::as_slice).unwrap_or(&[]);
        summaries.insert(player, summarize(participation, player, incidents, duration));
    }
    summaries
}

fn summarize(
    participation: &TeamParticipation,
    player: PlayerId,
    incidents: &[Incident],
    duration: u32,
) -> PlaySummary {
    let state = if participation.is_starting(player) {
        PlayState::Starter
    } else if participation.is_substitute(player) {
        PlayState::Substitute
    } else if participation.on_bench(player) {
        PlayState::BenchUnused
    } else {
        PlayState::Unused
    };

    let mut summary = PlaySummary::unused(state);
    let mut sub_in: Option<u32> = None;
    let mut sub_out: Option<u32> = None;
    let mut red_card: Option<u32> = None;

    for incident in incidents {
        match incident.kind {
            IncidentKind::SubIn => sub_in = Some(incident.minute),
            IncidentKind::SubOut => sub_out = Some(incident.minute),
            IncidentKind::Goal | IncidentKind::PenaltyScored => summary.goals += 1,
            IncidentKind::Assist => summary.assists += 1,
            IncidentKind::OwnGoal | IncidentKind::ErrorLeadingToGoal | IncidentKind::PenaltyMissed => {
                summary.errors += 1
            }
            IncidentKind::ShotOnPost | IncidentKind::GoalLineClearance | IncidentKind::PenaltySaved => {
                summary.bonuses += 1
            }
            IncidentKind::RedCard => {
                red_card = Some(incident.minute);
                summary.errors += 1;
            }
            IncidentKind::YellowCard => summary.errors += 1,
        }
    }

    summary.minutes = match state {
        PlayState::Starter => match (red_card, sub_out) {
            (Some(red), _) => red,
            (None, Some(out)) => out,
            (None, None) => duration,
        },
        PlayState::Substitute => match sub_in {
            Some(on) => {
                let until = red_card.or(sub_out).unwrap_or(duration);
                until.saturating_sub(on)
            }
            None => {
                log::warn!(
                    "{} is flagged substitute in {} but has no substitution-in event",
                    player,
                    participation.match_key
                );
                0
            }
        },
        PlayState::BenchUnused | PlayState::Unused => 0,
    };
    summary.minutes = summary.minutes.min(duration);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawIncident;
    use crate::{MatchId, MatchKey, Side, TeamId};
    use std::collections::HashMap as Map;

    fn participation() -> TeamParticipation {
        TeamParticipation {
            team: TeamId(1),
            side: Side::Home,
            match_key: MatchKey::league(MatchId(10)),
            predicted: (1..12).map(PlayerId).collect(),
            starting: (1..12).map(PlayerId).collect(),
            bench: (12..19).map(PlayerId).collect(),
            substitutes: vec![PlayerId(12)],
            missing: Map::new(),
            malformed: false,
        }
    }

    fn event(minute: u32, player: i64, kind: &str) -> RawIncident {
        RawIncident {
            side: Side::Home,
            team: TeamId(1),
            minute,
            player: PlayerId(player),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_starter_full_match() {
        let states = analyze(&participation(), &[], 93);
        let summary = states[&PlayerId(1)];
        assert_eq!(summary.state, PlayState::Starter);
        assert_eq!(summary.minutes, 93);
    }

    #[test]
    fn test_substitution_splits_minutes() {
        let timeline = vec![event(60, 1, "Sub out"), event(60, 12, "Sub in")];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(1)].minutes, 60);
        assert_eq!(states[&PlayerId(12)].state, PlayState::Substitute);
        assert_eq!(states[&PlayerId(12)].minutes, 33);
    }

    #[test]
    fn test_red_card_cuts_starter_short() {
        let timeline = vec![event(25, 3, "Red Card")];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(3)].minutes, 25);
        assert_eq!(states[&PlayerId(3)].errors, 1);
    }

    #[test]
    fn test_substitute_later_sent_off() {
        let timeline = vec![event(46, 12, "Sub in"), event(80, 12, "Red Card")];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(12)].minutes, 34);
    }

    #[test]
    fn test_bench_unused_and_missing_play_zero() {
        let mut part = participation();
        part.missing.insert(PlayerId(40), crate::Severity::Out);
        let states = analyze(&part, &[], 93);
        assert_eq!(states[&PlayerId(13)].state, PlayState::BenchUnused);
        assert_eq!(states[&PlayerId(13)].minutes, 0);
        assert_eq!(states[&PlayerId(40)].state, PlayState::Unused);
        assert_eq!(states[&PlayerId(40)].minutes, 0);
    }

    #[test]
    fn test_unknown_kind_dropped() {
        let timeline = vec![event(10, 1, "Weather delay"), event(60, 1, "Sub out")];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(1)].minutes, 60);
    }

    #[test]
    fn test_other_side_events_ignored() {
        let mut event_away = event(30, 1, "Sub out");
        event_away.side = Side::Away;
        event_away.team = TeamId(2);
        let states = analyze(&participation(), &[event_away], 93);
        assert_eq!(states[&PlayerId(1)].minutes, 93);
    }

    #[test]
    fn test_substitute_without_sub_in_scores_zero() {
        // Data-quality warning case: flagged substitute, no sub-in event
        let states = analyze(&participation(), &[], 93);
        assert_eq!(states[&PlayerId(12)].state, PlayState::Substitute);
        assert_eq!(states[&PlayerId(12)].minutes, 0);
    }

    #[test]
    fn test_goal_tallies() {
        let timeline = vec![
            event(15, 2, "Goal"),
            event(44, 2, "Penalty scored"),
            event(44, 4, "Assist"),
            event(70, 5, "Own goal"),
            event(78, 6, "Clearance off the line"),
        ];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(2)].goals, 2);
        assert_eq!(states[&PlayerId(4)].assists, 1);
        assert_eq!(states[&PlayerId(5)].errors, 1);
        assert_eq!(states[&PlayerId(6)].bonuses, 1);
    }

    #[test]
    fn test_minutes_clamped_to_duration() {
        let timeline = vec![event(95, 1, "Sub out")];
        let states = analyze(&participation(), &timeline, 93);
        assert_eq!(states[&PlayerId(1)].minutes, 93);
    }
}
