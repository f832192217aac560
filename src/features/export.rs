//! CSV export
//!
//! Flattens stored feature rows into the wide CSV layout the classifier
//! trains on. The history columns are generated from the configured window
//! size, so exports from differently-configured databases stay self-describing.

use crate::features::FeatureRow;
use crate::Result;
use std::io::Write;
use std::path::Path;

fn header(window: usize) -> Vec<String> {
    let mut columns = vec![
        "player_id".to_string(),
        "match_id".to_string(),
        "team_id".to_string(),
        "player_name".to_string(),
    ];
    for i in 1..=window {
        columns.push(format!("prev_{}_start", i));
        columns.push(format!("prev_{}_missing", i));
        columns.push(format!("prev_{}_rating", i));
        columns.push(format!("prev_{}_diff_rival", i));
        columns.push(format!("prev_{}_diff_best", i));
    }
    columns.extend(
        [
            "prev_t_start",
            "prev_t_missing",
            "prev_t_rating",
            "missing",
            "predicted",
            "season_minutes",
            "season_percentage",
            "last_percentage",
            "team_news",
            "starting",
            "low_confidence",
            "insufficient_history",
        ]
        .map(str::to_string),
    );
    columns
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn record(row: &FeatureRow, window: usize, sentinel: f32) -> Vec<String> {
    let mut fields = vec![
        row.player.0.to_string(),
        row.match_id.0.to_string(),
        row.team.0.to_string(),
        row.player_name.clone(),
    ];
    for i in 0..window {
        match row.history.get(i) {
            Some(slot) => {
                fields.push(slot.start.to_string());
                fields.push(slot.missing.to_string());
                fields.push(slot.rating.to_string());
                fields.push(slot.diff_rival.to_string());
                fields.push(slot.diff_best.to_string());
            }
            // shorter history than the export window, pad like a sentinel row
            None => fields.extend(std::iter::repeat(sentinel.to_string()).take(5)),
        }
    }
    fields.push(row.prev_tournament_start.to_string());
    fields.push(row.prev_tournament_missing.to_string());
    fields.push(row.prev_tournament_rating.to_string());
    fields.push(row.missing.to_string());
    fields.push(flag(row.predicted));
    fields.push(row.season_minutes.to_string());
    fields.push(row.season_percentage.to_string());
    fields.push(row.last_percentage.to_string());
    fields.push(flag(row.in_team_news));
    fields.push(flag(row.starting));
    fields.push(flag(row.low_confidence));
    fields.push(flag(row.insufficient_history));
    fields
}

/// Write feature rows as CSV to any writer
pub fn write_csv<W: Write>(
    writer: W,
    rows: &[FeatureRow],
    window: usize,
    sentinel: f32,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(header(window))?;
    for row in rows {
        csv_writer.write_record(record(row, window, sentinel))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write feature rows to a CSV file, creating parent directories as needed
pub fn export_to_path<P: AsRef<Path>>(
    path: P,
    rows: &[FeatureRow],
    window: usize,
    sentinel: f32,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(file, rows, window, sentinel)?;
    log::info!("Exported {} feature rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::HistorySlot;
    use crate::{MatchId, PlayerId, TeamId};

    fn sample_row() -> FeatureRow {
        FeatureRow {
            player: PlayerId(9),
            match_id: MatchId(100),
            team: TeamId(5),
            player_name: "Test Player".to_string(),
            history: vec![
                HistorySlot {
                    start: 1.0,
                    missing: 0.0,
                    rating: 7.1,
                    diff_rival: 3.0,
                    diff_best: -10.0,
                },
                HistorySlot::sentinel(99.0),
            ],
            prev_tournament_start: 1.0,
            prev_tournament_missing: 0.0,
            prev_tournament_rating: 6.9,
            missing: 0,
            predicted: true,
            season_minutes: 400,
            season_percentage: 0.86,
            last_percentage: 0.9,
            in_team_news: true,
            starting: true,
            low_confidence: false,
            insufficient_history: false,
        }
    }

    #[test]
    fn test_header_matches_window() {
        let columns = header(2);
        assert_eq!(columns.len(), 4 + 2 * 5 + 12);
        assert_eq!(columns[4], "prev_1_start");
        assert_eq!(columns[9], "prev_2_start");
        assert_eq!(columns[14], "prev_t_start");
        assert_eq!(columns.last().map(String::as_str), Some("insufficient_history"));
    }

    #[test]
    fn test_csv_output() {
        let mut out = Vec::new();
        write_csv(&mut out, &[sample_row()], 2, 99.0).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        let header_line = lines.next().unwrap();
        assert!(header_line.starts_with("player_id,match_id,team_id,player_name"));
        assert!(header_line.contains("prev_2_diff_best,prev_t_start"));

        let data_line = lines.next().unwrap();
        assert!(data_line.starts_with("9,100,5,Test Player,1,0,7.1,3,-10,99,99,99,99,99"));
        assert!(data_line.ends_with("1,1,0,0"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_short_history_padded_with_sentinel() {
        let mut row = sample_row();
        row.history.truncate(1);
        let mut out = Vec::new();
        write_csv(&mut out, &[row], 3, -7.0).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header_fields = text.lines().next().unwrap().split(',').count();
        let data_line = text.lines().nth(1).unwrap();
        assert_eq!(header_fields, data_line.split(',').count());
        // the padding slots carry the configured sentinel, not a literal
        assert!(data_line.contains("-7,-7,-7,-7,-7"));
    }
}
