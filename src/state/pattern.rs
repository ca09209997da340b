//! Win-pattern definitions and the pure evaluation engine behind claim
//! adjudication.
//!
//! A square is *legitimate* iff it is marked AND its clip has been confirmed
//! played by the room. Marked squares whose clip never played are flagged as
//! illegitimate and never count toward completion or progress.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexSet;

use crate::state::card::{Card, GRID_SIZE, Position};

/// The active win pattern of a room. Room-wide, host-mutated; changing it
/// never retroactively un-marks squares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSpec {
    /// Any full row, column, or diagonal.
    Line,
    /// The four corner squares.
    FourCorners,
    /// Both diagonals (9 distinct squares, center shared).
    X,
    /// Every square on the card.
    FullCard,
    /// An arbitrary host-supplied mask of positions.
    Custom(BTreeSet<Position>),
}

impl PatternSpec {
    /// Short stable name used in broadcasts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            PatternSpec::Line => "line",
            PatternSpec::FourCorners => "four_corners",
            PatternSpec::X => "x",
            PatternSpec::FullCard => "full_card",
            PatternSpec::Custom(_) => "custom",
        }
    }
}

/// Result of evaluating one card against the active pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEvaluation {
    /// Whether the pattern is fully satisfied by legitimate marks.
    pub complete: bool,
    /// Marked squares whose clip was confirmed played (card-wide).
    pub legitimate_marked: usize,
    /// Marked squares whose clip never played (card-wide, anti-cheat signal).
    pub illegitimate_marked: usize,
    /// Best legitimately-marked count across the 12 candidate lines.
    pub best_line_length: usize,
    /// Integer progress toward the pattern, `0..=100`.
    pub progress_percent: u8,
    /// Positions of the first-found completed pattern instance, present only
    /// when `complete` is true. Feeds the auditable host-review view.
    pub winning_positions: Option<Vec<Position>>,
}

/// Evaluate `card` against `pattern` given the authoritative marked set and
/// the room's played-clip log. Pure: no side effects, no stored state.
pub fn evaluate(
    card: &Card,
    marked: &HashSet<Position>,
    played: &IndexSet<String>,
    pattern: &PatternSpec,
) -> PatternEvaluation {
    let mut legitimate = HashSet::new();
    let mut legitimate_marked = 0;
    let mut illegitimate_marked = 0;

    for square in &card.squares {
        if !marked.contains(&square.position) {
            continue;
        }
        if played.contains(&square.clip_id) {
            legitimate.insert(square.position);
            legitimate_marked += 1;
        } else {
            illegitimate_marked += 1;
        }
    }

    let (best_line_length, best_line) = best_line(&legitimate);

    let (complete, winning_positions, progress_percent) = match pattern {
        PatternSpec::Line => {
            let complete = best_line_length == GRID_SIZE as usize;
            let winning = complete.then(|| best_line.clone());
            (complete, winning, percent(best_line_length, GRID_SIZE as usize))
        }
        PatternSpec::FourCorners => completion_over(&corners(), &legitimate),
        PatternSpec::X => completion_over(&x_positions(), &legitimate),
        PatternSpec::FullCard => {
            completion_over(&Position::grid().collect::<Vec<_>>(), &legitimate)
        }
        PatternSpec::Custom(mask) => {
            let required: Vec<Position> = mask.iter().copied().collect();
            completion_over(&required, &legitimate)
        }
    };

    PatternEvaluation {
        complete,
        legitimate_marked,
        illegitimate_marked,
        best_line_length,
        progress_percent,
        winning_positions,
    }
}

/// Completion, winning positions, and progress for a fixed required set.
fn completion_over(
    required: &[Position],
    legitimate: &HashSet<Position>,
) -> (bool, Option<Vec<Position>>, u8) {
    let hit = required
        .iter()
        .filter(|position| legitimate.contains(position))
        .count();
    let complete = !required.is_empty() && hit == required.len();
    let winning = complete.then(|| required.to_vec());
    (complete, winning, percent(hit, required.len()))
}

/// The 12 candidate lines: 5 rows, 5 columns, 2 diagonals.
fn candidate_lines() -> Vec<Vec<Position>> {
    let mut lines = Vec::with_capacity(12);
    for row in 0..GRID_SIZE {
        lines.push((0..GRID_SIZE).map(|col| Position { row, col }).collect());
    }
    for col in 0..GRID_SIZE {
        lines.push((0..GRID_SIZE).map(|row| Position { row, col }).collect());
    }
    lines.push((0..GRID_SIZE).map(|n| Position { row: n, col: n }).collect());
    lines.push(
        (0..GRID_SIZE)
            .map(|n| Position {
                row: n,
                col: GRID_SIZE - 1 - n,
            })
            .collect(),
    );
    lines
}

/// Highest legitimately-marked count over all candidate lines, with the
/// first line reaching that count.
fn best_line(legitimate: &HashSet<Position>) -> (usize, Vec<Position>) {
    let mut best = (0, Vec::new());
    for line in candidate_lines() {
        let hit = line
            .iter()
            .filter(|position| legitimate.contains(position))
            .count();
        if hit > best.0 {
            best = (hit, line);
        }
    }
    best
}

/// The four corner positions.
fn corners() -> Vec<Position> {
    let last = GRID_SIZE - 1;
    vec![
        Position { row: 0, col: 0 },
        Position { row: 0, col: last },
        Position { row: last, col: 0 },
        Position { row: last, col: last },
    ]
}

/// Both diagonals, deduplicated (the center belongs to both).
fn x_positions() -> Vec<Position> {
    let mut positions: Vec<Position> = (0..GRID_SIZE)
        .map(|n| Position { row: n, col: n })
        .collect();
    for n in 0..GRID_SIZE {
        let anti = Position {
            row: n,
            col: GRID_SIZE - 1 - n,
        };
        if !positions.contains(&anti) {
            positions.push(anti);
        }
    }
    positions
}

fn percent(hit: usize, denominator: usize) -> u8 {
    if denominator == 0 {
        return 0;
    }
    ((hit * 100) / denominator) as u8
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::state::card::TrackRef;

    fn test_card() -> Card {
        let pool: Vec<TrackRef> = (0..25)
            .map(|n| TrackRef {
                clip_id: format!("clip-{n}"),
                title: format!("Title {n}"),
                artist: format!("Artist {n}"),
            })
            .collect();
        Card::generate_with(&pool, &mut StdRng::seed_from_u64(42)).unwrap()
    }

    fn mark_and_play(card: &Card, positions: &[Position]) -> (HashSet<Position>, IndexSet<String>) {
        let marked: HashSet<Position> = positions.iter().copied().collect();
        let played: IndexSet<String> = positions
            .iter()
            .map(|position| card.square_at(*position).unwrap().clip_id.clone())
            .collect();
        (marked, played)
    }

    fn row(index: u8) -> Vec<Position> {
        (0..GRID_SIZE)
            .map(|col| Position { row: index, col })
            .collect()
    }

    #[test]
    fn full_row_of_played_marks_completes_line() {
        let card = test_card();
        let (marked, played) = mark_and_play(&card, &row(2));

        let result = evaluate(&card, &marked, &played, &PatternSpec::Line);
        assert!(result.complete);
        assert_eq!(result.best_line_length, 5);
        assert_eq!(result.progress_percent, 100);
        assert_eq!(result.winning_positions, Some(row(2)));
    }

    #[test]
    fn marks_without_playback_never_count() {
        let card = test_card();
        let marked: HashSet<Position> = row(2).into_iter().collect();
        let played = IndexSet::new();

        let result = evaluate(&card, &marked, &played, &PatternSpec::Line);
        assert!(!result.complete);
        assert_eq!(result.legitimate_marked, 0);
        assert_eq!(result.illegitimate_marked, 5);
        assert_eq!(result.best_line_length, 0);
        assert_eq!(result.progress_percent, 0);
    }

    #[test]
    fn one_stale_mark_breaks_the_line_but_is_flagged() {
        let card = test_card();
        let positions = row(0);
        let (marked, mut played) = mark_and_play(&card, &positions);
        // Drop playback confirmation for the last square of the row.
        let stale = card.square_at(positions[4]).unwrap().clip_id.clone();
        played.shift_remove(&stale);

        let result = evaluate(&card, &marked, &played, &PatternSpec::Line);
        assert!(!result.complete);
        assert_eq!(result.legitimate_marked, 4);
        assert_eq!(result.illegitimate_marked, 1);
        assert_eq!(result.best_line_length, 4);
        assert_eq!(result.progress_percent, 80);
    }

    #[test]
    fn four_corners_requires_exactly_the_corners() {
        let card = test_card();
        let corners = corners();
        let (marked, played) = mark_and_play(&card, &corners);

        let result = evaluate(&card, &marked, &played, &PatternSpec::FourCorners);
        assert!(result.complete);
        assert_eq!(result.progress_percent, 100);

        let (partial_marked, partial_played) = mark_and_play(&card, &corners[..3]);
        let partial = evaluate(&card, &partial_marked, &partial_played, &PatternSpec::FourCorners);
        assert!(!partial.complete);
        assert_eq!(partial.progress_percent, 75);
    }

    #[test]
    fn x_pattern_needs_all_nine_distinct_positions() {
        let card = test_card();
        let required = x_positions();
        assert_eq!(required.len(), 9);

        let (marked, played) = mark_and_play(&card, &required);
        let result = evaluate(&card, &marked, &played, &PatternSpec::X);
        assert!(result.complete);
        assert_eq!(result.winning_positions.as_ref().unwrap().len(), 9);

        let (marked, played) = mark_and_play(&card, &required[..8]);
        let partial = evaluate(&card, &marked, &played, &PatternSpec::X);
        assert!(!partial.complete);
        assert_eq!(partial.progress_percent, 88);
    }

    #[test]
    fn full_card_at_24_of_25_reports_96_percent() {
        let card = test_card();
        let all: Vec<Position> = Position::grid().collect();
        let (marked, played) = mark_and_play(&card, &all[..24]);

        let result = evaluate(&card, &marked, &played, &PatternSpec::FullCard);
        assert!(!result.complete);
        assert_eq!(result.legitimate_marked, 24);
        assert_eq!(result.progress_percent, 96);

        let (marked, played) = mark_and_play(&card, &all);
        let full = evaluate(&card, &marked, &played, &PatternSpec::FullCard);
        assert!(full.complete);
        assert_eq!(full.winning_positions.as_ref().unwrap().len(), 25);
    }

    #[test]
    fn custom_pattern_is_restricted_to_its_mask() {
        let card = test_card();
        let mask: BTreeSet<Position> = [
            Position { row: 1, col: 1 },
            Position { row: 1, col: 3 },
            Position { row: 3, col: 2 },
        ]
        .into_iter()
        .collect();
        let mask_positions: Vec<Position> = mask.iter().copied().collect();

        // Legitimate marks outside the mask must not contribute.
        let mut with_noise = mask_positions.clone();
        with_noise.push(Position { row: 0, col: 0 });
        let (marked, played) = mark_and_play(&card, &with_noise[..2]);
        let partial = evaluate(&card, &marked, &played, &PatternSpec::Custom(mask.clone()));
        assert!(!partial.complete);
        assert_eq!(partial.progress_percent, 66);

        let (marked, played) = mark_and_play(&card, &with_noise);
        let result = evaluate(&card, &marked, &played, &PatternSpec::Custom(mask));
        assert!(result.complete);
        assert_eq!(result.winning_positions, Some(mask_positions));
    }

    #[test]
    fn any_of_two_simultaneous_lines_completes() {
        let card = test_card();
        let mut positions = row(1);
        positions.extend(row(3));
        let (marked, played) = mark_and_play(&card, &positions);

        let result = evaluate(&card, &marked, &played, &PatternSpec::Line);
        assert!(result.complete);
        let winning = result.winning_positions.unwrap();
        assert!(winning == row(1) || winning == row(3));
    }
}
