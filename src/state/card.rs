//! Bingo cards and their generation from a finalized track pool.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::{SliceRandom, index};
use thiserror::Error;
use uuid::Uuid;

/// Width and height of a bingo card.
pub const GRID_SIZE: u8 = 5;
/// Number of squares on a card.
pub const CARD_SQUARES: usize = (GRID_SIZE as usize) * (GRID_SIZE as usize);

/// A cell coordinate on the 5x5 grid, rendered as `"row-col"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Row index, `0..5`.
    pub row: u8,
    /// Column index, `0..5`.
    pub col: u8,
}

impl Position {
    /// Build a position, returning `None` when either coordinate is off-grid.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        (row < GRID_SIZE && col < GRID_SIZE).then_some(Self { row, col })
    }

    /// Iterate over the full grid in row-major order.
    pub fn grid() -> impl Iterator<Item = Position> {
        (0..GRID_SIZE)
            .flat_map(|row| (0..GRID_SIZE).map(move |col| Position { row, col }))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

/// Error returned when a `"row-col"` string cannot be parsed into a [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid position `{0}`: expected `row-col` with coordinates in 0..5")]
pub struct ParsePositionError(String);

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePositionError(s.to_string());
        let (row, col) = s.split_once('-').ok_or_else(err)?;
        let row = row.parse::<u8>().map_err(|_| err())?;
        let col = col.parse::<u8>().map_err(|_| err())?;
        Position::new(row, col).ok_or_else(err)
    }
}

/// A playable track as listed by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    /// Stable catalog identifier for the clip.
    pub clip_id: String,
    /// Display title shown on the square.
    pub title: String,
    /// Display artist shown on the square.
    pub artist: String,
}

/// One cell of a card. `marked` changes only through an authoritative
/// mark/unmark command, never implied by playback.
#[derive(Debug, Clone, PartialEq)]
pub struct Square {
    /// Grid coordinate of the square.
    pub position: Position,
    /// Clip this square refers to.
    pub clip_id: String,
    /// Display title for the square.
    pub display_title: String,
    /// Display artist for the square.
    pub display_artist: String,
    /// Whether the owning participant has marked this square.
    pub marked: bool,
}

/// A participant's 5x5 card: 25 squares over 25 distinct clips, covering
/// every grid position exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// Unique identifier of this card instance.
    pub id: Uuid,
    /// The 25 squares, in the order positions were dealt.
    pub squares: Vec<Square>,
}

/// Errors raised while generating a card.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    /// The track pool holds fewer distinct tracks than a card needs.
    #[error("insufficient track pool: need {CARD_SQUARES} tracks, have {have}")]
    InsufficientPool {
        /// Number of tracks available in the pool.
        have: usize,
    },
}

impl Card {
    /// Generate a card from a finalized, deduplicated pool using the
    /// process-wide RNG.
    pub fn generate(pool: &[TrackRef]) -> Result<Self, CardError> {
        Self::generate_with(pool, &mut rand::rng())
    }

    /// Generate a card from `pool` with an explicit RNG.
    ///
    /// Picks 25 tracks uniformly at random without replacement, then deals
    /// them onto the grid through a Fisher-Yates shuffle of the *position*
    /// order, so two cards drawn from the same pool are independent random
    /// bijections pool -> grid.
    pub fn generate_with<R: Rng + ?Sized>(
        pool: &[TrackRef],
        rng: &mut R,
    ) -> Result<Self, CardError> {
        if pool.len() < CARD_SQUARES {
            return Err(CardError::InsufficientPool { have: pool.len() });
        }

        let picks = index::sample(rng, pool.len(), CARD_SQUARES);

        let mut positions: Vec<Position> = Position::grid().collect();
        positions.shuffle(rng);

        let squares = positions
            .into_iter()
            .zip(picks.iter())
            .map(|(position, pool_index)| {
                let track = &pool[pool_index];
                Square {
                    position,
                    clip_id: track.clip_id.clone(),
                    display_title: track.title.clone(),
                    display_artist: track.artist.clone(),
                    marked: false,
                }
            })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            squares,
        })
    }

    /// Look up the square at `position`, if the card has one there.
    pub fn square_at(&self, position: Position) -> Option<&Square> {
        self.squares.iter().find(|square| square.position == position)
    }

    /// Whether any square on this card refers to `clip_id`.
    pub fn contains_clip(&self, clip_id: &str) -> bool {
        self.squares.iter().any(|square| square.clip_id == clip_id)
    }

    /// Clone of this card with `marked` overlaid from the authoritative
    /// marked-position set. Used for claim snapshots and client projections.
    pub fn with_marks(&self, marked: &std::collections::HashSet<Position>) -> Card {
        let mut card = self.clone();
        for square in &mut card.squares {
            square.marked = marked.contains(&square.position);
        }
        card
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    pub(crate) fn pool_of(size: usize) -> Vec<TrackRef> {
        (0..size)
            .map(|n| TrackRef {
                clip_id: format!("clip-{n}"),
                title: format!("Title {n}"),
                artist: format!("Artist {n}"),
            })
            .collect()
    }

    #[test]
    fn position_round_trips_through_display() {
        for position in Position::grid() {
            let parsed: Position = position.to_string().parse().unwrap();
            assert_eq!(parsed, position);
        }
    }

    #[test]
    fn position_rejects_out_of_range_and_garbage() {
        assert!("5-0".parse::<Position>().is_err());
        assert!("0-5".parse::<Position>().is_err());
        assert!("2".parse::<Position>().is_err());
        assert!("a-b".parse::<Position>().is_err());
        assert!("-1-2".parse::<Position>().is_err());
    }

    #[test]
    fn generated_card_covers_the_grid_with_distinct_clips() {
        let pool = pool_of(40);
        let card = Card::generate_with(&pool, &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(card.squares.len(), CARD_SQUARES);

        let positions: HashSet<Position> =
            card.squares.iter().map(|square| square.position).collect();
        assert_eq!(positions, Position::grid().collect::<HashSet<_>>());

        let clips: HashSet<&str> = card
            .squares
            .iter()
            .map(|square| square.clip_id.as_str())
            .collect();
        assert_eq!(clips.len(), CARD_SQUARES);
        assert!(card.squares.iter().all(|square| !square.marked));
    }

    #[test]
    fn exact_size_pool_uses_every_track() {
        let pool = pool_of(CARD_SQUARES);
        let card = Card::generate_with(&pool, &mut StdRng::seed_from_u64(3)).unwrap();

        let clips: HashSet<&str> = card
            .squares
            .iter()
            .map(|square| square.clip_id.as_str())
            .collect();
        assert_eq!(clips.len(), CARD_SQUARES);
        for track in &pool {
            assert!(card.contains_clip(&track.clip_id));
        }
    }

    #[test]
    fn undersized_pool_is_rejected() {
        let pool = pool_of(24);
        let err = Card::generate_with(&pool, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err, CardError::InsufficientPool { have: 24 });
    }

    #[test]
    fn cards_from_the_same_pool_differ() {
        let pool = pool_of(60);
        let mut rng = StdRng::seed_from_u64(11);
        let first = Card::generate_with(&pool, &mut rng).unwrap();
        let second = Card::generate_with(&pool, &mut rng).unwrap();

        let same_layout = first.squares.iter().zip(second.squares.iter()).all(
            |(a, b)| a.position == b.position && a.clip_id == b.clip_id,
        );
        assert!(!same_layout, "two draws produced an identical card layout");
    }
}
