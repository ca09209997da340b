//! Card projections sent to participant devices.

use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::card::{Card, Position, Square};

/// One square of a card as sent to its owner.
#[serde_as]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SquareSummary {
    /// Grid coordinate rendered as `"row-col"`.
    #[serde_as(as = "DisplayFromStr")]
    #[schema(value_type = String)]
    pub position: Position,
    pub clip_id: String,
    pub display_title: String,
    pub display_artist: String,
    pub marked: bool,
}

impl From<&Square> for SquareSummary {
    fn from(square: &Square) -> Self {
        Self {
            position: square.position,
            clip_id: square.clip_id.clone(),
            display_title: square.display_title.clone(),
            display_artist: square.display_artist.clone(),
            marked: square.marked,
        }
    }
}

/// A participant's card as sent on assignment and resync.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CardSummary {
    pub id: Uuid,
    pub squares: Vec<SquareSummary>,
}

impl From<&Card> for CardSummary {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            squares: card.squares.iter().map(Into::into).collect(),
        }
    }
}
