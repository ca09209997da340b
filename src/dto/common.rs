//! Shared snapshot and conversion types used by REST, WS, and SSE payloads.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::card::{Position, TrackRef};
use crate::state::pattern::{PatternEvaluation, PatternSpec};
use crate::state::room_phase::{RoomPhase, RoundActivity};

/// Public projection of the currently playing clip.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClipSummary {
    pub clip_id: String,
    pub title: String,
    pub artist: String,
}

impl From<&TrackRef> for ClipSummary {
    fn from(track: &TrackRef) -> Self {
        Self {
            clip_id: track.clip_id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
        }
    }
}

/// Room phase as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibleRoomPhase {
    Idle,
    Playing,
    PausedForReview,
    RoundOver,
    Ended,
}

impl From<&RoomPhase> for VisibleRoomPhase {
    fn from(phase: &RoomPhase) -> Self {
        match phase {
            RoomPhase::Idle => VisibleRoomPhase::Idle,
            RoomPhase::RoundRunning(RoundActivity::Playing) => VisibleRoomPhase::Playing,
            RoomPhase::RoundRunning(RoundActivity::PausedForReview { .. }) => {
                VisibleRoomPhase::PausedForReview
            }
            RoomPhase::RoundRunning(RoundActivity::RoundOver) => VisibleRoomPhase::RoundOver,
            RoomPhase::Ended => VisibleRoomPhase::Ended,
        }
    }
}

/// Wire representation of a win pattern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternDto {
    /// Any full row, column, or diagonal.
    Line,
    /// The four corner squares.
    FourCorners,
    /// Both diagonals.
    X,
    /// Every square.
    FullCard,
    /// Host-supplied mask of `"row-col"` positions.
    Custom {
        #[schema(value_type = Vec<String>)]
        mask: Vec<String>,
    },
}

impl From<&PatternSpec> for PatternDto {
    fn from(pattern: &PatternSpec) -> Self {
        match pattern {
            PatternSpec::Line => PatternDto::Line,
            PatternSpec::FourCorners => PatternDto::FourCorners,
            PatternSpec::X => PatternDto::X,
            PatternSpec::FullCard => PatternDto::FullCard,
            PatternSpec::Custom(mask) => PatternDto::Custom {
                mask: mask.iter().map(Position::to_string).collect(),
            },
        }
    }
}

impl TryFrom<PatternDto> for PatternSpec {
    type Error = String;

    fn try_from(dto: PatternDto) -> Result<Self, Self::Error> {
        let pattern = match dto {
            PatternDto::Line => PatternSpec::Line,
            PatternDto::FourCorners => PatternSpec::FourCorners,
            PatternDto::X => PatternSpec::X,
            PatternDto::FullCard => PatternSpec::FullCard,
            PatternDto::Custom { mask } => {
                if mask.is_empty() {
                    return Err("custom pattern mask must not be empty".into());
                }
                let positions = mask
                    .iter()
                    .map(|raw| raw.parse::<Position>().map_err(|err| err.to_string()))
                    .collect::<Result<BTreeSet<Position>, _>>()?;
                PatternSpec::Custom(positions)
            }
        };
        Ok(pattern)
    }
}

/// Pattern progress as reported back to a claimant or spectator.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProgressSummary {
    pub complete: bool,
    pub legitimate_marked: usize,
    pub illegitimate_marked: usize,
    pub best_line_length: usize,
    pub progress_percent: u8,
}

impl From<&PatternEvaluation> for ProgressSummary {
    fn from(evaluation: &PatternEvaluation) -> Self {
        Self {
            complete: evaluation.complete,
            legitimate_marked: evaluation.legitimate_marked,
            illegitimate_marked: evaluation.illegitimate_marked,
            best_line_length: evaluation.best_line_length,
            progress_percent: evaluation.progress_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_pattern_round_trips() {
        let dto = PatternDto::Custom {
            mask: vec!["0-0".into(), "2-2".into(), "4-4".into()],
        };
        let pattern: PatternSpec = dto.try_into().unwrap();
        let PatternSpec::Custom(mask) = &pattern else {
            panic!("expected custom pattern");
        };
        assert_eq!(mask.len(), 3);

        let back: PatternDto = (&pattern).into();
        let PatternDto::Custom { mask } = back else {
            panic!("expected custom dto");
        };
        assert_eq!(mask, vec!["0-0", "2-2", "4-4"]);
    }

    #[test]
    fn custom_pattern_rejects_bad_positions() {
        let dto = PatternDto::Custom {
            mask: vec!["5-0".into()],
        };
        assert!(PatternSpec::try_from(dto).is_err());

        let empty = PatternDto::Custom { mask: Vec::new() };
        assert!(PatternSpec::try_from(empty).is_err());
    }
}
