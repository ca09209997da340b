//! WebSocket message contracts for participant devices.
//!
//! Payloads are closed tagged variants with fixed fields, decoded and
//! validated here before any of them reaches the room.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dto::{
    card::CardSummary,
    common::{ClipSummary, ProgressSummary, VisibleRoomPhase},
    validation::{validate_participant_id, validate_room_id},
};

/// Messages accepted from participant WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ParticipantInboundMessage {
    /// First message on every (re)connection, binding the stream to a room
    /// and a stable participant identity.
    #[serde(rename = "join")]
    Join {
        room_id: String,
        participant_id: String,
    },
    /// Toggle a square of the sender's card.
    #[serde(rename = "mark_square")]
    MarkSquare { position: String },
    /// Assert that the sender's card satisfies the active pattern.
    #[serde(rename = "claim_win")]
    ClaimWin,
    /// Externally-polled playback state relayed by the controlling device.
    #[serde(rename = "playback_report")]
    PlaybackReport { playing: bool },
    #[serde(other)]
    Unknown,
}

/// Errors produced while decoding or validating an inbound message.
#[derive(Debug, Error)]
pub enum InboundMessageError {
    /// The payload was not valid JSON for any known variant.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload decoded but carried invalid fields.
    #[error("invalid message field: {0}")]
    Invalid(String),
}

impl ParticipantInboundMessage {
    /// Decode and validate one inbound frame.
    pub fn from_json_str(payload: &str) -> Result<Self, InboundMessageError> {
        let message: Self = serde_json::from_str(payload)?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), InboundMessageError> {
        match self {
            Self::Join {
                room_id,
                participant_id,
            } => {
                validate_room_id(room_id)
                    .map_err(|err| InboundMessageError::Invalid(err.to_string()))?;
                validate_participant_id(participant_id)
                    .map_err(|err| InboundMessageError::Invalid(err.to_string()))?;
                Ok(())
            }
            Self::MarkSquare { position } => position
                .parse::<crate::state::card::Position>()
                .map(|_| ())
                .map_err(|err| InboundMessageError::Invalid(err.to_string())),
            Self::ClaimWin | Self::PlaybackReport { .. } | Self::Unknown => Ok(()),
        }
    }
}

/// One row of the claim-resolution detail shown to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewLineSummary {
    /// Grid coordinate rendered as `"row-col"`.
    pub position: String,
    pub clip_id: String,
    /// `legitimate`, `illegitimate`, or `unmarked`.
    pub verdict: String,
}

impl From<&crate::state::claim::ReviewLine> for ReviewLineSummary {
    fn from(line: &crate::state::claim::ReviewLine) -> Self {
        use crate::state::claim::SquareVerdict;
        let verdict = match line.verdict {
            SquareVerdict::Legitimate => "legitimate",
            SquareVerdict::Illegitimate => "illegitimate",
            SquareVerdict::Unmarked => "unmarked",
        };
        Self {
            position: line.position.to_string(),
            clip_id: line.clip_id.clone(),
            verdict: verdict.into(),
        }
    }
}

/// Full authoritative session snapshot, personalized with the receiving
/// participant's marks. Sent on resync and on demand.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionStateSummary {
    pub room_id: String,
    pub phase: VisibleRoomPhase,
    pub paused_for_verification: bool,
    pub active_round_index: Option<usize>,
    pub pattern: crate::dto::common::PatternDto,
    pub current_clip: Option<ClipSummary>,
    pub played_clip_ids: Vec<String>,
    /// The receiver's marked positions, `"row-col"` each.
    pub marked_positions: Vec<String>,
}

/// Messages pushed to participant WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The participant's card for the current round.
    #[serde(rename = "card_assigned")]
    CardAssigned { card: CardSummary },
    /// A clip was confirmed playing by the room.
    #[serde(rename = "clip_started")]
    ClipStarted { clip: ClipSummary },
    /// A win claim froze the room pending review.
    #[serde(rename = "game_paused")]
    GamePaused { claimant: String },
    /// The pending claim was resolved.
    #[serde(rename = "claim_resolved")]
    ClaimResolved {
        claimant: String,
        approved: bool,
        outcome: String,
        details: Vec<ReviewLineSummary>,
    },
    /// The sender's claim did not complete the pattern; room unaffected.
    #[serde(rename = "claim_invalid")]
    ClaimInvalid { progress: ProgressSummary },
    /// The sender's claim was queued behind an in-flight review.
    #[serde(rename = "claim_queued")]
    ClaimQueued { place: usize },
    /// Authoritative echo of a mark toggle.
    #[serde(rename = "mark_applied")]
    MarkApplied { position: String, marked: bool },
    /// The active round completed; the host may advance.
    #[serde(rename = "round_complete")]
    RoundComplete { round_index: usize },
    /// Full authoritative snapshot.
    #[serde(rename = "session_state")]
    SessionState { state: SessionStateSummary },
    /// The event's final round was won; the session is over.
    #[serde(rename = "session_ended")]
    SessionEnded,
    /// A rejected command, echoed to the initiating client only.
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_decodes_and_validates() {
        let message = ParticipantInboundMessage::from_json_str(
            r#"{"type":"join","room_id":"friday-01","participant_id":"phone-1"}"#,
        )
        .unwrap();
        assert!(matches!(message, ParticipantInboundMessage::Join { .. }));

        let err = ParticipantInboundMessage::from_json_str(
            r#"{"type":"join","room_id":"Friday 01","participant_id":"phone-1"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, InboundMessageError::Invalid(_)));
    }

    #[test]
    fn mark_square_requires_a_grid_position() {
        assert!(ParticipantInboundMessage::from_json_str(
            r#"{"type":"mark_square","position":"2-4"}"#
        )
        .is_ok());
        assert!(ParticipantInboundMessage::from_json_str(
            r#"{"type":"mark_square","position":"9-9"}"#
        )
        .is_err());
    }

    #[test]
    fn unknown_message_types_decode_to_unknown() {
        let message =
            ParticipantInboundMessage::from_json_str(r#"{"type":"dance","tempo":120}"#).unwrap();
        assert!(matches!(message, ParticipantInboundMessage::Unknown));
    }

    #[test]
    fn server_messages_tag_with_type() {
        let message = ServerMessage::SessionEnded;
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"type":"session_ended"}"#);
    }
}
