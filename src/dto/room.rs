//! REST payloads for the host-facing room operations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::{
    common::{ClipSummary, PatternDto, VisibleRoomPhase},
    format_system_time,
    validation::validate_room_id,
    ws::ReviewLineSummary,
};
use crate::state::room::RoomSnapshot;
use crate::state::rounds::Round;

/// Payload used to create (or re-open) a room.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Join code of the room; lowercase alphanumerics and dashes.
    pub room_id: String,
}

impl Validate for CreateRoomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_room_id(&self.room_id) {
            errors.add("room_id", err);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Payload appending a round to the event schedule.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddRoundRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
}

/// Payload assigning a track pool to a round. The refs are resolved through
/// the catalog provider and deduplicated before the pool is finalized.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlanRoundRequest {
    #[validate(length(min = 1))]
    pub pool_refs: Vec<String>,
}

/// Host decision on the claim awaiting review.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewClaimRequest {
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload switching the room-wide win pattern.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPatternRequest {
    pub pattern: PatternDto,
}

/// Generic acknowledgement for host commands.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub status: String,
}

impl ActionResponse {
    /// Acknowledge a command that went through.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Round projection inside a room summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    pub index: usize,
    pub id: Uuid,
    pub name: String,
    /// `unplanned`, `planned`, `active`, or `completed`.
    pub status: String,
    pub track_count: usize,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<(usize, &Round)> for RoundSummary {
    fn from((index, round): (usize, &Round)) -> Self {
        Self {
            index,
            id: round.id,
            name: round.name.clone(),
            status: round.status.to_string(),
            track_count: round.track_pool.len(),
            started_at: round.started_at.map(format_system_time),
            completed_at: round.completed_at.map(format_system_time),
        }
    }
}

/// The claim currently awaiting review, as exposed to the host.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingReviewSummary {
    pub claim_id: Uuid,
    pub claimant_id: String,
    pub claimed_at: String,
    pub pattern: String,
    pub lines: Vec<ReviewLineSummary>,
}

/// Full host-facing room summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSummary {
    pub room_id: String,
    pub phase: VisibleRoomPhase,
    pub paused_for_verification: bool,
    pub pattern: PatternDto,
    pub active_round_index: Option<usize>,
    pub rounds: Vec<RoundSummary>,
    pub participants: Vec<String>,
    pub current_clip: Option<ClipSummary>,
    pub played_clip_ids: Vec<String>,
    pub pending_review: Option<PendingReviewSummary>,
    /// Stale playback reports dropped by the sync guards so far.
    pub discarded_reports: u64,
}

impl From<RoomSnapshot> for RoomSummary {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            room_id: snapshot.room_id,
            phase: (&snapshot.phase).into(),
            paused_for_verification: snapshot.phase.paused_for_verification(),
            pattern: (&snapshot.pattern).into(),
            active_round_index: snapshot.active_round_index,
            rounds: snapshot
                .rounds
                .iter()
                .enumerate()
                .map(Into::into)
                .collect(),
            participants: snapshot.participants,
            current_clip: snapshot.current_clip.as_ref().map(Into::into),
            played_clip_ids: snapshot.played_clip_ids,
            pending_review: snapshot.pending_review.map(|review| PendingReviewSummary {
                claim_id: review.claim.id,
                claimant_id: review.claim.claimant_id.clone(),
                claimed_at: format_system_time(review.claim.claimed_at),
                pattern: review.claim.required_pattern.name().into(),
                lines: review.lines.iter().map(Into::into).collect(),
            }),
            discarded_reports: snapshot.discarded_reports,
        }
    }
}
