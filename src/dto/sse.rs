//! SSE payloads for the spectator and host streams.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::common::{ClipSummary, VisibleRoomPhase};
use crate::dto::ws::ReviewLineSummary;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event with a pre-rendered data payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to the host SSE client when it connects.
pub struct HostHandshake {
    /// Token identifying the single active host console.
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a room's phase changes.
pub struct PhaseChangedEvent {
    pub room_id: String,
    pub phase: VisibleRoomPhase,
    pub paused_for_verification: bool,
    /// Present while paused: the participant whose claim opened the review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a clip is confirmed playing.
pub struct ClipStartedEvent {
    pub room_id: String,
    pub clip: ClipSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Host-stream event carrying the auditable review detail for a fresh claim.
pub struct ClaimReviewOpenedEvent {
    pub room_id: String,
    pub claimant_id: String,
    pub pattern: String,
    pub lines: Vec<ReviewLineSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a claim resolves (approved, rejected, or timed out).
pub struct ClaimResolvedEvent {
    pub room_id: String,
    pub claimant_id: String,
    pub approved: bool,
    pub outcome: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a round completes.
pub struct RoundCompleteEvent {
    pub room_id: String,
    pub round_index: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a whole event is reset back to idle.
pub struct EventResetEvent {
    pub room_id: String,
}
