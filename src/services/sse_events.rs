//! Typed broadcast helpers for the spectator and host SSE streams.

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{
        ClaimResolvedEvent, ClaimReviewOpenedEvent, ClipStartedEvent, EventResetEvent,
        PhaseChangedEvent, RoundCompleteEvent, ServerEvent, SystemStatus,
    },
    state::SharedState,
    state::card::TrackRef,
    state::claim::PendingReview,
    state::room_phase::RoomPhase,
};

const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_CLIP_STARTED: &str = "clip_started";
const EVENT_CLAIM_REVIEW_OPENED: &str = "claim.review_opened";
const EVENT_CLAIM_RESOLVED: &str = "claim.resolved";
const EVENT_ROUND_COMPLETE: &str = "round_complete";
const EVENT_RESET: &str = "event.reset";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a room phase change to spectators and the host.
pub fn broadcast_phase_changed(
    state: &SharedState,
    room_id: &str,
    phase: &RoomPhase,
    claimant: Option<&str>,
) {
    let payload = PhaseChangedEvent {
        room_id: room_id.to_string(),
        phase: phase.into(),
        paused_for_verification: phase.paused_for_verification(),
        claimant: claimant.map(str::to_string),
    };
    send_public_event(state, EVENT_PHASE_CHANGED, &payload);
    send_host_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast a confirmed clip start.
pub fn broadcast_clip_started(state: &SharedState, room_id: &str, clip: &TrackRef) {
    let payload = ClipStartedEvent {
        room_id: room_id.to_string(),
        clip: clip.into(),
    };
    send_public_event(state, EVENT_CLIP_STARTED, &payload);
    send_host_event(state, EVENT_CLIP_STARTED, &payload);
}

/// Push the auditable review detail for a fresh claim to the host console.
pub fn broadcast_claim_review_opened(state: &SharedState, room_id: &str, review: &PendingReview) {
    let payload = ClaimReviewOpenedEvent {
        room_id: room_id.to_string(),
        claimant_id: review.claim.claimant_id.clone(),
        pattern: review.claim.required_pattern.name().into(),
        lines: review.lines.iter().map(Into::into).collect(),
    };
    send_host_event(state, EVENT_CLAIM_REVIEW_OPENED, &payload);
}

/// Broadcast a claim resolution.
pub fn broadcast_claim_resolved(
    state: &SharedState,
    room_id: &str,
    claimant_id: &str,
    approved: bool,
    outcome: &str,
) {
    let payload = ClaimResolvedEvent {
        room_id: room_id.to_string(),
        claimant_id: claimant_id.to_string(),
        approved,
        outcome: outcome.to_string(),
    };
    send_public_event(state, EVENT_CLAIM_RESOLVED, &payload);
    send_host_event(state, EVENT_CLAIM_RESOLVED, &payload);
}

/// Broadcast a round completion.
pub fn broadcast_round_complete(state: &SharedState, room_id: &str, round_index: usize) {
    let payload = RoundCompleteEvent {
        room_id: room_id.to_string(),
        round_index,
    };
    send_public_event(state, EVENT_ROUND_COMPLETE, &payload);
    send_host_event(state, EVENT_ROUND_COMPLETE, &payload);
}

/// Broadcast a whole-event reset.
pub fn broadcast_event_reset(state: &SharedState, room_id: &str) {
    let payload = EventResetEvent {
        room_id: room_id.to_string(),
    };
    send_public_event(state, EVENT_RESET, &payload);
    send_host_event(state, EVENT_RESET, &payload);
}

/// Broadcast a degraded-mode flip to every stream.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let payload = SystemStatus { degraded };
    send_public_event(state, EVENT_SYSTEM_STATUS, &payload);
    send_host_event(state, EVENT_SYSTEM_STATUS, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_host_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.host_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize host SSE payload"),
    }
}
