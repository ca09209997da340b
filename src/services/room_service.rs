//! Business logic powering the host REST routes. These helpers translate
//! HTTP requests into room commands and await the room task's reply, so all
//! room state keeps flowing through the per-room serialized queue.

use tokio::sync::oneshot;

use crate::{
    dto::room::{
        AddRoundRequest, CreateRoomRequest, PlanRoundRequest, ReviewClaimRequest, RoomSummary,
        SetPatternRequest,
    },
    error::ServiceError,
    services::track_provider::dedup_tracks,
    state::card::TrackRef,
    state::pattern::PatternSpec,
    state::room::{Reply, RoomCommand, RoomHandle, RoomSnapshot},
    state::SharedState,
};

/// Create (or re-open) a room, restoring its persisted schedule if one
/// exists, and return its current summary.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomSummary, ServiceError> {
    let handle = state.ensure_room(&request.room_id).await;
    snapshot_of(&handle).await.map(Into::into)
}

/// Summary of an existing room.
pub async fn room_summary(state: &SharedState, room_id: &str) -> Result<RoomSummary, ServiceError> {
    let handle = existing_room(state, room_id)?;
    snapshot_of(&handle).await.map(Into::into)
}

/// Append a round to the event schedule, returning its index.
pub async fn add_round(
    state: &SharedState,
    room_id: &str,
    request: AddRoundRequest,
) -> Result<usize, ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::AddRound {
        name: request.name,
        reply,
    })
    .await
}

/// Resolve pool refs through the catalog provider, deduplicate the result,
/// and finalize it as the round's track pool. Returns the pool size.
pub async fn plan_round(
    state: &SharedState,
    room_id: &str,
    index: usize,
    request: PlanRoundRequest,
) -> Result<usize, ServiceError> {
    let handle = existing_room(state, room_id)?;

    let tracks = state
        .provider()
        .list_playable_tracks(request.pool_refs)
        .await
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let pool: Vec<TrackRef> = dedup_tracks(tracks);

    command(&handle, |reply| RoomCommand::PlanRound { index, pool, reply }).await
}

/// Activate a planned round.
pub async fn start_round(
    state: &SharedState,
    room_id: &str,
    index: usize,
) -> Result<(), ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::StartRound { index, reply }).await
}

/// Complete the active round without a win, returning its index.
pub async fn complete_round(state: &SharedState, room_id: &str) -> Result<usize, ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::CompleteRound { reply }).await
}

/// Switch the room-wide win pattern.
pub async fn set_pattern(
    state: &SharedState,
    room_id: &str,
    request: SetPatternRequest,
) -> Result<(), ServiceError> {
    let handle = existing_room(state, room_id)?;
    let pattern: PatternSpec = request
        .pattern
        .try_into()
        .map_err(ServiceError::InvalidInput)?;
    command(&handle, |reply| RoomCommand::SetPattern { pattern, reply }).await
}

/// Resolve the claim awaiting host review.
pub async fn review_claim(
    state: &SharedState,
    room_id: &str,
    request: ReviewClaimRequest,
) -> Result<(), ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::ReviewClaim {
        approved: request.approved,
        reason: request.reason,
        reply,
    })
    .await
}

/// Reset the whole event back to idle.
pub async fn reset_event(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::ResetEvent { reply }).await
}

/// Advance playback to the next clip of the active round.
pub async fn next_clip(state: &SharedState, room_id: &str) -> Result<TrackRef, ServiceError> {
    let handle = existing_room(state, room_id)?;
    command(&handle, |reply| RoomCommand::NextClip { reply }).await
}

fn existing_room(state: &SharedState, room_id: &str) -> Result<RoomHandle, ServiceError> {
    state
        .room(room_id)
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))
}

async fn snapshot_of(handle: &RoomHandle) -> Result<RoomSnapshot, ServiceError> {
    let (tx, rx) = oneshot::channel();
    handle.send(RoomCommand::Snapshot { reply: tx })?;
    rx.await
        .map_err(|_| ServiceError::InvalidState("room task dropped the command".into()))
}

/// Send one host command through the room queue and await its reply.
async fn command<T>(
    handle: &RoomHandle,
    build: impl FnOnce(Reply<T>) -> RoomCommand,
) -> Result<T, ServiceError> {
    let (tx, rx) = oneshot::channel();
    handle.send(build(tx))?;
    rx.await
        .map_err(|_| ServiceError::InvalidState("room task dropped the command".into()))?
}
