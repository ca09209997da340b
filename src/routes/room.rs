//! Host-facing room management endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::common::ClipSummary,
    dto::room::{
        ActionResponse, AddRoundRequest, CreateRoomRequest, PlanRoundRequest, ReviewClaimRequest,
        RoomSummary, SetPatternRequest,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes driving rooms: creation, round lifecycle, pattern, review, playback.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/rounds", post(add_round))
        .route("/rooms/{room_id}/rounds/{index}/plan", post(plan_round))
        .route("/rooms/{room_id}/rounds/{index}/start", post(start_round))
        .route("/rooms/{room_id}/rounds/complete", post(complete_round))
        .route("/rooms/{room_id}/pattern", put(set_pattern))
        .route("/rooms/{room_id}/review", post(review_claim))
        .route("/rooms/{room_id}/reset", post(reset_event))
        .route("/rooms/{room_id}/clips/next", post(next_clip))
}

#[utoipa::path(
    post,
    path = "/rooms",
    tag = "room",
    request_body = CreateRoomRequest,
    responses((status = 200, description = "Room created or re-opened", body = RoomSummary))
)]
/// Create a room (or re-open one, restoring its persisted schedule).
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    payload.validate()?;
    let summary = room_service::create_room(&state, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/rooms/{room_id}",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    responses((status = 200, description = "Room summary", body = RoomSummary))
)]
/// Full host-facing summary of a room.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::room_summary(&state, &room_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/rounds",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    request_body = AddRoundRequest,
    responses((status = 200, description = "Round appended; body carries its index", body = usize))
)]
/// Append a round to the event schedule.
pub async fn add_round(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<AddRoundRequest>,
) -> Result<Json<usize>, AppError> {
    payload.validate()?;
    let index = room_service::add_round(&state, &room_id, payload).await?;
    Ok(Json(index))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/rounds/{index}/plan",
    tag = "room",
    params(
        ("room_id" = String, Path, description = "Join code of the room"),
        ("index" = usize, Path, description = "Round index"),
    ),
    request_body = PlanRoundRequest,
    responses((status = 200, description = "Pool finalized; body carries its size", body = usize))
)]
/// Resolve and finalize a deduplicated track pool for a round.
pub async fn plan_round(
    State(state): State<SharedState>,
    Path((room_id, index)): Path<(String, usize)>,
    Json(payload): Json<PlanRoundRequest>,
) -> Result<Json<usize>, AppError> {
    payload.validate()?;
    let pool_size = room_service::plan_round(&state, &room_id, index, payload).await?;
    Ok(Json(pool_size))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/rounds/{index}/start",
    tag = "room",
    params(
        ("room_id" = String, Path, description = "Join code of the room"),
        ("index" = usize, Path, description = "Round index"),
    ),
    responses((status = 200, description = "Round started", body = ActionResponse))
)]
/// Activate a planned round, dealing fresh cards to connected participants.
pub async fn start_round(
    State(state): State<SharedState>,
    Path((room_id, index)): Path<(String, usize)>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::start_round(&state, &room_id, index).await?;
    Ok(Json(ActionResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/rounds/complete",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    responses((status = 200, description = "Round completed; body carries its index", body = usize))
)]
/// Complete the active round without a win.
pub async fn complete_round(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<usize>, AppError> {
    let index = room_service::complete_round(&state, &room_id).await?;
    Ok(Json(index))
}

#[utoipa::path(
    put,
    path = "/rooms/{room_id}/pattern",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    request_body = SetPatternRequest,
    responses((status = 200, description = "Pattern updated", body = ActionResponse))
)]
/// Switch the room-wide win pattern.
pub async fn set_pattern(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<SetPatternRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::set_pattern(&state, &room_id, payload).await?;
    Ok(Json(ActionResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/review",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    request_body = ReviewClaimRequest,
    responses((status = 200, description = "Claim resolved", body = ActionResponse))
)]
/// Resolve the claim awaiting host review.
pub async fn review_claim(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
    Json(payload): Json<ReviewClaimRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::review_claim(&state, &room_id, payload).await?;
    Ok(Json(ActionResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/reset",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    responses((status = 200, description = "Event reset", body = ActionResponse))
)]
/// Reset the whole event: every round back to unplanned, room back to idle.
pub async fn reset_event(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::reset_event(&state, &room_id).await?;
    Ok(Json(ActionResponse::ok()))
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/clips/next",
    tag = "room",
    params(("room_id" = String, Path, description = "Join code of the room")),
    responses((status = 200, description = "Next clip queued on the provider", body = ClipSummary))
)]
/// Advance playback to the next clip of the active round.
pub async fn next_clip(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<ClipSummary>, AppError> {
    let clip = room_service::next_clip(&state, &room_id).await?;
    Ok(Json((&clip).into()))
}
