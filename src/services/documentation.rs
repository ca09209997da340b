use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Clip Bingo Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::host_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::room::create_room,
        crate::routes::room::get_room,
        crate::routes::room::add_round,
        crate::routes::room::plan_round,
        crate::routes::room::start_round,
        crate::routes::room::complete_round,
        crate::routes::room::set_pattern,
        crate::routes::room::review_claim,
        crate::routes::room::reset_event,
        crate::routes::room::next_clip,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ParticipantInboundMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::SessionStateSummary,
            crate::dto::card::CardSummary,
            crate::dto::common::PatternDto,
            crate::dto::common::ProgressSummary,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::AddRoundRequest,
            crate::dto::room::PlanRoundRequest,
            crate::dto::room::ReviewClaimRequest,
            crate::dto::room::SetPatternRequest,
            crate::dto::room::RoomSummary,
            crate::dto::sse::HostHandshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "room", description = "Host operations driving a room"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "participants", description = "WebSocket operations for participant devices"),
    )
)]
pub struct ApiDoc;
