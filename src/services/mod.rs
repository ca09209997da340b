/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Host-facing room operations.
pub mod room_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage persistence supervisor.
pub mod storage_supervisor;
/// Audio catalog / playback provider boundary.
pub mod track_provider;
/// WebSocket connection and message handling service.
pub mod websocket_service;
