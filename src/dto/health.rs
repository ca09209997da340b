//! Health endpoint payload.

use serde::Serialize;
use utoipa::ToSchema;

/// Health status of the backend.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Whether the backend runs without a storage connection.
    pub degraded: bool,
}

impl HealthResponse {
    /// Fully operational.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            degraded: false,
        }
    }

    /// Running without durable storage.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".into(),
            degraded: true,
        }
    }
}
