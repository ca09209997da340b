//! Persisted entity shapes shared by every storage backend.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Round lifecycle status as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatusEntity {
    /// Created but not yet configured.
    Unplanned,
    /// Track pool assigned.
    Planned,
    /// Currently being played.
    Active,
    /// Finished.
    Completed,
}

/// A playable track reference as persisted inside a round's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRefEntity {
    /// Stable catalog identifier for the clip.
    pub clip_id: String,
    /// Display title.
    pub title: String,
    /// Display artist.
    pub artist: String,
}

/// One round of an event as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEntity {
    /// Stable identifier of the round.
    pub id: Uuid,
    /// Display name chosen by the host.
    pub name: String,
    /// Finalized track pool for the round.
    pub track_pool: Vec<TrackRefEntity>,
    /// Lifecycle status.
    pub status: RoundStatusEntity,
    /// When the round went active.
    pub started_at: Option<SystemTime>,
    /// When the round completed.
    pub completed_at: Option<SystemTime>,
}

/// The per-room event schedule as persisted: the one piece of state that must
/// survive a full client reload without losing progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScheduleEntity {
    /// Rounds in event order.
    pub rounds: Vec<RoundEntity>,
    /// Index of the active round, if any.
    pub active_round_index: Option<usize>,
}
