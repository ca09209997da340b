use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{EventScheduleEntity, RoundEntity, RoundStatusEntity, TrackRefEntity};

/// Persisted document: one per room, keyed by the room identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScheduleDocument {
    #[serde(rename = "_id")]
    pub room_id: String,
    pub rounds: Vec<MongoRoundDocument>,
    pub active_round_index: Option<usize>,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoundDocument {
    pub id: Uuid,
    pub name: String,
    pub track_pool: Vec<TrackRefEntity>,
    pub status: RoundStatusEntity,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
}

impl MongoScheduleDocument {
    pub fn from_entity(room_id: String, schedule: EventScheduleEntity) -> Self {
        Self {
            room_id,
            rounds: schedule.rounds.into_iter().map(Into::into).collect(),
            active_round_index: schedule.active_round_index,
            updated_at: DateTime::now(),
        }
    }
}

impl From<MongoScheduleDocument> for EventScheduleEntity {
    fn from(document: MongoScheduleDocument) -> Self {
        Self {
            rounds: document.rounds.into_iter().map(Into::into).collect(),
            active_round_index: document.active_round_index,
        }
    }
}

impl From<RoundEntity> for MongoRoundDocument {
    fn from(entity: RoundEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            track_pool: entity.track_pool,
            status: entity.status,
            started_at: entity.started_at.map(DateTime::from_system_time),
            completed_at: entity.completed_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoRoundDocument> for RoundEntity {
    fn from(document: MongoRoundDocument) -> Self {
        Self {
            id: document.id,
            name: document.name,
            track_pool: document.track_pool,
            status: document.status,
            started_at: document.started_at.map(|at| at.to_system_time()),
            completed_at: document.completed_at.map(|at| at.to_system_time()),
        }
    }
}
