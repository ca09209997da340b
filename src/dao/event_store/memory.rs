//! In-process event store. Always available; backs tests and single-node
//! deployments that do not need durability across process restarts.

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::event_store::EventStore;
use crate::dao::models::EventScheduleEntity;
use crate::dao::storage::StorageResult;
use std::sync::Arc;

/// Event store keeping schedules in a concurrent in-process map.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    schedules: Arc<DashMap<String, EventScheduleEntity>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn save_schedule(
        &self,
        room_id: String,
        schedule: EventScheduleEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let schedules = self.schedules.clone();
        Box::pin(async move {
            schedules.insert(room_id, schedule);
            Ok(())
        })
    }

    fn find_schedule(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EventScheduleEntity>>> {
        let schedules = self.schedules.clone();
        Box::pin(async move { Ok(schedules.get(&room_id).map(|entry| entry.value().clone())) })
    }

    fn delete_schedule(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let schedules = self.schedules.clone();
        Box::pin(async move {
            schedules.remove(&room_id);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{RoundEntity, RoundStatusEntity};
    use uuid::Uuid;

    fn schedule() -> EventScheduleEntity {
        EventScheduleEntity {
            rounds: vec![RoundEntity {
                id: Uuid::new_v4(),
                name: "Opening".into(),
                track_pool: Vec::new(),
                status: RoundStatusEntity::Planned,
                started_at: None,
                completed_at: None,
            }],
            active_round_index: None,
        }
    }

    #[tokio::test]
    async fn schedules_round_trip_per_room() {
        let store = MemoryEventStore::new();
        let saved = schedule();

        store
            .save_schedule("room-1".into(), saved.clone())
            .await
            .unwrap();
        let loaded = store.find_schedule("room-1".into()).await.unwrap();
        assert_eq!(loaded, Some(saved));

        assert_eq!(store.find_schedule("room-2".into()).await.unwrap(), None);

        store.delete_schedule("room-1".into()).await.unwrap();
        assert_eq!(store.find_schedule("room-1".into()).await.unwrap(), None);
    }
}
