//! Persistence abstraction for per-room event schedules.

mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

pub use memory::MemoryEventStore;

use futures::future::BoxFuture;

use crate::dao::models::EventScheduleEntity;
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for room event schedules.
pub trait EventStore: Send + Sync {
    /// Persist the schedule for `room_id`, replacing any previous value.
    fn save_schedule(
        &self,
        room_id: String,
        schedule: EventScheduleEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load the schedule persisted for `room_id`, if any.
    fn find_schedule(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EventScheduleEntity>>>;
    /// Remove the schedule persisted for `room_id`.
    fn delete_schedule(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
