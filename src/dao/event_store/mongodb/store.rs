//! The MongoDB store implementation and its connection lifecycle.

use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::MongoScheduleDocument,
};
use crate::dao::{
    event_store::EventStore, models::EventScheduleEntity, storage::StorageResult,
};

const SCHEDULE_COLLECTION_NAME: &str = "event_schedules";

/// MongoDB-backed event store. Cheap to clone; the connection state is shared.
#[derive(Clone)]
pub struct MongoEventStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoEventStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"updated_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("schedule_updated_at_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCHEDULE_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoScheduleDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoScheduleDocument>(SCHEDULE_COLLECTION_NAME)
    }

    async fn save_schedule(
        &self,
        room_id: String,
        schedule: EventScheduleEntity,
    ) -> MongoResult<()> {
        let document = MongoScheduleDocument::from_entity(room_id.clone(), schedule);
        let collection = self.collection().await;
        collection
            .replace_one(doc! {"_id": &room_id}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSchedule { room_id, source })?;
        Ok(())
    }

    async fn find_schedule(&self, room_id: String) -> MongoResult<Option<EventScheduleEntity>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc! {"_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::LoadSchedule { room_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn delete_schedule(&self, room_id: String) -> MongoResult<()> {
        let collection = self.collection().await;
        collection
            .delete_one(doc! {"_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::DeleteSchedule { room_id, source })?;
        Ok(())
    }
}

impl EventStore for MongoEventStore {
    fn save_schedule(
        &self,
        room_id: String,
        schedule: EventScheduleEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_schedule(room_id, schedule)
                .await
                .map_err(Into::into)
        })
    }

    fn find_schedule(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EventScheduleEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_schedule(room_id).await.map_err(Into::into) })
    }

    fn delete_schedule(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_schedule(room_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
