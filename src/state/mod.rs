//! Shared application state: the room registry, storage slot, SSE hubs, and
//! configuration.

pub mod card;
pub mod claim;
pub mod pattern;
pub mod room;
pub mod room_phase;
pub mod rounds;
mod sse;
pub mod sync;

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::event_store::EventStore,
    error::ServiceError,
    services::track_provider::SharedTrackProvider,
    state::room::{RoomHandle, spawn_room},
};

pub use self::sse::SseHub;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing the room registry, storage handle, and
/// broadcast hubs. Rooms own their mutable game state; this type only owns
/// what is global to the process.
pub struct AppState {
    config: AppConfig,
    event_store: RwLock<Option<Arc<dyn EventStore>>>,
    sse: sse::SseState,
    rooms: DashMap<String, RoomHandle>,
    provider: SharedTrackProvider,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, provider: SharedTrackProvider) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let sse = sse::SseState::new(config.public_sse_capacity, config.host_sse_capacity);
        Arc::new(Self {
            config,
            event_store: RwLock::new(None),
            sse,
            rooms: DashMap::new(),
            provider,
            degraded: degraded_tx,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the configured track provider.
    pub fn provider(&self) -> SharedTrackProvider {
        self.provider.clone()
    }

    /// Obtain a handle to the current event store, if one is installed.
    pub async fn event_store(&self) -> Option<Arc<dyn EventStore>> {
        let guard = self.event_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current event store, or the degraded-mode error.
    pub async fn require_event_store(&self) -> Result<Arc<dyn EventStore>, ServiceError> {
        self.event_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new event store implementation and leave degraded mode.
    pub async fn install_event_store(&self, store: Arc<dyn EventStore>) {
        {
            let mut guard = self.event_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current event store and enter degraded mode.
    pub async fn clear_event_store(&self) {
        {
            let mut guard = self.event_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.event_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if self.is_degraded().await == value {
            return;
        }

        let _ = self.degraded.send(value);
    }

    /// Broadcast hub used for the public spectator SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Broadcast hub used for the host SSE stream.
    pub fn host_sse(&self) -> &SseHub {
        self.sse.host().hub()
    }

    /// Token guard that ensures a single host SSE console at a time.
    pub fn host_token(&self) -> &Mutex<Option<String>> {
        self.sse.host().token()
    }

    /// Look up an already-running room.
    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Fetch the room task for `room_id`, spawning it (and restoring its
    /// persisted schedule) when it does not exist yet.
    pub async fn ensure_room(self: &Arc<Self>, room_id: &str) -> RoomHandle {
        if let Some(handle) = self.room(room_id) {
            return handle;
        }

        // Load outside the map lock; the entry check below settles races.
        let restored = match self.event_store().await {
            Some(store) => match store.find_schedule(room_id.to_string()).await {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(room_id, error = %err, "failed to load persisted schedule");
                    None
                }
            },
            None => None,
        };

        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let handle = spawn_room(room_id.to_string(), self.clone(), restored);
                entry.insert(handle.clone());
                handle
            }
        }
    }
}
