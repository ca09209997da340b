//! Catalog/playback provider boundary.
//!
//! The real provider (track search, OAuth, device selection, volume) lives
//! outside this service; the core only ever talks through this object-safe
//! trait and re-injects results as room commands.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::state::card::TrackRef;

/// Shared handle to the configured provider implementation.
pub type SharedTrackProvider = Arc<dyn TrackProvider>;

/// Errors surfaced by the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider could not serve the request.
    #[error("track provider unavailable: {0}")]
    Unavailable(String),
    /// A pool reference did not resolve to any tracks.
    #[error("unknown pool ref `{0}`")]
    UnknownPoolRef(String),
}

/// Abstraction over the audio-catalog/playback-device collaborator. Device
/// selection and auth are the provider's own concern and never leak in here.
pub trait TrackProvider: Send + Sync {
    /// Resolve pool references (playlists, mixes) into playable tracks.
    fn list_playable_tracks(
        &self,
        pool_refs: Vec<String>,
    ) -> BoxFuture<'static, Result<Vec<TrackRef>, ProviderError>>;
    /// Start playing a clip on the provider's active device.
    fn start_clip(&self, clip_id: String) -> BoxFuture<'static, Result<(), ProviderError>>;
    /// Stop playback on the provider's active device.
    fn stop_clip(&self) -> BoxFuture<'static, Result<(), ProviderError>>;
    /// Nudge the provider to resume interrupted playback.
    fn resume_playback(&self) -> BoxFuture<'static, Result<(), ProviderError>>;
}

/// Drop duplicate clip IDs while preserving first-seen order, finalizing a
/// deduplicated pool the card generator can rely on.
pub fn dedup_tracks(tracks: Vec<TrackRef>) -> Vec<TrackRef> {
    let mut seen = std::collections::HashSet::new();
    tracks
        .into_iter()
        .filter(|track| seen.insert(track.clip_id.clone()))
        .collect()
}

/// Provider used when no real integration is configured: playback commands
/// succeed as no-ops and the catalog is empty.
#[derive(Debug, Default)]
pub struct NullTrackProvider;

impl TrackProvider for NullTrackProvider {
    fn list_playable_tracks(
        &self,
        pool_refs: Vec<String>,
    ) -> BoxFuture<'static, Result<Vec<TrackRef>, ProviderError>> {
        Box::pin(async move {
            match pool_refs.into_iter().next() {
                Some(first) => Err(ProviderError::UnknownPoolRef(first)),
                None => Ok(Vec::new()),
            }
        })
    }

    fn start_clip(&self, _clip_id: String) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }

    fn stop_clip(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }

    fn resume_playback(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }
}

/// In-process provider backed by a fixed catalog, keyed by pool ref. Used by
/// tests and local demos.
#[derive(Debug, Default)]
pub struct StaticCatalogProvider {
    pools: HashMap<String, Vec<TrackRef>>,
}

impl StaticCatalogProvider {
    /// Build a provider serving the given pools.
    pub fn with_pools(pools: HashMap<String, Vec<TrackRef>>) -> Self {
        Self { pools }
    }
}

impl TrackProvider for StaticCatalogProvider {
    fn list_playable_tracks(
        &self,
        pool_refs: Vec<String>,
    ) -> BoxFuture<'static, Result<Vec<TrackRef>, ProviderError>> {
        let mut resolved = Vec::new();
        let mut missing = None;
        for pool_ref in pool_refs {
            match self.pools.get(&pool_ref) {
                Some(tracks) => resolved.extend(tracks.iter().cloned()),
                None => {
                    missing = Some(pool_ref);
                    break;
                }
            }
        }
        Box::pin(async move {
            match missing {
                Some(pool_ref) => Err(ProviderError::UnknownPoolRef(pool_ref)),
                None => Ok(resolved),
            }
        })
    }

    fn start_clip(&self, _clip_id: String) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }

    fn stop_clip(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }

    fn resume_playback(&self) -> BoxFuture<'static, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> TrackRef {
        TrackRef {
            clip_id: id.into(),
            title: format!("Title {id}"),
            artist: format!("Artist {id}"),
        }
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let tracks = vec![track("a"), track("b"), track("a"), track("c"), track("b")];
        let deduped = dedup_tracks(tracks);
        let ids: Vec<&str> = deduped.iter().map(|t| t.clip_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn static_catalog_resolves_and_rejects() {
        let provider = StaticCatalogProvider::with_pools(HashMap::from([(
            "eighties".to_string(),
            vec![track("a"), track("b")],
        )]));

        let tracks = provider
            .list_playable_tracks(vec!["eighties".into()])
            .await
            .unwrap();
        assert_eq!(tracks.len(), 2);

        let err = provider
            .list_playable_tracks(vec!["nineties".into()])
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnknownPoolRef("nineties".into()));
    }
}
