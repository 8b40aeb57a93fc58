use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::error::DeckError;
use crate::models::PlaybackSnapshot;
use crate::spotify::PlaybackQuery;

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<PlaybackSnapshot, DeckError>;
}

/// Artist, title and artwork from the player; progress from the streaming
/// service when one is attached.
///
/// Until the service is logged in the snapshot goes out without progress,
/// and the missing login is logged once rather than on every tick.
pub struct PlayerMetadata {
    runner: Arc<dyn CommandRunner>,
    playback: Option<Arc<dyn PlaybackQuery>>,
    signed_out: AtomicBool,
}

impl PlayerMetadata {
    pub fn new(runner: Arc<dyn CommandRunner>, playback: Option<Arc<dyn PlaybackQuery>>) -> Self {
        Self {
            runner,
            playback,
            signed_out: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataSource for PlayerMetadata {
    async fn fetch_snapshot(&self) -> Result<PlaybackSnapshot, DeckError> {
        let artist = self.runner.run(&["metadata", "artist"]).await?;
        let track = self.runner.run(&["metadata", "title"]).await?;
        let artwork = self.runner.run(&["metadata", "mpris:artUrl"]).await?;

        let snapshot = PlaybackSnapshot::new(artist, track, Some(artwork));

        let Some(playback) = &self.playback else {
            return Ok(snapshot);
        };

        match playback.current_progress().await {
            Ok(progress) => {
                if self.signed_out.swap(false, Ordering::Relaxed) {
                    info!("Streaming service authenticated, showing progress");
                }
                Ok(match progress {
                    Some(p) => snapshot.with_progress(p.progress_ms, Some(p.duration_ms)),
                    None => snapshot,
                })
            }
            Err(DeckError::Auth(e)) => {
                if !self.signed_out.swap(true, Ordering::Relaxed) {
                    warn!("Not authenticated, progress hidden until login: {e}");
                }
                Ok(snapshot)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::FakeRunner;
    use crate::spotify::Progress;

    struct FixedProgress(Result<Option<Progress>, fn() -> DeckError>);

    #[async_trait]
    impl PlaybackQuery for FixedProgress {
        async fn current_progress(&self) -> Result<Option<Progress>, DeckError> {
            match &self.0 {
                Ok(p) => Ok(*p),
                Err(make) => Err(make()),
            }
        }
    }

    #[tokio::test]
    async fn test_snapshot_from_player_only() {
        let runner = Arc::new(FakeRunner::with_metadata(
            "Daft Punk",
            "Around the World",
            "file:///tmp/cover.png",
        ));
        let source = PlayerMetadata::new(runner.clone(), None);

        let snap = source.fetch_snapshot().await.unwrap();
        assert_eq!(snap.artist, "Daft Punk");
        assert_eq!(snap.track, "Around the World");
        assert_eq!(snap.artwork.as_deref(), Some("file:///tmp/cover.png"));
        assert_eq!(snap.duration_ms, None);
        assert_eq!(runner.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_art_url_is_absent() {
        let runner = Arc::new(FakeRunner::with_metadata("A", "T", ""));
        let snap = PlayerMetadata::new(runner, None)
            .fetch_snapshot()
            .await
            .unwrap();
        assert_eq!(snap.artwork, None);
    }

    #[tokio::test]
    async fn test_stderr_surfaces_command_error() {
        let runner = Arc::new(FakeRunner::failing("No players found"));
        let err = PlayerMetadata::new(runner, None)
            .fetch_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Command(_)));
    }

    #[tokio::test]
    async fn test_progress_from_streaming_service() {
        let runner = Arc::new(FakeRunner::with_metadata("A", "T", ""));
        let playback = Arc::new(FixedProgress(Ok(Some(Progress {
            progress_ms: 30_000,
            duration_ms: 120_000,
        }))));
        let snap = PlayerMetadata::new(runner, Some(playback))
            .fetch_snapshot()
            .await
            .unwrap();
        assert_eq!(snap.progress_ms, 30_000);
        assert_eq!(snap.duration_ms, Some(120_000));
    }

    #[tokio::test]
    async fn test_missing_token_keeps_player_metadata() {
        let runner = Arc::new(FakeRunner::with_metadata("A", "T", ""));
        let playback = Arc::new(FixedProgress(Err(|| {
            DeckError::Auth("no access token".to_string())
        })));
        let source = PlayerMetadata::new(runner, Some(playback));

        for _ in 0..3 {
            let snap = source.fetch_snapshot().await.unwrap();
            assert_eq!(snap.artist, "A");
            assert_eq!(snap.track, "T");
            assert_eq!(snap.duration_ms, None);
        }
        assert!(source.signed_out.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_service_error_still_fails_fetch() {
        let runner = Arc::new(FakeRunner::with_metadata("A", "T", ""));
        let playback = Arc::new(FixedProgress(Err(|| {
            DeckError::Service("503 Service Unavailable".to_string())
        })));
        let err = PlayerMetadata::new(runner, Some(playback))
            .fetch_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::Service(_)));
    }
}
