use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use crate::models::PlaybackSnapshot;

/// Somewhere to announce what is playing.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn publish(&self, snapshot: &PlaybackSnapshot);
}

/// Announces track changes on the log. Repeats of the same track are dropped.
#[derive(Default)]
pub struct LogPresence {
    last: Mutex<Option<(String, String)>>,
}

impl LogPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `snapshot` differs from the last announced track.
    fn changed(&self, snapshot: &PlaybackSnapshot) -> bool {
        let current = (snapshot.artist.clone(), snapshot.track.clone());
        let mut last = self.last.lock().unwrap();
        if last.as_ref() == Some(&current) {
            return false;
        }
        *last = Some(current);
        true
    }
}

#[async_trait]
impl PresenceSink for LogPresence {
    async fn publish(&self, snapshot: &PlaybackSnapshot) {
        if self.changed(snapshot) {
            info!(artist = %snapshot.artist, track = %snapshot.track, "Now playing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_track_changes_are_announced() {
        let presence = LogPresence::new();
        let a = PlaybackSnapshot::new("Air".into(), "La femme d'argent".into(), None);
        let later = a.clone().with_progress(10_000, Some(400_000));
        let b = PlaybackSnapshot::new("Air".into(), "Sexy Boy".into(), None);

        assert!(presence.changed(&a));
        assert!(!presence.changed(&later));
        assert!(presence.changed(&b));
        assert!(presence.changed(&a));
    }
}
