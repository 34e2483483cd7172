use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::SyncManager;
use crate::{
    error::Result,
    spotify::RECENTLY_PLAYED_LIMIT,
    store::plays,
    types::{PlayEvent, PlayHistoryItem, PlaySyncReport},
    utils,
};

impl SyncManager {
    /// Pulls plays newer than the stored watermark and stores the new ones.
    ///
    /// Plays are deduplicated on `(user, track, played_at)` against the store
    /// and within the fetched page, then inserted in one transaction: either
    /// the whole page lands or nothing does. Audio features are then ensured
    /// for the inserted tracks; a failure there is reported but does not undo
    /// the committed plays.
    pub async fn sync_recent_plays(&self) -> Result<PlaySyncReport> {
        let watermark = self
            .store
            .read(|conn| plays::latest_played_at(conn, &self.user_id))?;
        debug!("Play watermark for {}: {:?}", self.user_id, watermark);

        let page = self
            .api
            .recently_played(
                watermark.map(|w| w.timestamp_millis()),
                RECENTLY_PLAYED_LIMIT,
            )
            .await?;

        let mut report = PlaySyncReport::default();
        let mut candidates = Vec::with_capacity(page.items.len());
        for item in page.items {
            match self.play_event(item) {
                Some(play) => candidates.push(play),
                None => report.skipped_malformed += 1,
            }
        }

        let (inserted, duplicates) = self.store.write(|tx| {
            let mut seen = HashSet::new();
            let mut inserted = Vec::new();
            let mut duplicates = 0;
            for play in candidates {
                let key = play.key();
                if !seen.insert(key.clone()) || plays::exists(tx, &key)? {
                    duplicates += 1;
                    continue;
                }
                plays::insert(tx, &play)?;
                inserted.push(play);
            }
            Ok((inserted, duplicates))
        })?;

        report.inserted = inserted.len();
        report.skipped_duplicates = duplicates;
        info!(
            "Stored {} new plays for {} ({} duplicates, {} malformed)",
            report.inserted, self.user_id, report.skipped_duplicates, report.skipped_malformed
        );

        if !inserted.is_empty() {
            let track_ids: Vec<String> = inserted.into_iter().map(|p| p.track_id).collect();
            match self.ensure_features(&track_ids).await {
                Ok(added) => report.features_added = added,
                Err(e) => {
                    warn!("Plays stored but audio features were not fetched: {}", e);
                    report.enrichment_error = Some(e.to_string());
                }
            }
        }

        Ok(report)
    }

    /// `None` for entries without a track id or with an unreadable timestamp.
    fn play_event(&self, item: PlayHistoryItem) -> Option<PlayEvent> {
        let track = item.track?;
        let track_id = track.id.clone().filter(|id| !id.is_empty())?;
        let played_at = utils::parse_played_at(&item.played_at)?;
        let artist = track.primary_artist();

        Some(PlayEvent {
            user_id: self.user_id.clone(),
            track_id,
            artist_id: artist.and_then(|a| a.id.clone()).unwrap_or_default(),
            artist_name: artist.map(|a| a.name.clone()).unwrap_or_default(),
            album_id: track.album.id.clone().unwrap_or_default(),
            album_name: track.album.name.clone(),
            track_name: track.name,
            played_at,
            duration_ms: track.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::DateTime;

    use super::*;
    use crate::{
        store::{ListeningStore, features},
        testing::{FakeSpotifyApi, make_features, make_history_item},
        types::Track,
    };

    fn setup() -> (Arc<FakeSpotifyApi>, ListeningStore, SyncManager) {
        let api = Arc::new(FakeSpotifyApi::default());
        let store = ListeningStore::open_in_memory().unwrap();
        let manager = SyncManager::new(store.clone(), api.clone(), "user1", 50);
        (api, store, manager)
    }

    #[tokio::test]
    async fn test_second_sync_without_new_data_inserts_nothing() {
        let (api, store, manager) = setup();
        api.set_recent(vec![
            make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z"),
            make_history_item("t2", "a1", "2024-05-01T10:05:00.000Z"),
            make_history_item("t3", "a2", "2024-05-01T10:10:00.000Z"),
        ]);

        let first = manager.sync_recent_plays().await.unwrap();
        assert_eq!(first.inserted, 3);

        let second = manager.sync_recent_plays().await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, 3);
        assert_eq!(store.read(|conn| plays::count(conn, "user1")).unwrap(), 3);

        let cursors = api.recent_after.lock().unwrap().clone();
        let expected = DateTime::parse_from_rfc3339("2024-05-01T10:10:00Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(cursors, vec![None, Some(expected)]);
    }

    #[tokio::test]
    async fn test_overlap_within_one_page_is_inserted_once() {
        let (api, store, manager) = setup();
        api.set_recent(vec![
            make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z"),
            make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z"),
            // Same track at a different time is a separate play.
            make_history_item("t1", "a1", "2024-05-01T11:00:00.000Z"),
        ]);

        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(store.read(|conn| plays::count(conn, "user1")).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let (api, store, manager) = setup();
        let mut no_id = make_history_item("t9", "a1", "2024-05-01T09:00:00.000Z");
        no_id.track = Some(Track {
            id: None,
            ..no_id.track.unwrap()
        });
        let mut no_track = make_history_item("t8", "a1", "2024-05-01T09:00:00.000Z");
        no_track.track = None;
        let bad_time = make_history_item("t7", "a1", "yesterday");

        api.set_recent(vec![
            no_id,
            no_track,
            bad_time,
            make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z"),
        ]);

        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped_malformed, 3);

        let stored = store.read(|conn| plays::list(conn, "user1")).unwrap();
        assert_eq!(stored[0].track_id, "t1");
        assert_eq!(stored[0].artist_id, "a1");
        assert_eq!(stored[0].album_name, "Album a1");
    }

    #[tokio::test]
    async fn test_empty_page_is_not_an_error() {
        let (_api, _store, manager) = setup();
        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report, PlaySyncReport::default());
    }

    #[tokio::test]
    async fn test_features_fetched_for_new_tracks_only() {
        let (api, store, manager) = setup();
        api.add_features(make_features("t1", 0.9, 0.9, 0.9));
        api.add_features(make_features("t2", 0.1, 0.1, 0.1));
        api.set_recent(vec![make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z")]);

        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report.features_added, 1);

        api.set_recent(vec![
            make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z"),
            make_history_item("t2", "a1", "2024-05-01T10:30:00.000Z"),
            make_history_item("t1", "a1", "2024-05-01T11:00:00.000Z"),
        ]);
        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.features_added, 1);

        assert_eq!(api.requested_feature_ids(), vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(store.read(features::count).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_committed_plays() {
        let (api, store, manager) = setup();
        *api.fail_features.lock().unwrap() = true;
        api.set_recent(vec![make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z")]);

        let report = manager.sync_recent_plays().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert!(report.enrichment_error.is_some());
        assert_eq!(store.read(|conn| plays::count(conn, "user1")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_stores_nothing() {
        let (api, store, manager) = setup();
        *api.fail_auth.lock().unwrap() = true;
        api.set_recent(vec![make_history_item("t1", "a1", "2024-05-01T10:00:00.000Z")]);

        let err = manager.sync_recent_plays().await.unwrap_err();
        assert!(err.requires_reauth());
        assert_eq!(store.read(|conn| plays::count(conn, "user1")).unwrap(), 0);
    }
}
