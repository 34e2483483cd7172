use tracing::{info, warn};

use super::SyncManager;
use crate::{
    error::Result,
    store::rankings,
    types::{TimeRange, TopArtistEntry, TopItemsReport, TopTrackEntry, WindowReport},
};

impl SyncManager {
    /// Replaces the stored top artists and tracks for every ranking window.
    ///
    /// Windows are independent: each one is fetched and then replaced in its
    /// own transaction, so a window that fails keeps its previous snapshot
    /// and does not affect the others. Failures are listed in the report.
    /// Errors that require authorizing again abort the whole call.
    pub async fn sync_top_items(&self) -> Result<TopItemsReport> {
        let mut report = TopItemsReport::default();

        for window in TimeRange::ALL {
            match self.sync_window(window).await {
                Ok(window_report) => report.windows.push(window_report),
                Err(e) if e.requires_reauth() => return Err(e),
                Err(e) => {
                    warn!("Top items for {} not replaced: {}", window, e);
                    report.windows.push(WindowReport {
                        window,
                        artists: 0,
                        tracks: 0,
                        features_added: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn sync_window(&self, window: TimeRange) -> Result<WindowReport> {
        let artists = self.api.top_artists(window, self.top_limit, 0).await?;
        let tracks = self.api.top_tracks(window, self.top_limit, 0).await?;

        // Rank is the 1-based position in the response, also for skipped entries.
        let artist_entries: Vec<TopArtistEntry> = artists
            .items
            .into_iter()
            .enumerate()
            .map(|(i, artist)| TopArtistEntry {
                user_id: self.user_id.clone(),
                artist_id: artist.id,
                artist_name: artist.name,
                term: window,
                rank: i as u32 + 1,
                genres: artist.genres,
                popularity: artist.popularity,
            })
            .collect();

        let track_entries: Vec<TopTrackEntry> = tracks
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(i, track)| {
                let track_id = track.id.clone().filter(|id| !id.is_empty())?;
                let artist = track.primary_artist();
                Some(TopTrackEntry {
                    user_id: self.user_id.clone(),
                    track_id,
                    artist_id: artist.and_then(|a| a.id.clone()).unwrap_or_default(),
                    artist_name: artist.map(|a| a.name.clone()).unwrap_or_default(),
                    album_id: track.album.id.clone().unwrap_or_default(),
                    album_name: track.album.name.clone(),
                    track_name: track.name,
                    term: window,
                    rank: i as u32 + 1,
                    popularity: track.popularity,
                })
            })
            .collect();

        let (artist_count, track_count) = self.store.write(|tx| {
            let artists =
                rankings::replace_top_artists(tx, &self.user_id, window, &artist_entries)?;
            let tracks = rankings::replace_top_tracks(tx, &self.user_id, window, &track_entries)?;
            Ok((artists, tracks))
        })?;
        info!(
            "Replaced {} top artists and {} top tracks for {} ({})",
            artist_count, track_count, self.user_id, window
        );

        let track_ids: Vec<String> = track_entries.into_iter().map(|t| t.track_id).collect();
        let features_added = match self.ensure_features(&track_ids).await {
            Ok(added) => added,
            Err(e) => {
                warn!("Audio features for {} top tracks not fetched: {}", window, e);
                0
            }
        };

        Ok(WindowReport {
            window,
            artists: artist_count,
            tracks: track_count,
            features_added,
            error: None,
        })
    }
}
