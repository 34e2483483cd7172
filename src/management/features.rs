use tracing::{debug, info};

use super::SyncManager;
use crate::{error::Result, store::features, types::AudioFeatures, utils};

impl SyncManager {
    /// Makes sure every track in `track_ids` has stored audio features.
    ///
    /// Only ids without a stored descriptor are requested. Descriptors are
    /// written once and never updated; tracks Spotify has no complete
    /// descriptor for are skipped and asked for again on a later sync.
    /// Returns the number of descriptors added.
    pub async fn ensure_features(&self, track_ids: &[String]) -> Result<usize> {
        let wanted = utils::dedup_ids(track_ids.iter().filter(|id| !id.is_empty()).cloned());
        let present = self
            .store
            .read(|conn| features::existing_ids(conn, &wanted))?;
        let missing: Vec<String> = wanted
            .into_iter()
            .filter(|id| !present.contains(id))
            .collect();

        if missing.is_empty() {
            debug!("Audio features already cached for all requested tracks");
            return Ok(0);
        }

        let usable: Vec<AudioFeatures> = self
            .api
            .audio_features(&missing)
            .await?
            .into_iter()
            .flatten()
            .collect();

        let added = self.store.write(|tx| {
            let mut added = 0;
            for descriptor in &usable {
                if features::insert_if_absent(tx, descriptor)? {
                    added += 1;
                }
            }
            Ok(added)
        })?;

        info!(
            "Cached audio features for {} of {} new tracks",
            added,
            missing.len()
        );
        Ok(added)
    }
}
