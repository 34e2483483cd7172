//! Credential lifecycle and ingestion of remote listening data.
//!
//! [`CredentialManager`] keeps one user's access token valid. [`SyncManager`]
//! pulls recently played tracks, top item snapshots and audio features for one
//! user and writes them to the [`ListeningStore`]. Every sync step is
//! idempotent, so a failed sync is retried by simply running it again.

mod auth;
mod features;
mod plays;
mod rankings;

pub use auth::{CredentialManager, REFRESH_MARGIN_SECS};

use std::sync::Arc;

use tracing::info;

use crate::{
    error::Result,
    spotify::SpotifyApi,
    store::ListeningStore,
    types::SyncReport,
};

/// Runs the ingestion steps for one user against one API client.
pub struct SyncManager {
    store: ListeningStore,
    api: Arc<dyn SpotifyApi>,
    user_id: String,
    top_limit: u32,
}

impl SyncManager {
    pub fn new(
        store: ListeningStore,
        api: Arc<dyn SpotifyApi>,
        user_id: impl Into<String>,
        top_limit: u32,
    ) -> Self {
        SyncManager {
            store,
            api,
            user_id: user_id.into(),
            top_limit,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Syncs recent plays, then the top item snapshots.
    ///
    /// Stops at the first error that is fatal to the whole sync, such as an
    /// expired credential. A failing ranking window is reported, not raised.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let plays = self.sync_recent_plays().await?;
        let top_items = self.sync_top_items().await?;
        info!(
            "Sync for {} finished: {} new plays, {} of {} windows replaced",
            self.user_id,
            plays.inserted,
            top_items.windows.iter().filter(|w| w.error.is_none()).count(),
            top_items.windows.len()
        );
        Ok(SyncReport { plays, top_items })
    }
}
