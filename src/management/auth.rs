use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    spotify::auth::TokenEndpoint,
    store::{ListeningStore, credentials},
    types::Credential,
};

/// Tokens expiring within this many seconds are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Keeps stored access tokens valid.
///
/// Refreshes are serialized per user with one async lock per user id, so
/// concurrent callers for the same user observe a single refresh while
/// unrelated users never wait on each other. The lock is the only one held
/// across a network call.
pub struct CredentialManager {
    store: ListeningStore,
    endpoint: Arc<dyn TokenEndpoint>,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(store: ListeningStore, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        CredentialManager {
            store,
            endpoint,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    fn load(&self, user_id: &str) -> Result<Credential> {
        self.store
            .read(|conn| credentials::load(conn, user_id))?
            .ok_or_else(|| Error::NotAuthenticated {
                user_id: user_id.to_string(),
            })
    }

    /// Returns an access token that stays valid for at least [`REFRESH_MARGIN_SECS`].
    ///
    /// # Errors
    ///
    /// - `Error::NotAuthenticated` if the user never authorized
    /// - `Error::CredentialExpired` if Spotify rejected the refresh exchange;
    ///   the stored credential is left untouched and the user must run
    ///   `sporlstats auth` again
    pub async fn get_valid_token(&self, user_id: &str) -> Result<String> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        // Read under the lock: a caller that waited here sees the refreshed row.
        let credential = self.load(user_id)?;
        if credential.expires_at > Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) {
            return Ok(credential.access_token);
        }

        debug!(
            "Access token for {} expires at {}, refreshing",
            user_id, credential.expires_at
        );
        self.refresh(&credential).await
    }

    /// Refreshes after Spotify rejected `rejected_token` with a 401.
    ///
    /// If the stored token already differs from the rejected one another
    /// caller refreshed in the meantime and the stored token is returned
    /// without a second exchange.
    pub async fn force_refresh(&self, user_id: &str, rejected_token: &str) -> Result<String> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let credential = self.load(user_id)?;
        if credential.access_token != rejected_token {
            debug!("Token for {} was already refreshed, reusing it", user_id);
            return Ok(credential.access_token);
        }

        self.refresh(&credential).await
    }

    async fn refresh(&self, credential: &Credential) -> Result<String> {
        let grant = match self.endpoint.refresh(&credential.refresh_token).await {
            Ok(grant) => grant,
            // Outages say nothing about the refresh token itself.
            Err(e @ Error::ExternalApiUnavailable { .. }) => return Err(e),
            Err(e @ Error::ExternalApi { status, .. }) if status >= 500 || status == 429 => {
                return Err(e);
            }
            Err(e) => {
                warn!("Refresh exchange for {} rejected: {}", credential.user_id, e);
                return Err(Error::CredentialExpired {
                    user_id: credential.user_id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let expires_at = Utc::now() + Duration::seconds(grant.expires_in);
        let updated = self.store.write(|tx| {
            credentials::replace_tokens(
                tx,
                &credential.user_id,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
            )
        })?;
        if updated == 0 {
            return Err(Error::NotAuthenticated {
                user_id: credential.user_id.clone(),
            });
        }

        info!(
            "Refreshed access token for {} (valid until {})",
            credential.user_id, expires_at
        );
        Ok(grant.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTokenEndpoint, make_credential};

    fn manager_with(
        expires_in: Duration,
        endpoint: Arc<FakeTokenEndpoint>,
    ) -> (CredentialManager, ListeningStore) {
        let store = ListeningStore::open_in_memory().unwrap();
        let credential = make_credential("user1", "access-old", Utc::now() + expires_in);
        store
            .write(|tx| credentials::upsert(tx, &credential))
            .unwrap();
        (CredentialManager::new(store.clone(), endpoint), store)
    }

    #[tokio::test]
    async fn test_token_four_minutes_from_expiry_is_refreshed_once() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new"));
        let (manager, store) = manager_with(Duration::minutes(4), endpoint.clone());

        let token = manager.get_valid_token("user1").await.unwrap();
        assert_eq!(token, "access-new");
        assert_eq!(endpoint.calls(), 1);

        let stored = store
            .read(|conn| credentials::load(conn, "user1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "access-new");
        assert!(stored.expires_at > Utc::now() + Duration::minutes(55));

        // Now fresh, so no further exchange.
        manager.get_valid_token("user1").await.unwrap();
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_token_ten_minutes_from_expiry_is_not_refreshed() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new"));
        let (manager, _store) = manager_with(Duration::minutes(10), endpoint.clone());

        let token = manager.get_valid_token("user1").await.unwrap();
        assert_eq!(token, "access-old");
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new").with_delay_ms(50));
        let (manager, _store) = manager_with(Duration::seconds(-30), endpoint.clone());
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_valid_token("user1").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "access-new");
        }
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_credential_expired_and_keeps_row() {
        let endpoint = Arc::new(FakeTokenEndpoint::failing());
        let (manager, store) = manager_with(Duration::minutes(1), endpoint.clone());

        let err = manager.get_valid_token("user1").await.unwrap_err();
        assert!(matches!(err, Error::CredentialExpired { .. }));
        assert!(err.requires_reauth());

        let stored = store
            .read(|conn| credentials::load(conn, "user1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "access-old");
        assert_eq!(stored.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn test_provider_outage_is_retryable_not_expired() {
        let endpoint = Arc::new(FakeTokenEndpoint::failing_with(503));
        let (manager, _store) = manager_with(Duration::minutes(1), endpoint.clone());

        let err = manager.get_valid_token("user1").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.requires_reauth());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new").rotating("refresh-2"));
        let (manager, store) = manager_with(Duration::minutes(1), endpoint.clone());

        manager.get_valid_token("user1").await.unwrap();

        let stored = store
            .read(|conn| credentials::load(conn, "user1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn test_force_refresh_reuses_token_refreshed_elsewhere() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new"));
        let (manager, _store) = manager_with(Duration::hours(1), endpoint.clone());

        let token = manager.force_refresh("user1", "access-old").await.unwrap();
        assert_eq!(token, "access-new");
        assert_eq!(endpoint.calls(), 1);

        // A second caller that was also rejected with the old token.
        let token = manager.force_refresh("user1", "access-old").await.unwrap();
        assert_eq!(token, "access-new");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_authenticated() {
        let endpoint = Arc::new(FakeTokenEndpoint::new("access-new"));
        let (manager, _store) = manager_with(Duration::hours(1), endpoint.clone());

        let err = manager.get_valid_token("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated { .. }));
        assert_eq!(endpoint.calls(), 0);
    }
}
