use std::sync::Arc;

use crate::{config::Settings, error, info, spotify, success};

use super::open_store;

/// Runs the browser authorization and stores the resulting credential.
///
/// Authorizing an account that is already stored replaces its tokens.
pub async fn auth(settings: Arc<Settings>) {
    let store = match open_store(&settings) {
        Ok(store) => store,
        Err(e) => error!("Cannot open store. Err: {}", e),
    };

    info!(
        "Waiting for Spotify authorization on {}",
        settings.redirect_uri
    );
    match spotify::auth::authorize(Arc::clone(&settings), &store).await {
        Ok(credential) => success!(
            "Authorized {} ({})",
            credential
                .display_name
                .as_deref()
                .unwrap_or(&credential.user_id),
            credential.user_id
        ),
        Err(e) => error!("Authorization failed. Err: {}", e),
    }
}
