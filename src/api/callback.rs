use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{spotify::auth::SpotifyTokenEndpoint, types::PkceToken};

/// Everything the callback needs to finish the code exchange.
#[derive(Clone)]
pub struct CallbackState {
    pub endpoint: Arc<SpotifyTokenEndpoint>,
    pub redirect_uri: String,
    pub pkce: Arc<Mutex<Option<PkceToken>>>,
}

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<CallbackState>,
) -> Html<&'static str> {
    if let Some(error) = params.get("error") {
        warn!("Authorization denied: {}", error);
        return Html("<h4>Authorization denied.</h4>");
    }

    let Some(code) = params.get("code") else {
        return Html("<h4>Missing authorization code.</h4>");
    };

    // The verifier is copied out so the lock is not held during the exchange.
    let verifier = match state.pkce.lock().await.as_ref() {
        Some(pkce) => pkce.code_verifier.clone(),
        None => return Html("<h4>Missing PKCE code verifier.</h4>"),
    };

    match state
        .endpoint
        .exchange_code(code, &verifier, &state.redirect_uri)
        .await
    {
        Ok(grant) => {
            if let Some(pkce) = state.pkce.lock().await.as_mut() {
                pkce.grant = Some(grant);
            }
            Html("<h2>Authentication successful.</h2><p>You can close this browser window.</p>")
        }
        Err(e) => {
            warn!("Token exchange failed: {}", e);
            Html("<h4>Login failed.</h4>")
        }
    }
}
