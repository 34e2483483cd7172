use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::decode_response;
use crate::{
    config::Settings,
    error::{Error, Result},
    server::start_api_server,
    store::{ListeningStore, credentials},
    types::{Credential, PkceToken, TokenGrant, UserProfile},
    utils, warning,
};

/// How long the handshake waits for the browser to hit the callback.
const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Exchanges a refresh token for a new access token.
///
/// This is the only network dependency of the credential lifecycle, kept
/// behind a trait so the lifecycle can be exercised without Spotify.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// The Spotify accounts service token endpoint.
///
/// When a client secret is configured requests authenticate with HTTP Basic;
/// otherwise the public PKCE client form with `client_id` is sent.
pub struct SpotifyTokenEndpoint {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl SpotifyTokenEndpoint {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            http: super::http_client(settings)?,
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        })
    }

    /// Exchanges an authorization code plus PKCE verifier for the initial token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        self.post(vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn post<'a>(&'a self, mut form: Vec<(&'a str, &'a str)>) -> Result<TokenGrant> {
        let mut request = self.http.post(&self.token_url);
        match &self.client_secret {
            Some(secret) => request = request.basic_auth(&self.client_id, Some(secret)),
            None => form.push(("client_id", self.client_id.as_str())),
        }

        let response = request.form(&form).send().await.map_err(|source| {
            Error::ExternalApiUnavailable {
                endpoint: self.token_url.clone(),
                source,
            }
        })?;
        decode_response(&self.token_url, response).await
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        debug!("Requesting token refresh from {}", self.token_url);
        self.post(vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

/// Runs the OAuth 2.0 PKCE authorization flow and stores the resulting credential.
///
/// 1. Generates the code verifier and its SHA256 challenge
/// 2. Starts the local callback server
/// 3. Opens the authorization URL in the default browser
/// 4. Waits for the callback to exchange the code
/// 5. Reads `/me` to learn which Spotify user granted access
/// 6. Upserts the credential keyed by that user id
///
/// Authorizing an already stored user replaces their token pair.
pub async fn authorize(settings: Arc<Settings>, store: &ListeningStore) -> Result<Credential> {
    let code_verifier = utils::generate_code_verifier();
    let code_challenge = utils::generate_code_challenge(&code_verifier);

    let shared_state: Arc<Mutex<Option<PkceToken>>> = Arc::new(Mutex::new(Some(PkceToken {
        code_verifier,
        grant: None,
    })));

    let endpoint = Arc::new(SpotifyTokenEndpoint::new(&settings)?);
    let server_state = Arc::clone(&shared_state);
    let server_settings = Arc::clone(&settings);
    let server_endpoint = Arc::clone(&endpoint);
    let server = tokio::spawn(async move {
        if let Err(e) = start_api_server(server_settings, server_endpoint, server_state).await {
            warn!("Callback server stopped: {}", e);
        }
    });

    let auth_url = authorization_url(&settings, &code_challenge)?;
    if webbrowser::open(auth_url.as_str()).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }

    let grant = wait_for_grant(shared_state, AUTHORIZE_TIMEOUT).await;
    server.abort();
    let grant = grant.ok_or_else(|| {
        Error::AuthorizationIncomplete("timed out waiting for the callback".to_string())
    })?;

    let refresh_token = grant.refresh_token.clone().ok_or_else(|| {
        Error::AuthorizationIncomplete("token response carried no refresh token".to_string())
    })?;

    let http = super::http_client(&settings)?;
    let profile = fetch_profile(&http, &settings.api_url, &grant.access_token).await?;

    let credential = Credential {
        user_id: profile.id,
        display_name: profile.display_name,
        email: profile.email,
        access_token: grant.access_token,
        refresh_token,
        expires_at: Utc::now() + chrono::Duration::seconds(grant.expires_in),
    };
    store.write(|tx| credentials::upsert(tx, &credential))?;
    info!("Stored credential for user {}", credential.user_id);

    Ok(credential)
}

/// Builds the authorize URL with every parameter properly encoded.
pub fn authorization_url(settings: &Settings, code_challenge: &str) -> Result<Url> {
    Url::parse_with_params(
        &settings.auth_url,
        &[
            ("client_id", settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
            ("scope", settings.scope.as_str()),
        ],
    )
    .map_err(|e| Error::Config(format!("SPOTIFY_API_AUTH_URL: {}", e)))
}

/// Reads the profile of the user an access token belongs to.
pub async fn fetch_profile(http: &Client, api_url: &str, access_token: &str) -> Result<UserProfile> {
    let endpoint = "/me";
    let response = http
        .get(format!("{}{}", api_url, endpoint))
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|source| Error::ExternalApiUnavailable {
            endpoint: endpoint.to_string(),
            source,
        })?;
    decode_response(endpoint, response).await
}

/// Polls the shared state until the callback stored a grant or `max_wait` elapsed.
async fn wait_for_grant(
    shared_state: Arc<Mutex<Option<PkceToken>>>,
    max_wait: Duration,
) -> Option<TokenGrant> {
    use std::time::Instant;

    let start = Instant::now();

    while start.elapsed() < max_wait {
        let lock = shared_state.lock().await;
        if let Some(grant) = lock.as_ref().and_then(|pkce| pkce.grant.clone()) {
            return Some(grant);
        }
        drop(lock);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    None
}
