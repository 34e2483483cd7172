use axum::{Extension, Router, routing::get};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::sync::Mutex;

use crate::{
    api::{self, CallbackState},
    config::Settings,
    error::{Error, Result},
    spotify::auth::SpotifyTokenEndpoint,
    types::PkceToken,
};

pub async fn start_api_server(
    settings: Arc<Settings>,
    endpoint: Arc<SpotifyTokenEndpoint>,
    pkce: Arc<Mutex<Option<PkceToken>>>,
) -> Result<()> {
    let state = CallbackState {
        endpoint,
        redirect_uri: settings.redirect_uri.clone(),
        pkce,
    };

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback).layer(Extension(state)));

    let addr = SocketAddr::from_str(&settings.server_addr)
        .map_err(|e| Error::Config(format!("SERVER_ADDRESS {}: {}", settings.server_addr, e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("Cannot bind callback server to {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Config(format!("Callback server failed: {}", e)))
}
