//! # API Module
//!
//! HTTP endpoints of the short-lived local server that runs during
//! `sporlstats auth`.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the authorization code from Spotify's redirect and
//!   exchanges it, together with the PKCE verifier, for the initial token pair.
//! - [`health`] - Returns status and version, handy to check the callback
//!   address is reachable before authorizing.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Extension, Router, routing::get};
//! use sporlstats::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback).layer(Extension(state)))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::{CallbackState, callback};
pub use health::health;
