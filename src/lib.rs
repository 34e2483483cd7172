//! Spotify Listening Insights Library
//!
//! This library keeps a local copy of a user's Spotify listening activity and
//! derives statistics from it. It includes modules for API communication,
//! credential lifecycle, incremental and snapshot ingestion, local persistence
//! and the insights computed over the stored history.
//!
//! # Modules
//!
//! - `api` - HTTP API endpoints for the local callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - Typed errors shared by the sync and insights engine
//! - `insights` - Read-only statistics over the stored listening history
//! - `management` - Credential lifecycle and ingestion of remote data
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Spotify Web API client implementation
//! - `store` - SQLite persistence for credentials, plays, rankings and features
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use sporlstats::{config::Settings, insights::InsightsGenerator, store::ListeningStore};
//!
//! #[tokio::main]
//! async fn main() -> sporlstats::Result<()> {
//!     let settings = Settings::load().await?;
//!     let store = ListeningStore::open(&settings.database_path)?;
//!     let insights = InsightsGenerator::new(store, "spotify-user-id").get_basic_insights()?;
//!     println!("{} plays", insights.total_tracks_listened);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod insights;
pub mod management;
pub mod server;
pub mod spotify;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Starting authentication process...");
/// info!("Found {} plays", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// Used to provide positive feedback when operations complete successfully.
///
/// # Example
///
/// ```
/// success!("Authentication completed successfully");
/// success!("Stored {} new plays", count);
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits with status 1.
///
/// Only for command-level failures; library code returns [`Error`] instead.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable issues, such as a ranking window that failed to sync
/// while the others succeeded.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
