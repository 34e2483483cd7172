//! # CLI Module
//!
//! User-facing commands of sporlstats. Each command opens the local store,
//! delegates to the sync engine or the insights generator and renders the
//! result as tables, colored status lines or JSON.
//!
//! ## Commands
//!
//! - [`auth`] - Authorize a Spotify account through the PKCE flow
//! - [`users`] - List the accounts with a stored credential
//! - [`sync`] - Pull recent plays, top item snapshots and audio features
//! - [`insights`] - Print basic or detailed listening insights
//!
//! ## Usage Patterns
//!
//! ```bash
//! sporlstats auth                      # Authorize an account
//! sporlstats sync                      # Sync the only stored account
//! sporlstats sync --user alice --plays-only
//! sporlstats insights --detailed       # All statistics as tables
//! sporlstats insights --json           # Machine readable output
//! ```
//!
//! When exactly one account is stored, `--user` may be omitted.
//!
//! Fatal failures are printed with the `error!` macro, which exits the process.

mod auth;
mod insights;
mod sync;
mod users;

pub use auth::auth;
pub use insights::insights;
pub use sync::{SyncScope, sync};
pub use users::users;

use crate::{
    config::Settings,
    error::{Error, Result},
    store::{ListeningStore, credentials},
};

fn open_store(settings: &Settings) -> Result<ListeningStore> {
    ListeningStore::open(&settings.database_path)
}

/// Picks the account a command acts on.
///
/// An explicit id must have a stored credential. Without one the only stored
/// account is used; zero or several stored accounts are an error.
fn resolve_user(store: &ListeningStore, requested: Option<String>) -> Result<String> {
    let stored = store.read(credentials::list)?;

    if let Some(user_id) = requested {
        return if stored.iter().any(|c| c.user_id == user_id) {
            Ok(user_id)
        } else {
            Err(Error::NotAuthenticated { user_id })
        };
    }

    match stored.as_slice() {
        [only] => Ok(only.user_id.clone()),
        [] => Err(Error::Config(
            "no authorized account found, run `sporlstats auth` first".to_string(),
        )),
        _ => Err(Error::Config(format!(
            "{} accounts are authorized, choose one with --user",
            stored.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::testing::make_credential;

    fn store_with_users(users: &[&str]) -> ListeningStore {
        let store = ListeningStore::open_in_memory().unwrap();
        for user in users {
            store
                .write(|tx| credentials::upsert(tx, &make_credential(user, "token", Utc::now())))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_single_account_is_default() {
        let store = store_with_users(&["alice"]);
        assert_eq!(resolve_user(&store, None).unwrap(), "alice");
    }

    #[test]
    fn test_ambiguous_or_missing_account() {
        let store = store_with_users(&[]);
        assert!(matches!(resolve_user(&store, None), Err(Error::Config(_))));

        let store = store_with_users(&["alice", "bob"]);
        assert!(matches!(resolve_user(&store, None), Err(Error::Config(_))));
        assert_eq!(resolve_user(&store, Some("bob".to_string())).unwrap(), "bob");
    }

    #[test]
    fn test_unknown_account_is_not_authenticated() {
        let store = store_with_users(&["alice"]);
        let err = resolve_user(&store, Some("mallory".to_string())).unwrap_err();
        assert!(err.requires_reauth());
    }
}
