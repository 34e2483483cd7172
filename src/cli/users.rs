use chrono::Utc;
use tabled::Table;

use crate::{
    config::Settings, error, store::credentials, types::UserTableRow, utils, warning,
};

use super::open_store;

/// Lists the accounts that have a stored credential.
pub async fn users(settings: &Settings) {
    let store = match open_store(settings) {
        Ok(store) => store,
        Err(e) => error!("Cannot open store. Err: {}", e),
    };

    let stored = match store.read(credentials::list) {
        Ok(stored) => stored,
        Err(e) => error!("Cannot load credentials. Err: {}", e),
    };

    if stored.is_empty() {
        warning!("No authorized account found. Run `sporlstats auth` first");
        return;
    }

    let now = Utc::now();
    let rows: Vec<UserTableRow> = stored
        .into_iter()
        .map(|c| UserTableRow {
            token_expires: if c.expires_at <= now {
                "expired, refreshed on next sync".to_string()
            } else {
                utils::format_timestamp(c.expires_at)
            },
            name: c.display_name.unwrap_or_default(),
            user: c.user_id,
        })
        .collect();

    println!("{}", Table::new(rows));
}
