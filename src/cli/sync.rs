use std::sync::Arc;

use tabled::Table;

use crate::{
    config::Settings,
    error,
    error::{Error, Result},
    info,
    management::{CredentialManager, SyncManager},
    spotify::{SpotifyClient, auth::SpotifyTokenEndpoint},
    success,
    types::{PlaySyncReport, StatTableRow, TopItemsReport},
    utils, warning,
};

use super::{open_store, resolve_user};

/// Which ingestion steps a sync runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    All,
    PlaysOnly,
    TopOnly,
}

/// Syncs one account and prints what changed.
pub async fn sync(settings: Arc<Settings>, user: Option<String>, scope: SyncScope) {
    let manager = match build_manager(&settings, user) {
        Ok(manager) => manager,
        Err(e) => error!("Cannot prepare sync. Err: {}", e),
    };
    info!("Syncing listening data for {}", manager.user_id());

    match scope {
        SyncScope::All => {
            let pb = utils::spinner("Fetching recent plays and top items...");
            let result = manager.sync_all().await;
            pb.finish_and_clear();
            match result {
                Ok(report) => {
                    print_plays(&report.plays);
                    print_top_items(&report.top_items);
                }
                Err(e) => fail("Cannot sync", e),
            }
        }
        SyncScope::PlaysOnly => {
            let pb = utils::spinner("Fetching recently played tracks...");
            let result = manager.sync_recent_plays().await;
            pb.finish_and_clear();
            match result {
                Ok(report) => print_plays(&report),
                Err(e) => fail("Cannot sync recent plays", e),
            }
        }
        SyncScope::TopOnly => {
            let pb = utils::spinner("Replacing top artists and tracks...");
            let result = manager.sync_top_items().await;
            pb.finish_and_clear();
            match result {
                Ok(report) => print_top_items(&report),
                Err(e) => fail("Cannot sync top items", e),
            }
        }
    }
}

fn fail(context: &str, e: Error) -> ! {
    if e.requires_reauth() {
        error!("{}. Run `sporlstats auth` to authorize again", e)
    }
    error!("{}. Err: {}", context, e)
}

fn build_manager(settings: &Settings, user: Option<String>) -> Result<SyncManager> {
    let store = open_store(settings)?;
    let user_id = resolve_user(&store, user)?;

    let endpoint = Arc::new(SpotifyTokenEndpoint::new(settings)?);
    let credentials = Arc::new(CredentialManager::new(store.clone(), endpoint));
    let client = SpotifyClient::new(settings, credentials, user_id.clone())?;

    Ok(SyncManager::new(
        store,
        Arc::new(client),
        user_id,
        settings.top_limit,
    ))
}

fn print_plays(report: &PlaySyncReport) {
    success!("Stored {} new plays", report.inserted);

    let rows = vec![
        StatTableRow {
            stat: "New plays".to_string(),
            value: report.inserted.to_string(),
        },
        StatTableRow {
            stat: "Already stored".to_string(),
            value: report.skipped_duplicates.to_string(),
        },
        StatTableRow {
            stat: "Malformed entries".to_string(),
            value: report.skipped_malformed.to_string(),
        },
        StatTableRow {
            stat: "Audio features added".to_string(),
            value: report.features_added.to_string(),
        },
    ];
    println!("{}", Table::new(rows));

    if let Some(reason) = &report.enrichment_error {
        warning!(
            "Audio features were not fetched, the next sync tries again. Err: {}",
            reason
        );
    }
}

fn print_top_items(report: &TopItemsReport) {
    let rows: Vec<StatTableRow> = report
        .windows
        .iter()
        .map(|w| StatTableRow {
            stat: w.window.to_string(),
            value: match &w.error {
                Some(_) => "failed, previous snapshot kept".to_string(),
                None => format!(
                    "{} artists, {} tracks, {} new audio features",
                    w.artists, w.tracks, w.features_added
                ),
            },
        })
        .collect();
    println!("{}", Table::new(rows));

    for window in &report.windows {
        if let Some(reason) = &window.error {
            warning!("Top items for {} were not replaced. Err: {}", window.window, reason);
        }
    }

    if report.is_complete() {
        success!("Replaced top items for all {} windows", report.windows.len());
    }
}
