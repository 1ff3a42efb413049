use std::sync::Arc;

use clipsync_lib::clipboard::monitor::ClipboardMonitor;
use clipsync_lib::commands::CommandRouter;
use clipsync_lib::config::Config;
use clipsync_lib::identity::session::SessionIdentityProvider;
use clipsync_lib::logging;
use clipsync_lib::storage::database::Database;
use clipsync_lib::sync::api_client::ApiClient;
use clipsync_lib::sync::engine::SyncEngine;
use clipsync_lib::sync::http_channel::HttpHistoryChannel;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");
    logging::init(&config.data_dir);
    log::info!("Sync server: {}", config.server_url);

    let db = Arc::new(Database::new(&config.data_dir).expect("failed to open database"));
    if let Err(e) = db.set_history_limit(config.history_limit) {
        log::warn!("Failed to apply history limit: {}", e);
    }

    let api = ApiClient::new(&config.server_url);
    let identity = Arc::new(SessionIdentityProvider::new(api.clone(), db.clone()));
    // Without a server the engine runs local-only until an identity shows up
    if let Err(e) = identity.ensure_identity().await {
        log::error!("Sign-in failed: {}", e);
    }

    let engine = SyncEngine::start(
        db.clone(),
        Arc::new(HttpHistoryChannel::new(api)),
        identity.clone(),
    )
    .await
    .expect("failed to load local history");

    let monitor = Arc::new(ClipboardMonitor::new(config.poll_interval));
    let _capture = monitor.start(db.clone());
    let router = CommandRouter::new(engine.clone(), monitor);

    let mut states = engine.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                let counts = router.counts();
                log::info!(
                    "Status {:?}: {} entries ({} links, {} favorites){}",
                    state.sync_status,
                    counts.all,
                    counts.links,
                    counts.favorites,
                    state
                        .last_error
                        .as_ref()
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default()
                );
            }
            _ = &mut ctrl_c => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    engine.shutdown();
}
