use std::sync::Arc;

use salvo::conn::TcpListener;
use salvo::{Listener, Server};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

use kunai_app::app::routes;
use kunai_app::state::AppState;
use kunai_core::config::load_config;
use kunai_service::directory::{DirectoryUser, StaticDirectory};
use kunai_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true).with_file(true).with_line_number(true))
        .init();

    tracing::info!("Starting kunai CalDAV/CardDAV server");

    let config = load_config()?;

    tracing::info!(config = ?config.server, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    // The standalone deployment runs on the in-memory store and a static
    // directory; production deployments swap these for real backends
    // behind the same traits.
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let directory = Arc::new(StaticDirectory::new());
    if let Some(single) = &config.auth.single_user {
        let dn = format!("uid={},ou=users,dc=local", single.name);
        directory.add_user(
            DirectoryUser::new(&single.name, &dn, Some(&single.email)),
            &single.password,
        );
        tracing::info!(user = %single.name, "Seeded single-user account");
    }

    let state = AppState::new(config.clone(), Arc::clone(&store), directory);

    spawn_retention_task(
        Arc::clone(&store),
        u64::from(config.dav.scheduling_retention_days),
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let acceptor = TcpListener::new(bind_addr.clone()).bind().await;

    let router = routes(state);

    tracing::info!("Server listening on {bind_addr}");

    Server::new(acceptor).serve(router).await;

    Ok(())
}

/// Periodically drops scheduling objects, attendee responses, and
/// free-busy cache entries older than the retention window.
fn spawn_retention_task(store: Arc<dyn Store>, retention_days: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now()
                - chrono::TimeDelta::days(i64::try_from(retention_days).unwrap_or(7));
            for (what, purged) in [
                (
                    "scheduling objects",
                    store.purge_scheduling_objects_before(cutoff).await,
                ),
                (
                    "attendee responses",
                    store.purge_attendee_responses_before(cutoff).await,
                ),
                (
                    "free-busy cache entries",
                    store.purge_free_busy_cache_before(cutoff).await,
                ),
            ] {
                match purged {
                    Ok(count) if count > 0 => tracing::info!(count, what, "retention purge"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, what, "retention purge failed"),
                }
            }
        }
    });
}
