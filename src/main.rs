use std::sync::Arc;

use groovelink::{
    common::{
        banner::{BannerInfo, print_banner},
        logger,
        types::AnyResult,
    },
    configs::Config,
    notify::{LogNotifier, TracingActivitySink},
    server::{AppState, Collaborators},
    sources::YtDlpResolver,
    storage::MemoryPlaylistStore,
    transport,
    voice::HeadlessPlatform,
};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);
    print_banner(&BannerInfo::default());

    let collaborators = Collaborators {
        platform: Arc::new(HeadlessPlatform::new()),
        resolver: Arc::new(YtDlpResolver::new(&config.resolver)),
        notifier: Arc::new(LogNotifier::default()),
        activity: Arc::new(TracingActivitySink),
        playlists: Arc::new(MemoryPlaylistStore::new()),
    };
    let state = AppState::new(config, collaborators);
    let sweeper = state.spawn_token_sweeper();

    let listener = transport::http_server::bind(&state.config.server).await?;
    info!("Sync gateway listening on {}", listener.local_addr()?);

    let app = transport::http_server::router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    state.shutdown();
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
