use std::env;

use sse::SseTransport;
use tracking::{
    FileCache, FixedLocator, Locator, QueryLocator, Reducer, SessionManager, TrackerConfig,
    TrackerHandle,
};
use web::{start_web_server, WebState};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = TrackerConfig::from_env().expect("expected valid tracker config in env.");
    let listen_addr =
        env::var("TRACKER_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_owned());

    // tracker
    let tracker = match (&config.device, &config.page_url) {
        (None, Some(page_url)) => {
            let locator = QueryLocator::new(page_url.clone());
            spawn_tracker(&config, locator).await
        }
        _ => spawn_tracker(&config, FixedLocator::new(config.initial_device())).await,
    };

    // web server
    let web_future = start_web_server(
        WebState {
            tracker: tracker.clone(),
        },
        listen_addr,
    );

    tokio::select! {
        result = web_future => {
            if let Err(why) = result {
                log::error!("web server stopped: {}", why);
            }
        }
        _ = tokio::signal::ctrl_c() => log::info!("shutting down"),
    }

    if let Err(why) = tracker.close().await {
        log::warn!("could not close tracker: {}", why);
    }
}

async fn spawn_tracker<L: Locator>(config: &TrackerConfig, locator: L) -> TrackerHandle {
    let cache = FileCache::new(config.cache_path.clone(), config.cache_key.clone());
    SessionManager::new(
        config.session.clone(),
        Reducer::new(config.reducer.clone()),
        SseTransport::new(),
        cache,
        locator,
    )
    .start()
    .await
}
