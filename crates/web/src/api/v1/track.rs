use std::convert::Infallible;

use axum::{
    extract::{OriginalUri, Query, State},
    http::Method,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, on, put},
    Json, Router,
};
use axum_extra::TypedHeader;
use model::{DeviceId, LocationSample, TrackSnapshot};
use serde::Deserialize;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt as _};
use tower_http::trace::TraceLayer;
use tracking::locator::DEVICE_QUERY_KEY;

use crate::{
    common::{route_not_found, schema, RouteErrorResponse, RouteResult, METHOD_FILTER_ALL},
    WebState,
};

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/", get(snapshot))
        .route("/current", get(current))
        .route("/history", get(history))
        .route("/live", get(live))
        .route("/schema", get(schema::<TrackSnapshot>))
        .route("/device", put(set_device).post(relocate).delete(close))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

async fn snapshot(State(WebState { tracker }): State<WebState>) -> Json<TrackSnapshot> {
    Json(tracker.snapshot())
}

async fn current(State(WebState { tracker }): State<WebState>) -> Json<LocationSample> {
    Json(tracker.snapshot().track.current().clone())
}

async fn history(State(WebState { tracker }): State<WebState>) -> Json<Vec<LocationSample>> {
    Json(tracker.snapshot().track.history().to_vec())
}

/// Pushes the full snapshot whenever it changes, starting with the current one.
async fn live(
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    State(WebState { tracker }): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    match user_agent {
        Some(TypedHeader(user_agent)) => log::info!("`{}` connected", user_agent.as_str()),
        None => log::info!("anonymous live client connected"),
    }

    let stream = WatchStream::new(tracker.subscribe()).filter_map(|snapshot| {
        match Event::default().json_data(&snapshot) {
            Ok(event) => Some(Ok(event)),
            Err(why) => {
                log::error!("could not encode snapshot: {}", why);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct DeviceQuery {
    #[serde(rename = "imei")]
    device: Option<String>,
}

async fn set_device(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { tracker }): State<WebState>,
    Query(params): Query<DeviceQuery>,
) -> RouteResult<Json<TrackSnapshot>> {
    let device = params.device.and_then(DeviceId::new).ok_or_else(|| {
        RouteErrorResponse::bad_request(&Method::PUT, original_uri.path()).with_detailed_information(
            format!("Expected a non-empty `{}` query parameter.", DEVICE_QUERY_KEY),
        )
    })?;

    tracker.set_device(Some(device)).await.map_err(|why| {
        RouteErrorResponse::from(why)
            .with_method(&Method::PUT)
            .with_uri(original_uri.path())
    })?;
    Ok(Json(tracker.snapshot()))
}

/// Asks the configured locator for the device again.
async fn relocate(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { tracker }): State<WebState>,
) -> RouteResult<Json<TrackSnapshot>> {
    tracker.relocate().await.map_err(|why| {
        RouteErrorResponse::from(why)
            .with_method(&Method::POST)
            .with_uri(original_uri.path())
    })?;
    Ok(Json(tracker.snapshot()))
}

async fn close(
    OriginalUri(original_uri): OriginalUri,
    State(WebState { tracker }): State<WebState>,
) -> RouteResult<Json<TrackSnapshot>> {
    tracker.close().await.map_err(|why| {
        RouteErrorResponse::from(why)
            .with_method(&Method::DELETE)
            .with_uri(original_uri.path())
    })?;
    Ok(Json(tracker.snapshot()))
}
