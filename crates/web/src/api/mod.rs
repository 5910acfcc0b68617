use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, on},
    Json, Router,
};
use serde_json::json;

pub mod v1;

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    WebState,
};

pub fn routes(state: WebState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .with_state(state.clone())
        .nest_service("/v1", v1::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

/// Liveness check that also reports the tracker's session state.
async fn ping(State(WebState { tracker }): State<WebState>) -> impl IntoResponse {
    Json(json!({
        "message": "pong!",
        "session": tracker.snapshot().session,
    }))
}
