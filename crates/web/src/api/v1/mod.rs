use axum::{routing::on, Router};

use crate::{
    common::{route_not_found, METHOD_FILTER_ALL},
    WebState,
};

mod track;

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .nest_service("/track", track::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}
