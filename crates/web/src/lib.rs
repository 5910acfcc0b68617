pub use crate::common::RouteResult;

use axum::{extract::FromRef, routing::on, Router};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracking::TrackerHandle;

use crate::common::{route_not_found, METHOD_FILTER_ALL};

pub mod api;
pub mod common;

#[derive(Clone, FromRef)]
pub struct WebState {
    pub tracker: TrackerHandle,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .nest_service("/api", api::routes(state))
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

pub async fn start_web_server<A: ToSocketAddrs>(state: WebState, addr: A) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: WebState) -> std::io::Result<()> {
    log::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state).into_make_service()).await?;

    Ok(())
}
