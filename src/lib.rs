use crate::config::SessionConfig;
use crate::persistence::session_table::SessionTable;
use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::from_fn_with_state;
use sqlx::PgPool;
use std::sync::Arc;
use tower::Layer;
use tower::util::{MapRequest, MapRequestLayer};

pub mod api;
pub mod app_env;
pub mod config;
pub mod db;
pub mod domain;
pub mod dto;
pub mod external_connections;
pub mod logging;
pub mod persistence;
pub mod routing_utils;

/// Application state shared by every request
pub struct SharedData {
    pub ext_cxn: persistence::ExternalConnectivity,
    pub sessions: SessionTable,
    pub session_config: SessionConfig,
}

impl SharedData {
    pub fn new(db: PgPool, session_config: SessionConfig) -> Self {
        SharedData {
            ext_cxn: persistence::ExternalConnectivity::new(db),
            sessions: SessionTable::new(),
            session_config,
        }
    }
}

pub type AppState = State<Arc<SharedData>>;

/// The complete HTTP service: the router wrapped in the method override
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// Builds the service handed to the HTTP server
pub fn build_app(shared_data: Arc<SharedData>) -> App {
    // Overrides must happen before routing, so this can't be one of the router's own layers
    MapRequestLayer::new(routing_utils::method_override as fn(Request) -> Request)
        .layer(build_router(shared_data))
}

/// Assembles every route of the app. Todo routes sit behind the authentication gate; everything
/// sits behind the session layer and request tracing.
pub fn build_router(shared_data: Arc<SharedData>) -> Router {
    let protected_routes = api::todo::todo_routes().route_layer(from_fn_with_state(
        shared_data.clone(),
        api::session::require_authentication,
    ));

    let router = Router::new()
        .merge(api::auth::auth_routes())
        .merge(protected_routes)
        .layer(from_fn_with_state(
            shared_data.clone(),
            api::session::session_layer,
        ))
        .with_state(shared_data);

    logging::attach_tracing_http(router)
}
