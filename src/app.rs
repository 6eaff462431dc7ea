use std::sync::Arc;

use axum::http::Method;
use axum::{middleware, Router};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{pipeline, PipelineState};
use crate::errors::{AppError, AppResult};
use crate::events::{init_event_bus, start_audit_writer, EventBus};
use crate::jwt::JwtConfig;
use crate::registry::{compile, ControllerRegistry, HandlerBindings};
use crate::routes;
use crate::store::{DirectoryStore, SessionStore, SqlStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        let store = Arc::new(SqlStore::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            sessions: store.clone(),
            directory: store,
            event_bus,
        }
    }
}

/// Build the application: register every controller, compile the dispatch
/// table, and layer the request pipeline over it.
///
/// A compile failure is fatal and aborts startup; a half-wired
/// authorization table must never serve traffic.
pub async fn create_app(pool: SqlitePool) -> AppResult<Router> {
    let jwt = JwtConfig::from_env()?;
    let (event_bus, audit_rx) = init_event_bus();
    tokio::spawn(start_audit_writer(audit_rx, pool.clone()));

    let state = AppState::new(pool, jwt, event_bus);

    let mut registry = ControllerRegistry::new();
    let mut bindings = HandlerBindings::new();
    routes::register_all(&mut registry, &mut bindings);

    let (router, table) =
        compile(registry, bindings).map_err(|err| AppError::configuration(err.to_string()))?;

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    let pipeline_state = PipelineState {
        app: state.clone(),
        table,
    };

    let router = router
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(pipeline_state, pipeline))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

async fn not_found() -> AppError {
    AppError::not_found("resource not found")
}
