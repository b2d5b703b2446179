mod auth;
mod chains;
mod error;
mod recent;
mod transfers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, delete, get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

use ibc_history_core::registry::StaticChainRegistry;
use ibc_history_core::IbcHistoryService;

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub service: Arc<IbcHistoryService>,
    pub registry: Arc<StaticChainRegistry>,
    pub api_token: String,
}

type SharedState = Arc<AppState>;

/// Signed txs are small; anything larger is a mistake or abuse.
const SUBMIT_BODY_LIMIT: usize = 256 * 1024;

// ==============================================================================
// Router
// ==============================================================================

pub fn build_router(state: AppState, origin: &str) -> Router {
    // Reflect the origin only on an exact match so browsers get a clean
    // CORS rejection otherwise.
    let allowed: axum::http::HeaderValue = origin.parse().expect("valid origin header value");
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate({
            let allowed = allowed.clone();
            move |request_origin: &axum::http::HeaderValue, _| *request_origin == allowed
        }))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::HeaderName::from_static(auth::API_TOKEN_HEADER),
        ]);

    let shared = Arc::new(state);

    let public_api = Router::new().route("/api/v1/health", get(health));

    let submit_routes = Router::new()
        .route(
            "/api/v1/transfers",
            get(transfers::list_transfers)
                .post(transfers::submit_transfer)
                .delete(transfers::clear_transfers),
        )
        .route("/api/v1/swaps", post(transfers::submit_swap))
        .layer(DefaultBodyLimit::max(SUBMIT_BODY_LIMIT));

    let protected_api = Router::new()
        .route(
            "/api/v1/transfers/{id}",
            get(transfers::get_transfer).delete(transfers::delete_transfer),
        )
        .route("/api/v1/recent/{chain_id}/{kind}", get(recent::list_recent))
        .route("/api/v1/chains/{chain_id}", delete(chains::remove_chain))
        .merge(submit_routes);

    Router::new()
        .merge(public_api)
        .merge(protected_api)
        .route("/api", any(api_not_found))
        .route("/api/{*path}", any(api_not_found))
        .layer(cors)
        .with_state(shared)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn api_not_found() -> error::AppError {
    error::AppError::NotFound("API route not found".to_string())
}
