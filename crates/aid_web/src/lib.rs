use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;


pub use auth::{DevTokenVerifier, Identity, IdentityVerifier};
pub use state::AppState;

pub async fn create_app(state: AppState) -> Router {
    // The SPA is served from a different origin.
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/digests", get(handlers::list_digests))
        .route("/api/digests/personalized", get(handlers::personalized_digests))
        .route("/api/digests/stats", get(handlers::stats))
        .route("/api/digests/categories/list", get(handlers::list_categories))
        .route("/api/digests/sources/list", get(handlers::list_sources))
        .route("/api/digests/tags/list", get(handlers::list_tags))
        .route("/api/digests/:id", get(handlers::get_digest))
        .route(
            "/api/user/profile",
            get(handlers::get_profile).post(handlers::update_profile),
        )
        .route(
            "/api/user/preferences",
            get(handlers::get_preferences).patch(handlers::update_preferences),
        )
        .route(
            "/api/user/history",
            get(handlers::get_history).post(handlers::add_history),
        )
        .layer(cors)
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use crate::auth::{Identity, IdentityVerifier};
    pub use crate::AppState;
    pub use aid_core::{Digest, Error, Result, UserProfile};
}
