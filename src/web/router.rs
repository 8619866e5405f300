use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use crate::{
    modules,
    web::{AppState, auth, profile},
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/profile", get(profile::profile))
        .route("/api/profile/preferences", put(profile::update_preferences))
        .merge(modules::clubs::router())
        .merge(modules::strains::router())
        .merge(modules::journal::router())
        .merge(modules::news::router())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
