use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    AppState,
    web::{ApiMessage, json_error},
};

const DEFAULT_LANGUAGE: &str = "de";
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/news", get(list_news))
        .route("/api/news/:id", get(news_detail))
}

#[derive(sqlx::FromRow, Serialize)]
struct NewsItem {
    id: Uuid,
    title: String,
    summary: String,
    body: String,
    category: String,
    language: String,
    source_url: Option<String>,
    published_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct NewsListResponse {
    items: Vec<NewsItem>,
    total: i64,
    page: i64,
    limit: i64,
}

#[derive(Deserialize)]
struct ListParams {
    lang: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// Unknown language codes quietly fall back to German, the app's primary
/// audience, instead of erroring.
fn normalize_language(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim) {
        Some("en") => "en",
        _ => DEFAULT_LANGUAGE,
    }
}

/// Absolute row offset for a page. Saturates instead of overflowing so an
/// absurd page number yields an empty page, not a panic.
fn page_offset(page: i64, limit: i64) -> i64 {
    page.saturating_mul(limit)
}

async fn list_news(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<NewsListResponse>, (StatusCode, Json<ApiMessage>)> {
    let language = normalize_language(params.lang.as_deref());
    let page = params.page.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let pool = state.pool();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_items WHERE language = $1")
        .bind(language)
        .fetch_one(&pool)
        .await
        .map_err(internal_error)?;

    let items = sqlx::query_as::<_, NewsItem>(
        "SELECT id, title, summary, body, category, language, source_url, published_at
         FROM news_items WHERE language = $1
         ORDER BY published_at DESC OFFSET $2 LIMIT $3",
    )
    .bind(language)
    .bind(page_offset(page, limit))
    .bind(limit)
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    Ok(Json(NewsListResponse {
        items,
        total,
        page,
        limit,
    }))
}

async fn news_detail(
    State(state): State<AppState>,
    AxumPath(item_id): AxumPath<Uuid>,
) -> Result<Json<NewsItem>, (StatusCode, Json<ApiMessage>)> {
    let item = sqlx::query_as::<_, NewsItem>(
        "SELECT id, title, summary, body, category, language, source_url, published_at
         FROM news_items WHERE id = $1",
    )
    .bind(item_id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(internal_error)?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Artikel nicht gefunden."))?;

    Ok(Json(item))
}

fn internal_error(err: sqlx::Error) -> (StatusCode, Json<ApiMessage>) {
    error!(?err, "internal error in news module");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Interner Serverfehler. Bitte versuche es später erneut.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_normalization() {
        assert_eq!(normalize_language(Some("de")), "de");
        assert_eq!(normalize_language(Some("en")), "en");
        assert_eq!(normalize_language(Some("fr")), "de");
        assert_eq!(normalize_language(None), "de");
    }

    #[test]
    fn huge_page_numbers_saturate_instead_of_overflowing() {
        assert_eq!(page_offset(2, 20), 40);
        assert_eq!(page_offset(i64::MAX / 2, 20), i64::MAX);
        assert_eq!(page_offset(i64::MAX, i64::MAX), i64::MAX);
    }
}
