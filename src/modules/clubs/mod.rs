use std::collections::BTreeSet;

use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};
use tracing::error;
use uuid::Uuid;

use crate::{
    AppState,
    geo::{self, CityRecord},
    web::{ApiMessage, json_error},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clubs/search", get(search_clubs))
        .route("/api/clubs/:id", get(club_detail))
}

#[derive(sqlx::FromRow, Clone)]
struct ClubRow {
    id: Uuid,
    name: String,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    district: Option<String>,
    status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    membership_status: bool,
    website: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    description: Option<String>,
    additional_info: Option<String>,
}

const CLUB_COLUMNS: &str = "id, name, address, city, postal_code, district, status, latitude, \
     longitude, membership_status, website, contact_email, contact_phone, description, \
     additional_info";

#[derive(Serialize)]
struct ClubResult {
    id: Uuid,
    name: String,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    district: Option<String>,
    status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    membership_status: bool,
    website: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    description: Option<String>,
    additional_info: Option<String>,
    /// Kilometers from the resolved search location. True geodistance when
    /// both sides have coordinates, otherwise a deterministic per-tier
    /// placeholder. Only meaningful within one search response.
    distance_km: f64,
}

#[derive(Serialize)]
struct ClubSearchResponse {
    query: String,
    resolved_city: Option<String>,
    radius_km: Option<f64>,
    total: usize,
    clubs: Vec<ClubResult>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

/// How the search input addresses clubs.
#[derive(Debug, Clone, PartialEq)]
enum QueryKind {
    PostalExact(String),
    PostalPrefix(String),
    City,
}

fn classify_query(query: &str) -> QueryKind {
    let trimmed = query.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        if trimmed.len() == 5 {
            return QueryKind::PostalExact(trimmed.to_string());
        }
        if (2..=4).contains(&trimmed.len()) {
            return QueryKind::PostalPrefix(trimmed.to_string());
        }
    }
    QueryKind::City
}

/// Relation between a club row and the search input. Ordering is the ranking
/// order: better matches sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    PostalExact,
    PostalPrefix,
    CityDirect,
    Neighbor,
    Unrelated,
}

impl MatchTier {
    /// Placeholder distance used when either side lacks coordinates, chosen
    /// so tiers never overlap in the sorted result.
    fn fallback_km(self) -> f64 {
        match self {
            MatchTier::PostalExact => 0.5,
            MatchTier::PostalPrefix => 5.5,
            MatchTier::CityDirect => 5.0,
            MatchTier::Neighbor => 20.0,
            MatchTier::Unrelated => 30.0,
        }
    }
}

/// Everything the scorer needs, resolved once per search.
struct SearchContext {
    kind: QueryKind,
    main_city: Option<&'static CityRecord>,
    direct_terms: BTreeSet<String>,
    neighbor_terms: BTreeSet<String>,
}

impl SearchContext {
    fn build(query: &str) -> Self {
        let kind = classify_query(query);
        let main_city = geo::find_main_city(query).and_then(geo::city);

        let mut direct_terms = BTreeSet::new();
        let mut neighbor_terms = BTreeSet::new();
        if let Some(main) = main_city {
            for alias in main.aliases {
                direct_terms.insert((*alias).to_string());
            }
            for neighbor_key in main.neighbors {
                if let Some(neighbor) = geo::city(neighbor_key) {
                    for alias in neighbor.aliases {
                        neighbor_terms.insert((*alias).to_string());
                    }
                }
            }
        }

        Self {
            kind,
            main_city,
            direct_terms,
            neighbor_terms,
        }
    }
}

fn contains_term(city: &str, term: &str) -> bool {
    city.contains(term) || term.contains(city)
}

/// Ranks one club against the search context and computes its distance.
fn score_club(
    club_city: Option<&str>,
    club_postal: Option<&str>,
    club_lat: Option<f64>,
    club_lon: Option<f64>,
    ctx: &SearchContext,
) -> (MatchTier, f64) {
    let city_lower = club_city.map(|c| c.trim().to_lowercase()).unwrap_or_default();

    let tier = match &ctx.kind {
        QueryKind::PostalExact(code) if club_postal == Some(code.as_str()) => MatchTier::PostalExact,
        QueryKind::PostalExact(code) => {
            if club_postal.is_some_and(|plz| plz.starts_with(&code[..3])) {
                MatchTier::PostalPrefix
            } else {
                city_tier(&city_lower, ctx)
            }
        }
        QueryKind::PostalPrefix(prefix) => {
            if club_postal.is_some_and(|plz| plz.starts_with(prefix.as_str())) {
                MatchTier::PostalPrefix
            } else {
                city_tier(&city_lower, ctx)
            }
        }
        QueryKind::City => city_tier(&city_lower, ctx),
    };

    let distance_km = match (ctx.main_city, club_lat, club_lon) {
        (Some(main), Some(lat), Some(lon)) => geo::haversine_km(main.lat, main.lon, lat, lon),
        _ => tier.fallback_km(),
    };

    (tier, distance_km)
}

fn city_tier(city_lower: &str, ctx: &SearchContext) -> MatchTier {
    if city_lower.is_empty() {
        return MatchTier::Unrelated;
    }
    if ctx
        .direct_terms
        .iter()
        .any(|term| contains_term(city_lower, term))
    {
        return MatchTier::CityDirect;
    }
    if ctx
        .neighbor_terms
        .iter()
        .any(|term| contains_term(city_lower, term))
    {
        return MatchTier::Neighbor;
    }
    MatchTier::Unrelated
}

/// Searches the club directory by city name, alias or postal code.
///
/// Postal input filters on `postal_code` (exact or prefix); everything else
/// becomes an OR-chain of `city ILIKE` predicates across the expanded search
/// terms, which degrades to a plain partial city match when the input
/// resolves to no known city. Results are ranked by match tier, then
/// distance, then name.
async fn search_clubs(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ClubSearchResponse>, (StatusCode, Json<ApiMessage>)> {
    let query = params.q.as_deref().unwrap_or("").trim().to_string();
    if query.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Bitte gib einen Ort oder eine Postleitzahl ein.",
        ));
    }

    let ctx = SearchContext::build(&query);
    let pool = state.pool();

    let rows = fetch_matching_clubs(&pool, &query, &ctx)
        .await
        .map_err(internal_error)?;

    let mut scored: Vec<(MatchTier, ClubResult)> = rows
        .into_iter()
        .map(|row| {
            let (tier, distance_km) = score_club(
                row.city.as_deref(),
                row.postal_code.as_deref(),
                row.latitude,
                row.longitude,
                &ctx,
            );
            (tier, to_result(row, distance_km))
        })
        .collect();

    scored.sort_by(|(tier_a, a), (tier_b, b)| {
        tier_a
            .cmp(tier_b)
            .then_with(|| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });

    let clubs: Vec<ClubResult> = scored.into_iter().map(|(_, club)| club).collect();

    Ok(Json(ClubSearchResponse {
        query,
        resolved_city: ctx.main_city.map(|c| c.key.to_string()),
        radius_km: ctx.main_city.map(|c| c.radius_km),
        total: clubs.len(),
        clubs,
    }))
}

async fn fetch_matching_clubs(
    pool: &PgPool,
    query: &str,
    ctx: &SearchContext,
) -> anyhow::Result<Vec<ClubRow>> {
    let mut builder =
        QueryBuilder::new(format!("SELECT {CLUB_COLUMNS} FROM clubs WHERE "));

    match &ctx.kind {
        QueryKind::PostalExact(code) => {
            builder.push("postal_code = ").push_bind(code.clone());
            builder
                .push(" OR postal_code LIKE ")
                .push_bind(format!("{}%", &code[..3]));
        }
        QueryKind::PostalPrefix(prefix) => {
            builder
                .push("postal_code LIKE ")
                .push_bind(format!("{prefix}%"));
        }
        QueryKind::City => {
            let terms = geo::expanded_search_terms(query);
            let mut first = true;
            for term in terms {
                if !first {
                    builder.push(" OR ");
                }
                builder
                    .push("city ILIKE ")
                    .push_bind(format!("%{}%", escape_like(&term)));
                first = false;
            }
        }
    }

    let rows = builder
        .build_query_as::<ClubRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

fn to_result(row: ClubRow, distance_km: f64) -> ClubResult {
    ClubResult {
        id: row.id,
        name: row.name,
        address: row.address,
        city: row.city,
        postal_code: row.postal_code,
        district: row.district,
        status: row.status,
        latitude: row.latitude,
        longitude: row.longitude,
        membership_status: row.membership_status,
        website: row.website,
        contact_email: row.contact_email,
        contact_phone: row.contact_phone,
        description: row.description,
        additional_info: row.additional_info,
        distance_km: (distance_km * 10.0).round() / 10.0,
    }
}

async fn club_detail(
    State(state): State<AppState>,
    AxumPath(club_id): AxumPath<Uuid>,
) -> Result<Json<ClubResult>, (StatusCode, Json<ApiMessage>)> {
    let row = sqlx::query_as::<_, ClubRow>(&format!(
        "SELECT {CLUB_COLUMNS} FROM clubs WHERE id = $1"
    ))
    .bind(club_id)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(|err| internal_error(err.into()))?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Club nicht gefunden."))?;

    // Detail views have no search location to measure against.
    Ok(Json(to_result(row, 0.0)))
}

/// Escapes LIKE/ILIKE wildcards so user input matches literally.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ApiMessage>) {
    error!(?err, "internal error in clubs module");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Interner Serverfehler. Bitte versuche es später erneut.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_classification() {
        assert_eq!(
            classify_query("50667"),
            QueryKind::PostalExact("50667".to_string())
        );
        assert_eq!(
            classify_query(" 506 "),
            QueryKind::PostalPrefix("506".to_string())
        );
        assert_eq!(classify_query("köln"), QueryKind::City);
        // six digits is not a German postal code, treat as free text
        assert_eq!(classify_query("123456"), QueryKind::City);
    }

    #[test]
    fn city_search_tiers_rank_direct_before_neighbor_before_unrelated() {
        let ctx = SearchContext::build("köln");

        let (direct, _) = score_club(Some("Köln"), None, None, None, &ctx);
        let (neighbor, _) = score_club(Some("Bonn"), None, None, None, &ctx);
        let (unrelated, _) = score_club(Some("Hamburg"), None, None, None, &ctx);

        assert_eq!(direct, MatchTier::CityDirect);
        assert_eq!(neighbor, MatchTier::Neighbor);
        assert_eq!(unrelated, MatchTier::Unrelated);
        assert!(direct < neighbor);
        assert!(neighbor < unrelated);
    }

    #[test]
    fn postal_search_distinguishes_exact_and_prefix() {
        let ctx = SearchContext::build("50667");

        let (exact, km_exact) = score_club(Some("Köln"), Some("50667"), None, None, &ctx);
        let (prefix, km_prefix) = score_club(Some("Köln"), Some("50672"), None, None, &ctx);

        assert_eq!(exact, MatchTier::PostalExact);
        assert_eq!(prefix, MatchTier::PostalPrefix);
        assert!(exact < prefix);
        // fallback distances only apply because the clubs carry no coordinates
        assert!((km_exact - 0.5).abs() < 1e-9);
        assert!((km_prefix - 5.5).abs() < 1e-9);
    }

    #[test]
    fn coordinates_beat_fallback_distances() {
        let ctx = SearchContext::build("köln");
        // club pinned exactly on the Köln centroid
        let (tier, km) = score_club(Some("Köln"), None, Some(50.9375), Some(6.9603), &ctx);
        assert_eq!(tier, MatchTier::CityDirect);
        assert!(km < 0.01, "expected ~0 km, got {km}");
    }

    #[test]
    fn alias_spelling_still_matches_direct_tier() {
        let ctx = SearchContext::build("koeln");
        let (tier, _) = score_club(Some("Köln"), None, None, None, &ctx);
        assert_eq!(tier, MatchTier::CityDirect);
    }

    #[test]
    fn unknown_location_scores_everything_unrelated() {
        let ctx = SearchContext::build("atlantis");
        assert!(ctx.main_city.is_none());
        let (tier, km) = score_club(Some("Köln"), None, Some(50.9), Some(6.9), &ctx);
        assert_eq!(tier, MatchTier::Unrelated);
        // no resolved centroid, so the fallback distance applies
        assert!((km - 30.0).abs() < 1e-9);
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_x"), "50\\%\\_x");
    }
}
