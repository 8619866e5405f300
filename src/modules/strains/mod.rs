use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tokio::fs as tokio_fs;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    AppState,
    imaging::build_strain_prompt,
    web::{
        ApiMessage, JobSubmission, json_error,
        auth::{self, JsonAuthError},
    },
};

const STORAGE_ROOT: &str = "storage/strains";
const STATUS_PENDING: &str = "pending";
const STATUS_PROCESSING: &str = "processing";
const STATUS_COMPLETED: &str = "completed";
const STATUS_FAILED: &str = "failed";

const EFFECT_SLOTS: usize = 3;
const UNKNOWN_EFFECT: &str = "Unknown";

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 50;

const STRAIN_COLUMNS: &str = "id, unique_identifier, name, strain_type, thc_level, \
     most_common_terpene, description, top_effect, top_percent, second_effect, \
     second_percent, third_effect, third_percent, effects_json, img_url";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/strains", get(list_strains))
        .route("/api/strains/image-jobs/:id", get(image_job_status))
        .route("/api/strains/:id", get(strain_detail))
        .route("/api/strains/:id/image", post(create_image_job))
        .route("/images/strains/:filename", get(serve_image))
}

#[derive(sqlx::FromRow, Clone)]
struct StrainRow {
    id: Uuid,
    unique_identifier: String,
    name: String,
    strain_type: String,
    thc_level: Option<f64>,
    most_common_terpene: Option<String>,
    description: Option<String>,
    top_effect: Option<String>,
    top_percent: Option<String>,
    second_effect: Option<String>,
    second_percent: Option<String>,
    third_effect: Option<String>,
    third_percent: Option<String>,
    effects_json: Option<Value>,
    img_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StrainEffect {
    pub effect: String,
    pub intensity: f64,
}

#[derive(Serialize)]
struct StrainResponse {
    id: Uuid,
    slug: String,
    name: String,
    strain_type: String,
    thc_level: Option<f64>,
    most_common_terpene: Option<String>,
    description: Option<String>,
    img_url: Option<String>,
    effects: Vec<StrainEffect>,
}

impl From<StrainRow> for StrainResponse {
    fn from(row: StrainRow) -> Self {
        let effects = extract_effects(&row);
        Self {
            id: row.id,
            slug: row.unique_identifier,
            name: row.name,
            strain_type: row.strain_type,
            thc_level: row.thc_level,
            most_common_terpene: row.most_common_terpene,
            description: row.description,
            img_url: row.img_url,
            effects,
        }
    }
}

#[derive(Serialize)]
struct StrainListResponse {
    strains: Vec<StrainResponse>,
    total: i64,
    page: u64,
    limit: u64,
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<u64>,
    limit: Option<u64>,
    sort: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum StrainSort {
    Name,
    Thc,
}

impl StrainSort {
    fn from_param(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("thc") => StrainSort::Thc,
            _ => StrainSort::Name,
        }
    }

    fn image_tier_order(self) -> &'static str {
        match self {
            StrainSort::Name => "name ASC",
            StrainSort::Thc => "thc_level DESC NULLS LAST, name ASC",
        }
    }
}

/// Lists strains with the catalog's display priority: rows with artwork
/// first, then image-less rows with a known THC level (strongest first),
/// then everything else by name. The page window is spread across those
/// three tiers so each page is exactly `limit` rows while earlier tiers
/// still have stock.
async fn list_strains(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<StrainListResponse>, (StatusCode, Json<ApiMessage>)> {
    let page = params.page.unwrap_or(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let sort = StrainSort::from_param(params.sort.as_deref());

    let pool = state.pool();
    let (rows, total) = fetch_strain_page(&pool, page, limit, sort)
        .await
        .map_err(internal_error)?;

    Ok(Json(StrainListResponse {
        strains: rows.into_iter().map(StrainResponse::from).collect(),
        total,
        page,
        limit,
    }))
}

async fn fetch_strain_page(
    pool: &PgPool,
    page: u64,
    limit: u64,
    sort: StrainSort,
) -> Result<(Vec<StrainRow>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM strains")
        .fetch_one(pool)
        .await
        .context("failed to count strains")?;

    let with_image: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM strains WHERE img_url IS NOT NULL")
            .fetch_one(pool)
            .await
            .context("failed to count strains with images")?;

    let thc_only: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM strains WHERE img_url IS NULL AND thc_level IS NOT NULL",
    )
    .fetch_one(pool)
    .await
    .context("failed to count strains with THC data")?;

    let counts = [
        with_image.max(0) as u64,
        thc_only.max(0) as u64,
        (total - with_image - thc_only).max(0) as u64,
    ];
    let windows = tier_windows(page.saturating_mul(limit), limit, counts);

    let mut rows = Vec::with_capacity(limit as usize);

    let tier_queries = [
        format!(
            "SELECT {STRAIN_COLUMNS} FROM strains WHERE img_url IS NOT NULL \
             ORDER BY {} OFFSET $1 LIMIT $2",
            sort.image_tier_order()
        ),
        format!(
            "SELECT {STRAIN_COLUMNS} FROM strains \
             WHERE img_url IS NULL AND thc_level IS NOT NULL \
             ORDER BY thc_level DESC, name ASC OFFSET $1 LIMIT $2"
        ),
        format!(
            "SELECT {STRAIN_COLUMNS} FROM strains \
             WHERE img_url IS NULL AND thc_level IS NULL \
             ORDER BY name ASC OFFSET $1 LIMIT $2"
        ),
    ];

    for (query, (offset, take)) in tier_queries.iter().zip(windows) {
        if take == 0 {
            continue;
        }
        let mut tier_rows = sqlx::query_as::<_, StrainRow>(query)
            .bind(offset as i64)
            .bind(take as i64)
            .fetch_all(pool)
            .await
            .context("failed to fetch strain page tier")?;
        rows.append(&mut tier_rows);
    }

    Ok((rows, total))
}

/// Spreads a page window of `limit` rows starting at absolute offset `skip`
/// across three tiers with the given row counts. Returns per-tier
/// (offset, take) pairs; tiers after the page fills get a zero take.
fn tier_windows(skip: u64, limit: u64, counts: [u64; 3]) -> [(u64, u64); 3] {
    let mut skip = skip;
    let mut need = limit;
    let mut windows = [(0, 0); 3];

    for (window, &count) in windows.iter_mut().zip(counts.iter()) {
        let offset = skip.min(count);
        let take = need.min(count - offset);
        *window = (offset, take);
        skip -= offset;
        need -= take;
    }

    windows
}

/// Normalizes the loose effect columns into the display model: exactly
/// [`EFFECT_SLOTS`] entries, placeholder-padded. The flat columns win; the
/// semi-structured `effects_json` column is only consulted when all three
/// are empty, and parse failures fall back silently (logged, never surfaced).
fn extract_effects(row: &StrainRow) -> Vec<StrainEffect> {
    let slots = [
        (&row.top_effect, &row.top_percent),
        (&row.second_effect, &row.second_percent),
        (&row.third_effect, &row.third_percent),
    ];

    let mut effects: Vec<StrainEffect> = slots
        .into_iter()
        .filter_map(|(effect, percent)| {
            let name = effect.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
            Some(StrainEffect {
                effect: name.to_string(),
                intensity: parse_percent(percent.as_deref()),
            })
        })
        .collect();

    if effects.is_empty() {
        if let Some(value) = &row.effects_json {
            effects = effects_from_json(value);
        }
    }

    effects.truncate(EFFECT_SLOTS);
    while effects.len() < EFFECT_SLOTS {
        effects.push(StrainEffect {
            effect: UNKNOWN_EFFECT.to_string(),
            intensity: 0.0,
        });
    }

    effects
}

fn effects_from_json(value: &Value) -> Vec<StrainEffect> {
    let mut effects: Vec<StrainEffect> = match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, intensity)| StrainEffect {
                effect: name.clone(),
                intensity: json_intensity(intensity),
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item
                    .get("effect")
                    .or_else(|| item.get("name"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())?;
                let intensity = item
                    .get("intensity")
                    .or_else(|| item.get("percent"))
                    .map(json_intensity)
                    .unwrap_or(0.0);
                Some(StrainEffect {
                    effect: name.to_string(),
                    intensity,
                })
            })
            .collect(),
        other => {
            warn!(payload = %other, "unusable effects_json payload, ignoring");
            Vec::new()
        }
    };

    effects.sort_by(|a, b| {
        b.intensity
            .partial_cmp(&a.intensity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    effects
}

fn json_intensity(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_percent(Some(s)),
        _ => 0.0,
    }
}

/// Coerces a raw percent column ("85", "85%", " 85.5 % ") to a number.
/// Anything unparsable becomes 0.0 rather than an error.
fn parse_percent(raw: Option<&str>) -> f64 {
    raw.map(str::trim)
        .map(|s| s.trim_end_matches('%').trim())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Resolves a strain by uuid-less identifier the way the catalog's callers
/// address strains: stable slug first, then exact name, then
/// case-insensitive name, then a substring match on the dash-decoded slug.
/// The substring tier only counts when exactly one row qualifies; an
/// ambiguous partial is treated as no match.
async fn resolve_strain(pool: &PgPool, raw: &str) -> Result<Option<StrainRow>> {
    let by_slug = sqlx::query_as::<_, StrainRow>(&format!(
        "SELECT {STRAIN_COLUMNS} FROM strains WHERE unique_identifier = $1"
    ))
    .bind(raw)
    .fetch_optional(pool)
    .await
    .context("failed to look up strain by identifier")?;
    if by_slug.is_some() {
        return Ok(by_slug);
    }

    let by_name = sqlx::query_as::<_, StrainRow>(&format!(
        "SELECT {STRAIN_COLUMNS} FROM strains WHERE name = $1"
    ))
    .bind(raw)
    .fetch_optional(pool)
    .await
    .context("failed to look up strain by name")?;
    if by_name.is_some() {
        return Ok(by_name);
    }

    let by_name_ci = sqlx::query_as::<_, StrainRow>(&format!(
        "SELECT {STRAIN_COLUMNS} FROM strains WHERE LOWER(name) = LOWER($1) LIMIT 1"
    ))
    .bind(raw)
    .fetch_optional(pool)
    .await
    .context("failed to look up strain by case-insensitive name")?;
    if by_name_ci.is_some() {
        return Ok(by_name_ci);
    }

    let decoded = slug_decode(raw);
    if decoded.is_empty() {
        return Ok(None);
    }
    let pattern = format!("%{}%", escape_like(&decoded));
    let candidates = sqlx::query_as::<_, StrainRow>(&format!(
        "SELECT {STRAIN_COLUMNS} FROM strains WHERE name ILIKE $1 LIMIT 2"
    ))
    .bind(&pattern)
    .fetch_all(pool)
    .await
    .context("failed to look up strain by partial name")?;

    if candidates.len() == 1 {
        return Ok(candidates.into_iter().next());
    }
    Ok(None)
}

/// Turns a dash-separated identifier back into a name fragment.
fn slug_decode(raw: &str) -> String {
    raw.trim().replace('-', " ").trim().to_string()
}

/// Escapes LIKE/ILIKE wildcards so user input matches literally.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

async fn strain_detail(
    State(state): State<AppState>,
    AxumPath(id_or_slug): AxumPath<String>,
) -> Result<Json<StrainResponse>, (StatusCode, Json<ApiMessage>)> {
    let pool = state.pool();

    let row = resolve_strain(&pool, id_or_slug.trim())
        .await
        .map_err(internal_error)?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Sorte nicht gefunden."))?;

    Ok(Json(row.into()))
}

#[derive(sqlx::FromRow)]
struct ImageJobRow {
    id: Uuid,
    strain_id: Uuid,
    status: String,
    error_message: Option<String>,
}

#[derive(Serialize)]
struct ImageJobStatusResponse {
    job_id: Uuid,
    strain_id: Uuid,
    status: String,
    error_message: Option<String>,
    img_url: Option<String>,
}

async fn create_image_job(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(strain_id): AxumPath<Uuid>,
) -> Result<Json<JobSubmission>, (StatusCode, Json<ApiMessage>)> {
    auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let pool = state.pool();
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM strains WHERE id = $1)")
        .bind(strain_id)
        .fetch_one(&pool)
        .await
        .map_err(|err| internal_error(err.into()))?;
    if !exists {
        return Err(json_error(StatusCode::NOT_FOUND, "Sorte nicht gefunden."));
    }

    let job_id = Uuid::new_v4();
    sqlx::query("INSERT INTO strain_image_jobs (id, strain_id, status) VALUES ($1, $2, $3)")
        .bind(job_id)
        .bind(strain_id)
        .bind(STATUS_PENDING)
        .execute(&pool)
        .await
        .map_err(|err| internal_error(err.into()))?;

    spawn_image_worker(state.clone(), job_id, strain_id);

    Ok(Json(JobSubmission::new(
        job_id,
        format!("/api/strains/image-jobs/{job_id}"),
    )))
}

fn spawn_image_worker(state: AppState, job_id: Uuid, strain_id: Uuid) {
    tokio::spawn(async move {
        if let Err(err) = process_image_job(state.clone(), job_id, strain_id).await {
            error!(?err, %job_id, "image generation job failed");
            let detail = format!("{err:#}");
            if let Err(update_err) = sqlx::query(
                "UPDATE strain_image_jobs SET status = $2, error_message = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(job_id)
            .bind(STATUS_FAILED)
            .bind(detail)
            .execute(state.pool_ref())
            .await
            {
                error!(?update_err, %job_id, "failed to mark image job as failed");
            }
        }
    });
}

async fn process_image_job(state: AppState, job_id: Uuid, strain_id: Uuid) -> Result<()> {
    let pool = state.pool();

    sqlx::query("UPDATE strain_image_jobs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(STATUS_PROCESSING)
        .execute(&pool)
        .await
        .context("failed to mark image job as processing")?;

    let strain: (String, String) =
        sqlx::query_as("SELECT name, strain_type FROM strains WHERE id = $1")
            .bind(strain_id)
            .fetch_optional(&pool)
            .await
            .context("failed to load strain for image generation")?
            .ok_or_else(|| anyhow!("strain disappeared before image generation"))?;

    let prompt = build_strain_prompt(&strain.0, &strain.1);
    let bytes = state.image_client().generate(&prompt).await?;

    let img_url = store_image_bytes(Path::new(STORAGE_ROOT), job_id, &bytes).await?;

    let mut transaction = pool.begin().await.context("failed to begin transaction")?;
    sqlx::query("UPDATE strains SET img_url = $2 WHERE id = $1")
        .bind(strain_id)
        .bind(&img_url)
        .execute(&mut *transaction)
        .await
        .context("failed to store generated image URL")?;
    sqlx::query("UPDATE strain_image_jobs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(STATUS_COMPLETED)
        .execute(&mut *transaction)
        .await
        .context("failed to mark image job as completed")?;
    transaction
        .commit()
        .await
        .context("failed to commit image job completion")?;

    Ok(())
}

/// Writes the generated PNG under `root` and returns the public URL path it
/// will be served from.
async fn store_image_bytes(root: &Path, job_id: Uuid, bytes: &[u8]) -> Result<String> {
    tokio_fs::create_dir_all(root)
        .await
        .context("failed to create strain image storage root")?;
    let filename = format!("{job_id}.png");
    let path = root.join(&filename);
    tokio_fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write generated image to {}", path.display()))?;
    Ok(format!("/images/strains/{filename}"))
}

async fn image_job_status(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<Json<ImageJobStatusResponse>, (StatusCode, Json<ApiMessage>)> {
    auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let pool = state.pool();
    let job = sqlx::query_as::<_, ImageJobRow>(
        "SELECT id, strain_id, status, error_message FROM strain_image_jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(&pool)
    .await
    .map_err(|err| internal_error(err.into()))?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Auftrag nicht gefunden."))?;

    let img_url: Option<String> = if job.status == STATUS_COMPLETED {
        sqlx::query_scalar("SELECT img_url FROM strains WHERE id = $1")
            .bind(job.strain_id)
            .fetch_optional(&pool)
            .await
            .map_err(|err| internal_error(err.into()))?
            .flatten()
    } else {
        None
    };

    Ok(Json(ImageJobStatusResponse {
        job_id: job.id,
        strain_id: job.strain_id,
        status: job.status,
        error_message: job.error_message,
        img_url,
    }))
}

async fn serve_image(
    AxumPath(filename): AxumPath<String>,
) -> Result<Response, (StatusCode, Json<ApiMessage>)> {
    if !is_safe_image_filename(&filename) {
        return Err(json_error(StatusCode::NOT_FOUND, "Bild nicht gefunden."));
    }

    let path = PathBuf::from(STORAGE_ROOT).join(&filename);
    let bytes = match tokio_fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(json_error(StatusCode::NOT_FOUND, "Bild nicht gefunden."));
        }
        Err(err) => {
            return Err(internal_error(
                anyhow!(err).context(format!("failed to read image {}", path.display())),
            ));
        }
    };

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

/// Guards the public image route against path traversal: plain PNG names
/// only, no separators, no dot-dot.
fn is_safe_image_filename(filename: &str) -> bool {
    if filename.is_empty() || !filename.ends_with(".png") || filename.contains("..") {
        return false;
    }
    filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ApiMessage>) {
    error!(?err, "internal error in strains module");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Interner Serverfehler. Bitte versuche es später erneut.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare_row() -> StrainRow {
        StrainRow {
            id: Uuid::new_v4(),
            unique_identifier: "test-strain".to_string(),
            name: "Test Strain".to_string(),
            strain_type: "Hybrid".to_string(),
            thc_level: None,
            most_common_terpene: None,
            description: None,
            top_effect: None,
            top_percent: None,
            second_effect: None,
            second_percent: None,
            third_effect: None,
            third_percent: None,
            effects_json: None,
            img_url: None,
        }
    }

    #[test]
    fn page_fits_entirely_into_first_tier() {
        // 25 image-bearing rows available, limit 20: the whole page comes
        // from tier one.
        let windows = tier_windows(0, 20, [25, 40, 40]);
        assert_eq!(windows, [(0, 20), (0, 0), (0, 0)]);
    }

    #[test]
    fn page_spans_tier_boundary() {
        let windows = tier_windows(20, 20, [25, 40, 40]);
        assert_eq!(windows, [(20, 5), (0, 15), (0, 0)]);
    }

    #[test]
    fn deep_page_skips_into_last_tier() {
        let windows = tier_windows(70, 20, [25, 40, 40]);
        assert_eq!(windows, [(25, 0), (40, 0), (5, 20)]);
    }

    #[test]
    fn window_past_the_end_is_empty() {
        let windows = tier_windows(200, 20, [25, 40, 40]);
        assert_eq!(windows, [(25, 0), (40, 0), (40, 0)]);
    }

    #[test]
    fn effects_always_padded_to_three() {
        let mut row = bare_row();
        assert_eq!(extract_effects(&row).len(), 3);

        row.top_effect = Some("Relaxed".to_string());
        row.top_percent = Some("61%".to_string());
        let effects = extract_effects(&row);
        assert_eq!(effects.len(), 3);
        assert_eq!(effects[0].effect, "Relaxed");
        assert!((effects[0].intensity - 61.0).abs() < 1e-9);
        assert_eq!(effects[1].effect, UNKNOWN_EFFECT);
        assert_eq!(effects[2].effect, UNKNOWN_EFFECT);
    }

    #[test]
    fn three_flat_effects_pass_through_in_order() {
        let mut row = bare_row();
        row.top_effect = Some("Relaxed".to_string());
        row.top_percent = Some("61".to_string());
        row.second_effect = Some("Happy".to_string());
        row.second_percent = Some("55".to_string());
        row.third_effect = Some("Sleepy".to_string());
        row.third_percent = Some("nope".to_string());

        let effects = extract_effects(&row);
        assert_eq!(effects[0].effect, "Relaxed");
        assert_eq!(effects[1].effect, "Happy");
        assert_eq!(effects[2].effect, "Sleepy");
        // unparsable percent coerces to zero instead of failing
        assert_eq!(effects[2].intensity, 0.0);
    }

    #[test]
    fn json_fallback_only_when_flat_columns_empty() {
        let mut row = bare_row();
        row.effects_json = Some(json!({"Euphoric": 70, "Giggly": "45%"}));
        let effects = extract_effects(&row);
        assert_eq!(effects[0].effect, "Euphoric");
        assert!((effects[1].intensity - 45.0).abs() < 1e-9);
        assert_eq!(effects[2].effect, UNKNOWN_EFFECT);

        // flat columns win over the json payload
        row.top_effect = Some("Relaxed".to_string());
        let effects = extract_effects(&row);
        assert_eq!(effects[0].effect, "Relaxed");
    }

    #[test]
    fn json_array_variant_is_sorted_and_truncated() {
        let mut row = bare_row();
        row.effects_json = Some(json!([
            {"effect": "Sleepy", "percent": 20},
            {"name": "Relaxed", "intensity": 80},
            {"effect": "Happy", "percent": 60},
            {"effect": "Hungry", "percent": 40}
        ]));
        let effects = extract_effects(&row);
        assert_eq!(effects.len(), 3);
        assert_eq!(effects[0].effect, "Relaxed");
        assert_eq!(effects[1].effect, "Happy");
        assert_eq!(effects[2].effect, "Hungry");
    }

    #[test]
    fn garbage_json_degrades_to_placeholders() {
        let mut row = bare_row();
        row.effects_json = Some(json!("not a structure"));
        let effects = extract_effects(&row);
        assert!(effects.iter().all(|e| e.effect == UNKNOWN_EFFECT));
    }

    #[test]
    fn percent_coercion_variants() {
        assert_eq!(parse_percent(Some("85")), 85.0);
        assert_eq!(parse_percent(Some(" 85.5 % ")), 85.5);
        assert_eq!(parse_percent(Some("unknown")), 0.0);
        assert_eq!(parse_percent(None), 0.0);
    }

    #[test]
    fn slug_decoding() {
        assert_eq!(slug_decode("northern-lights"), "northern lights");
        assert_eq!(slug_decode("  gelato  "), "gelato");
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50% hybrid_x"), "50\\% hybrid\\_x");
    }

    #[test]
    fn image_filename_guard() {
        assert!(is_safe_image_filename("a1b2-c3d4.png"));
        assert!(!is_safe_image_filename("../etc/passwd"));
        assert!(!is_safe_image_filename("a/b.png"));
        assert!(!is_safe_image_filename("trick..png"));
        assert!(!is_safe_image_filename("image.jpg"));
        assert!(!is_safe_image_filename(""));
    }

    #[tokio::test]
    async fn stored_image_lands_under_root_with_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();

        let url = store_image_bytes(dir.path(), job_id, b"fake png bytes")
            .await
            .unwrap();

        assert_eq!(url, format!("/images/strains/{job_id}.png"));
        let written = std::fs::read(dir.path().join(format!("{job_id}.png"))).unwrap();
        assert_eq!(written, b"fake png bytes");
    }

    #[test]
    fn sort_param_parsing() {
        assert_eq!(StrainSort::from_param(Some("thc")), StrainSort::Thc);
        assert_eq!(StrainSort::from_param(Some("name")), StrainSort::Name);
        assert_eq!(StrainSort::from_param(None), StrainSort::Name);
    }
}
