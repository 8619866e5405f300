use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::{get, put},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    AppState,
    web::{
        ApiMessage, json_error,
        auth::{self, JsonAuthError},
    },
};

const MIN_EFFECTIVENESS: i16 = 1;
const MAX_EFFECTIVENESS: i16 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/journal", get(list_entries).post(create_entry))
        .route("/api/journal/:id", put(update_entry).delete(delete_entry))
}

#[derive(sqlx::FromRow)]
struct JournalEntryRow {
    id: Uuid,
    entry_date: NaiveDate,
    dosage: String,
    dosage_type: String,
    effectiveness: i16,
    mood: Option<String>,
    activity: Option<String>,
    side_effects: Vec<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct JournalEntryResponse {
    id: Uuid,
    entry_date: NaiveDate,
    dosage: String,
    dosage_type: String,
    effectiveness: i16,
    mood: Option<String>,
    activity: Option<String>,
    side_effects: Vec<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JournalEntryRow> for JournalEntryResponse {
    fn from(row: JournalEntryRow) -> Self {
        Self {
            id: row.id,
            entry_date: row.entry_date,
            dosage: row.dosage,
            dosage_type: row.dosage_type,
            effectiveness: row.effectiveness,
            mood: row.mood,
            activity: row.activity,
            side_effects: row.side_effects,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct EntryForm {
    pub entry_date: NaiveDate,
    pub dosage: String,
    pub dosage_type: String,
    pub effectiveness: i16,
    pub mood: Option<String>,
    pub activity: Option<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
    pub notes: Option<String>,
}

impl EntryForm {
    /// Validation message for the client, or `None` when the form is sound.
    fn validation_error(&self) -> Option<&'static str> {
        if self.dosage.trim().is_empty() {
            return Some("Bitte gib eine Dosierung an.");
        }
        if self.dosage_type.trim().is_empty() {
            return Some("Bitte gib eine Konsumform an.");
        }
        if !(MIN_EFFECTIVENESS..=MAX_EFFECTIVENESS).contains(&self.effectiveness) {
            return Some("Die Wirksamkeit muss zwischen 1 und 5 liegen.");
        }
        None
    }
}

const ENTRY_COLUMNS: &str = "id, entry_date, dosage, dosage_type, effectiveness, mood, \
     activity, side_effects, notes, created_at, updated_at";

async fn list_entries(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Vec<JournalEntryResponse>>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let rows = sqlx::query_as::<_, JournalEntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE user_id = $1
         ORDER BY entry_date DESC, created_at DESC"
    ))
    .bind(user.id)
    .fetch_all(state.pool_ref())
    .await
    .map_err(internal_error)?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

async fn create_entry(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<EntryForm>,
) -> Result<(StatusCode, Json<JournalEntryResponse>), (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    if let Some(message) = form.validation_error() {
        return Err(json_error(StatusCode::UNPROCESSABLE_ENTITY, message));
    }

    let row = sqlx::query_as::<_, JournalEntryRow>(&format!(
        "INSERT INTO journal_entries
             (user_id, entry_date, dosage, dosage_type, effectiveness, mood, activity, side_effects, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {ENTRY_COLUMNS}"
    ))
    .bind(user.id)
    .bind(form.entry_date)
    .bind(form.dosage.trim())
    .bind(form.dosage_type.trim())
    .bind(form.effectiveness)
    .bind(&form.mood)
    .bind(&form.activity)
    .bind(&form.side_effects)
    .bind(&form.notes)
    .fetch_one(state.pool_ref())
    .await
    .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

async fn update_entry(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(entry_id): AxumPath<Uuid>,
    Json(form): Json<EntryForm>,
) -> Result<Json<JournalEntryResponse>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    if let Some(message) = form.validation_error() {
        return Err(json_error(StatusCode::UNPROCESSABLE_ENTITY, message));
    }

    let row = sqlx::query_as::<_, JournalEntryRow>(&format!(
        "UPDATE journal_entries
         SET entry_date = $3, dosage = $4, dosage_type = $5, effectiveness = $6,
             mood = $7, activity = $8, side_effects = $9, notes = $10, updated_at = NOW()
         WHERE id = $1 AND user_id = $2
         RETURNING {ENTRY_COLUMNS}"
    ))
    .bind(entry_id)
    .bind(user.id)
    .bind(form.entry_date)
    .bind(form.dosage.trim())
    .bind(form.dosage_type.trim())
    .bind(form.effectiveness)
    .bind(&form.mood)
    .bind(&form.activity)
    .bind(&form.side_effects)
    .bind(&form.notes)
    .fetch_optional(state.pool_ref())
    .await
    .map_err(internal_error)?
    .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Eintrag nicht gefunden."))?;

    Ok(Json(row.into()))
}

async fn delete_entry(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(entry_id): AxumPath<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let result = sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND user_id = $2")
        .bind(entry_id)
        .bind(user.id)
        .execute(state.pool_ref())
        .await
        .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err(json_error(StatusCode::NOT_FOUND, "Eintrag nicht gefunden."));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn internal_error(err: sqlx::Error) -> (StatusCode, Json<ApiMessage>) {
    error!(?err, "internal error in journal module");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Interner Serverfehler. Bitte versuche es später erneut.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> EntryForm {
        EntryForm {
            entry_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            dosage: "0.2g".to_string(),
            dosage_type: "Verdampfer".to_string(),
            effectiveness: 4,
            mood: Some("entspannt".to_string()),
            activity: None,
            side_effects: vec!["trockener Mund".to_string()],
            notes: None,
        }
    }

    #[test]
    fn valid_form_passes() {
        assert_eq!(form().validation_error(), None);
    }

    #[test]
    fn effectiveness_bounds() {
        let mut f = form();
        f.effectiveness = 0;
        assert!(f.validation_error().is_some());
        f.effectiveness = 6;
        assert!(f.validation_error().is_some());
        f.effectiveness = 1;
        assert_eq!(f.validation_error(), None);
        f.effectiveness = 5;
        assert_eq!(f.validation_error(), None);
    }

    #[test]
    fn blank_dosage_rejected() {
        let mut f = form();
        f.dosage = "   ".to_string();
        assert!(f.validation_error().is_some());

        let mut f = form();
        f.dosage_type = String::new();
        assert!(f.validation_error().is_some());
    }
}
