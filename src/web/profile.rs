use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::error;

use crate::web::{
    AppState,
    auth::{self, JsonAuthError, SessionUserResponse},
    responses::{ApiMessage, json_error},
};

/// Languages the client ships translations for.
const SUPPORTED_LANGUAGES: &[&str] = &["de", "en"];
const SUPPORTED_THEMES: &[&str] = &["light", "dark", "system"];

#[derive(Deserialize)]
pub struct PreferencesForm {
    pub language: String,
    pub theme: String,
}

pub async fn profile(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionUserResponse>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    Ok(Json(user.into()))
}

/// Persists language/theme. The mobile client used to keep these in browser
/// local storage; here they live on the profile so every device agrees.
pub async fn update_preferences(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<PreferencesForm>,
) -> Result<Json<SessionUserResponse>, (StatusCode, Json<ApiMessage>)> {
    let user = auth::current_user_or_json_error(&state, &jar)
        .await
        .map_err(|JsonAuthError { status, message }| json_error(status, message))?;

    let language = form.language.trim().to_lowercase();
    let theme = form.theme.trim().to_lowercase();

    if !is_supported_language(&language) {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Diese Sprache wird nicht unterstützt.",
        ));
    }
    if !is_supported_theme(&theme) {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Dieses Design wird nicht unterstützt.",
        ));
    }

    let updated = sqlx::query_as::<_, auth::AuthUser>(
        "UPDATE users SET language = $2, theme = $3 WHERE id = $1
         RETURNING id, email, display_name, language, theme",
    )
    .bind(user.id)
    .bind(&language)
    .bind(&theme)
    .fetch_one(state.pool_ref())
    .await
    .map_err(|err| {
        error!(?err, "failed to update profile preferences");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Interner Serverfehler. Bitte versuche es später erneut.",
        )
    })?;

    Ok(Json(updated.into()))
}

pub fn is_supported_language(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

pub fn is_supported_theme(theme: &str) -> bool {
    SUPPORTED_THEMES.contains(&theme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_validation() {
        assert!(is_supported_language("de"));
        assert!(is_supported_language("en"));
        assert!(!is_supported_language("fr"));
        assert!(!is_supported_language(""));
    }

    #[test]
    fn theme_validation() {
        assert!(is_supported_theme("light"));
        assert!(is_supported_theme("dark"));
        assert!(is_supported_theme("system"));
        assert!(!is_supported_theme("neon"));
    }
}
