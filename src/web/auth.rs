use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::web::{
    AppState,
    responses::{ApiMessage, json_error},
};

pub const SESSION_COOKIE: &str = "session_token";
pub const SESSION_TTL_DAYS: i64 = 30;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, sqlx::FromRow)]
pub struct DbUserAuth {
    pub id: Uuid,
    pub password_hash: String,
}

/// Authenticated user as loaded from a valid session.
#[derive(Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub language: String,
    pub theme: String,
}

/// Error surface for JSON endpoints guarded by a session.
pub struct JsonAuthError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl JsonAuthError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Nicht angemeldet. Bitte melde dich an.",
        }
    }

    fn server() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Interner Serverfehler. Bitte versuche es später erneut.",
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionUserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub language: String,
    pub theme: String,
}

impl From<AuthUser> for SessionUserResponse {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            language: user.language,
            theme: user.theme,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<RegisterForm>,
) -> Result<(CookieJar, Json<SessionUserResponse>), (StatusCode, Json<ApiMessage>)> {
    let email = form.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 5 {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Bitte gib eine gültige E-Mail-Adresse an.",
        ));
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Das Passwort muss mindestens 8 Zeichen lang sein.",
        ));
    }

    let password_hash = hash_password(&form.password).map_err(|err| {
        error!(?err, "failed to hash password during registration");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Interner Serverfehler. Bitte versuche es später erneut.",
        )
    })?;

    let display_name = form
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let pool = state.pool();
    let user = match sqlx::query_as::<_, AuthUser>(
        "INSERT INTO users (email, password_hash, display_name) VALUES ($1, $2, $3)
         RETURNING id, email, display_name, language, theme",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&display_name)
    .fetch_one(&pool)
    .await
    {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return Err(json_error(
                StatusCode::CONFLICT,
                "Diese E-Mail-Adresse ist bereits registriert.",
            ));
        }
        Err(err) => {
            error!(?err, "failed to insert user during registration");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Interner Serverfehler. Bitte versuche es später erneut.",
            ));
        }
    };

    let cookie = create_session(&pool, user.id).await.map_err(|err| {
        error!(?err, "failed to create session after registration");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Interner Serverfehler. Bitte versuche es später erneut.",
        )
    })?;

    Ok((jar.add(cookie), Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> Result<(CookieJar, Json<SessionUserResponse>), (StatusCode, Json<ApiMessage>)> {
    let email = form.email.trim().to_lowercase();
    let pool = state.pool();

    let auth_row = match fetch_user_auth_by_email(&pool, &email).await {
        Ok(Some(row)) => row,
        Ok(None) => return Err(invalid_credentials()),
        Err(err) => {
            error!(?err, "failed to fetch user during login");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Interner Serverfehler. Bitte versuche es später erneut.",
            ));
        }
    };

    if !verify_password(&form.password, &auth_row.password_hash) {
        return Err(invalid_credentials());
    }

    let user = match fetch_user_by_id(&pool, auth_row.id).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(invalid_credentials()),
        Err(err) => {
            error!(?err, "failed to load profile during login");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Interner Serverfehler. Bitte versuche es später erneut.",
            ));
        }
    };

    let cookie = create_session(&pool, user.id).await.map_err(|err| {
        error!(?err, "failed to create session during login");
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Interner Serverfehler. Bitte versuche es später erneut.",
        )
    })?;

    Ok((jar.add(cookie), Json(user.into())))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    let mut jar = jar;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Ok(token) = Uuid::parse_str(cookie.value()) {
            if let Err(err) = sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(token)
                .execute(state.pool_ref())
                .await
            {
                error!(?err, "failed to remove session during logout");
            }
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    jar = jar.remove(removal);

    (jar, StatusCode::NO_CONTENT)
}

/// Resolves the session cookie to a user, mapping every failure mode to a
/// JSON-friendly status/message pair for API handlers.
pub async fn current_user_or_json_error(
    state: &AppState,
    jar: &CookieJar,
) -> Result<AuthUser, JsonAuthError> {
    let token_cookie = jar.get(SESSION_COOKIE).ok_or(JsonAuthError::unauthorized())?;
    let token =
        Uuid::parse_str(token_cookie.value()).map_err(|_| JsonAuthError::unauthorized())?;

    match fetch_user_by_session(state.pool_ref(), token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(JsonAuthError::unauthorized()),
        Err(err) => {
            error!(?err, "failed to validate session");
            Err(JsonAuthError::server())
        }
    }
}

async fn create_session(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Cookie<'static>> {
    let session_token = Uuid::new_v4();
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(session_token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    let mut cookie = Cookie::new(SESSION_COOKIE, session_token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
    Ok(cookie)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub async fn fetch_user_auth_by_email(
    pool: &PgPool,
    email: &str,
) -> sqlx::Result<Option<DbUserAuth>> {
    sqlx::query_as::<_, DbUserAuth>("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_user_by_id(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT id, email, display_name, language, theme FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_user_by_session(pool: &PgPool, token: Uuid) -> sqlx::Result<Option<AuthUser>> {
    sqlx::query_as::<_, AuthUser>(
        "SELECT users.id, users.email, users.display_name, users.language, users.theme
         FROM sessions JOIN users ON users.id = sessions.user_id
         WHERE sessions.id = $1 AND sessions.expires_at > NOW()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Removes sessions past their expiry. Returns the number of rows purged.
pub async fn purge_expired_sessions(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn invalid_credentials() -> (StatusCode, Json<ApiMessage>) {
    json_error(
        StatusCode::UNAUTHORIZED,
        "E-Mail-Adresse oder Passwort ist falsch.",
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip_verifies() {
        let hash = hash_password("gruenes-geheimnis").unwrap();
        assert!(verify_password("gruenes-geheimnis", &hash));
        assert!(!verify_password("falsches-passwort", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("egal", "not-a-phc-string"));
    }
}
