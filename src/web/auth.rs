use crate::db::{self, DbUser};
use crate::domain::models::{MemberKind, Role, UserType};
use crate::middleware::rate_limit::login_rate_limit;
use crate::state::SharedState;
use crate::web::session::{self, CurrentUser};
use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub name: String,
    pub token: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub user_type: Option<UserType>,
    pub member: Option<MemberKind>,
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
    pub survey_status: bool,
}

impl From<DbUser> for MeResponse {
    fn from(user: DbUser) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
            user_type: user.user_type,
            member: user.member,
            province_id: user.province_id,
            ward_id: user.ward_id,
            survey_status: user.survey_status,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(state.clone(), login_rate_limit)),
        )
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = db::find_user_by_username(&state.pool, username)
        .await
        .map_err(|e| {
            tracing::error!("Login lookup failed for {}: {}", username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let parsed_hash = PasswordHash::new(&user.hash).map_err(|_| StatusCode::UNAUTHORIZED)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if user.is_locked {
        tracing::info!("Locked account {} attempted to log in", user.id);
        return Err(StatusCode::FORBIDDEN);
    }

    let token = session::sign_session(user.id, user.role, &state.session_key)
        .map_err(|e| {
            tracing::error!("Failed to sign session for {}: {}", user.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&session::session_cookie(&token, state.config.production))
            .map_err(|e| {
                tracing::error!("Failed to build session cookie for {}: {}", user.id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?,
    );

    tracing::info!("User {} logged in", user.id);

    Ok((
        headers,
        Json(LoginResponse {
            user_id: user.id,
            role: user.role,
            name: user.name,
            token,
        }),
    ))
}

async fn logout() -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", session::SESSION_COOKIE),
        )],
        StatusCode::NO_CONTENT,
    )
}

async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(user.into())
}
