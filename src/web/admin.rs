use crate::db::{self, DbUser, NewSurvey, NewUser};
use crate::domain::models::{AccessRule, MemberKind, Role, UserType};
use crate::domain::progress::UserFilter;
use crate::state::SharedState;
use crate::web::session::{require_admin, CurrentUser};
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateUserPayload {
    pub username: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub user_type: Option<UserType>,
    pub member: Option<MemberKind>,
    pub province_id: Option<i32>,
    pub ward_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RulePayload {
    pub role: Role,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSurveyPayload {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub status: bool,
    pub questions: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RulePayload>,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedSurvey {
    pub id: i32,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users", post(create_user))
        .route("/users/:id/lock", post(lock_user))
        .route("/users/:id/unlock", post(unlock_user))
        .route("/surveys", post(create_survey))
        .route("/surveys/:id/status", post(set_survey_status))
        .route("/surveys/:id/rules", get(get_rules))
        .route("/surveys/:id/rules", put(replace_rules))
        .with_state(state)
}

/// Organisation fields must fit the role: admins carry none, province unions
/// need a province, cooperatives and credit funds need a province and a type.
fn validate_new_user(payload: &CreateUserPayload) -> Result<(), StatusCode> {
    let username = payload.username.trim();
    if username.is_empty() || username.contains(char::is_whitespace) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if payload.password.len() < 6 {
        return Err(StatusCode::BAD_REQUEST);
    }
    match payload.role {
        Role::Admin => {
            if payload.user_type.is_some() || payload.member.is_some() {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
        Role::Lmhtx => {
            if payload.province_id.is_none() {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
        Role::Htx | Role::Qtd => {
            if payload.province_id.is_none() || payload.user_type.is_none() {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    }
    if payload.ward_id.is_some() && payload.province_id.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(())
}

fn validate_rules(rules: &[RulePayload]) -> Result<Vec<(Role, Option<UserType>)>, StatusCode> {
    let mut out: Vec<(Role, Option<UserType>)> = Vec::with_capacity(rules.len());
    for rule in rules {
        if rule.role == Role::Admin {
            return Err(StatusCode::BAD_REQUEST);
        }
        let pair = (rule.role, rule.user_type);
        if !out.contains(&pair) {
            out.push(pair);
        }
    }
    Ok(out)
}

async fn list_users(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<DbUser>>, StatusCode> {
    require_admin(&requester)?;

    let users = db::list_users(&state.pool, &filter).await.map_err(|e| {
        tracing::error!("Failed to load users: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(users))
}

async fn create_user(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<Json<DbUser>, StatusCode> {
    require_admin(&requester)?;
    validate_new_user(&payload)?;

    if let (Some(ward_id), Some(province_id)) = (payload.ward_id, payload.province_id) {
        let ok = db::ward_in_province(&state.pool, ward_id, province_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to check ward {} in province {}: {}", ward_id, province_id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        if !ok {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let username = payload.username.trim().to_string();
    if db::find_user_by_username(&state.pool, &username)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up username {}: {}", username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("Failed to hash password for {}: {}", username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .to_string();

    let new_user = NewUser {
        username: username.clone(),
        hash,
        name: payload.name.trim().to_string(),
        role: payload.role,
        user_type: payload.user_type,
        member: payload.member,
        province_id: payload.province_id,
        ward_id: payload.ward_id,
    };
    let user_id = db::insert_user(&state.pool, &new_user).await.map_err(|e| {
        tracing::error!("Failed to create user {}: {}", username, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    tracing::info!("Admin {} created user {} ({})", requester.id, user_id, new_user.role.as_str());

    let user = db::find_user_by_id(&state.pool, user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to reload created user {}: {}", user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(user))
}

async fn toggle_lock(
    state: &SharedState,
    requester: &DbUser,
    target_id: Uuid,
    locked: bool,
) -> Result<Json<DbUser>, StatusCode> {
    require_admin(requester)?;
    if requester.id == target_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let updated = db::set_user_locked(&state.pool, target_id, locked)
        .await
        .map_err(|e| {
            tracing::error!("Failed to set lock={} on {}: {}", locked, target_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }
    tracing::info!("Admin {} set lock={} on user {}", requester.id, locked, target_id);

    let user = db::find_user_by_id(&state.pool, target_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to reload user {}: {}", target_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(user))
}

async fn lock_user(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Path(target_id): Path<Uuid>,
) -> Result<Json<DbUser>, StatusCode> {
    toggle_lock(&state, &requester, target_id, true).await
}

async fn unlock_user(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Path(target_id): Path<Uuid>,
) -> Result<Json<DbUser>, StatusCode> {
    toggle_lock(&state, &requester, target_id, false).await
}

async fn create_survey(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Json(payload): Json<CreateSurveyPayload>,
) -> Result<(StatusCode, Json<CreatedSurvey>), StatusCode> {
    require_admin(&requester)?;

    let title = payload.title.trim();
    if title.is_empty() || payload.end_time < payload.start_time {
        return Err(StatusCode::BAD_REQUEST);
    }
    let questions: Vec<String> = payload
        .questions
        .iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let rules = validate_rules(&payload.rules)?;

    let survey = NewSurvey {
        title: title.to_string(),
        start_time: payload.start_time,
        end_time: payload.end_time,
        status: payload.status,
        questions,
        rules,
    };
    let id = db::create_survey(&state.pool, &survey).await.map_err(|e| {
        tracing::error!("Failed to create survey {}: {}", survey.title, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    tracing::info!(
        "Admin {} created survey {} with {} questions and {} access rules",
        requester.id,
        id,
        survey.questions.len(),
        survey.rules.len()
    );

    Ok((StatusCode::CREATED, Json(CreatedSurvey { id })))
}

async fn set_survey_status(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
    Json(payload): Json<StatusPayload>,
) -> Result<StatusCode, StatusCode> {
    require_admin(&requester)?;
    let updated = db::set_survey_status(&state.pool, survey_id, payload.status)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update survey {} status: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_rules(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
) -> Result<Json<Vec<AccessRule>>, StatusCode> {
    require_admin(&requester)?;
    let rules = db::get_access_rules(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load access rules for survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(rules))
}

/// An empty list opens the survey to every respondent.
async fn replace_rules(
    CurrentUser(requester): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
    Json(rules): Json<Vec<RulePayload>>,
) -> Result<Json<Vec<AccessRule>>, StatusCode> {
    require_admin(&requester)?;
    let rules = validate_rules(&rules)?;

    if db::find_survey(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }

    db::replace_access_rules(&state.pool, survey_id, &rules)
        .await
        .map_err(|e| {
            tracing::error!("Failed to replace rules for survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let stored = db::get_access_rules(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to reload access rules for survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(role: Role) -> CreateUserPayload {
        CreateUserPayload {
            username: "htx_hanoi_01".to_string(),
            password: "matkhau123".to_string(),
            name: "HTX Nông nghiệp Đông Anh".to_string(),
            role,
            user_type: Some(UserType::Nn),
            member: Some(MemberKind::Tv),
            province_id: Some(1),
            ward_id: None,
        }
    }

    #[test]
    fn user_fields_must_fit_role() {
        assert!(validate_new_user(&payload(Role::Htx)).is_ok());

        let mut no_type = payload(Role::Qtd);
        no_type.user_type = None;
        assert_eq!(validate_new_user(&no_type), Err(StatusCode::BAD_REQUEST));

        let mut union = payload(Role::Lmhtx);
        union.user_type = None;
        assert!(validate_new_user(&union).is_ok());

        assert_eq!(validate_new_user(&payload(Role::Admin)), Err(StatusCode::BAD_REQUEST));

        let mut spaced = payload(Role::Htx);
        spaced.username = "htx hanoi".to_string();
        assert_eq!(validate_new_user(&spaced), Err(StatusCode::BAD_REQUEST));

        let mut orphan_ward = payload(Role::Lmhtx);
        orphan_ward.province_id = None;
        orphan_ward.ward_id = Some(3);
        assert_eq!(validate_new_user(&orphan_ward), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn rules_are_deduplicated_and_exclude_admin() {
        let rules = vec![
            RulePayload { role: Role::Htx, user_type: Some(UserType::Nn) },
            RulePayload { role: Role::Htx, user_type: Some(UserType::Nn) },
            RulePayload { role: Role::Qtd, user_type: None },
        ];
        assert_eq!(
            validate_rules(&rules),
            Ok(vec![(Role::Htx, Some(UserType::Nn)), (Role::Qtd, None)])
        );
        assert_eq!(
            validate_rules(&[RulePayload { role: Role::Admin, user_type: None }]),
            Err(StatusCode::BAD_REQUEST)
        );

        let parsed: Vec<RulePayload> =
            serde_json::from_str(r#"[{"role":"HTX","type":"PNN"},{"role":"QTD","type":null}]"#).unwrap();
        assert_eq!(parsed[0].user_type, Some(UserType::Pnn));
        assert_eq!(parsed[1].user_type, None);
    }
}
