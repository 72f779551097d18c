use crate::db::{self, SaveOutcome};
use crate::domain::access;
use crate::domain::models::{Question, Role, Survey};
use crate::domain::submission::{self, SubmissionError, SubmittedAnswer, Submitter};
use crate::domain::survey_window::SurveyWindow;
use crate::state::SharedState;
use crate::time_utils;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct SurveySummary {
    pub id: i32,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ends_at_local: String,
    pub window: SurveyWindow,
    pub submitted: bool,
    pub point: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SurveyDetail {
    #[serde(flatten)]
    pub summary: SurveySummary,
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPayload {
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub survey_id: i32,
    pub point: i32,
    pub survey_time: DateTime<Utc>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_surveys))
        .route("/:id", get(survey_detail))
        .route("/:id/submit", post(submit_survey))
        .with_state(state)
}

fn summarize(state: &SharedState, survey: &Survey, point: Option<i32>, now: DateTime<Utc>) -> SurveySummary {
    SurveySummary {
        id: survey.id,
        title: survey.title.clone(),
        start_time: survey.start_time,
        end_time: survey.end_time,
        ends_at_local: time_utils::format_local_time(state.config.timezone, survey.end_time),
        window: survey.window(now),
        submitted: point.is_some(),
        point,
    }
}

/// Respondents see published surveys addressed to them, and keep seeing the
/// ones they already submitted after those are unpublished.
fn visible_to_respondent(survey: &Survey, applicable: bool, submitted: bool) -> bool {
    applicable && (survey.status || submitted)
}

/// Surveys visible to the caller. Admins see every survey, drafts included.
async fn list_surveys(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<SurveySummary>>, StatusCode> {
    let surveys = db::list_surveys(&state.pool).await.map_err(|e| {
        tracing::error!("Failed to list surveys: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let rules = db::get_all_access_rules(&state.pool).await.map_err(|e| {
        tracing::error!("Failed to load access rules: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let points: HashMap<i32, i32> = db::list_user_statuses(&state.pool, user.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load survey statuses for {}: {}", user.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .into_iter()
        .filter(|s| s.is_locked)
        .map(|s| (s.survey_id, s.point))
        .collect();

    let now = Utc::now();
    let is_admin = user.role == Role::Admin;
    let out = surveys
        .iter()
        .filter(|s| {
            is_admin
                || visible_to_respondent(
                    s,
                    access::is_applicable(
                        user.role,
                        user.user_type,
                        rules.get(&s.id).map(Vec::as_slice).unwrap_or_default(),
                    ),
                    points.contains_key(&s.id),
                )
        })
        .map(|s| summarize(&state, s, points.get(&s.id).copied(), now))
        .collect();

    Ok(Json(out))
}

async fn survey_detail(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
) -> Result<Json<SurveyDetail>, StatusCode> {
    let survey = db::find_survey(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let status = db::find_user_survey_status(&state.pool, user.id, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load status of survey {} for {}: {}", survey_id, user.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let point = status.filter(|s| s.is_locked).map(|s| s.point);

    if user.role != Role::Admin {
        let rules = db::get_access_rules(&state.pool, survey_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load access rules for survey {}: {}", survey_id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        let applicable = access::is_applicable(user.role, user.user_type, &rules);
        if !visible_to_respondent(&survey, applicable, point.is_some()) {
            return Err(StatusCode::NOT_FOUND);
        }
    }

    let questions = db::get_questions(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load questions for survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(SurveyDetail {
        summary: summarize(&state, &survey, point, Utc::now()),
        questions,
    }))
}

fn submission_status(err: &SubmissionError) -> StatusCode {
    match err {
        SubmissionError::NotOpen(_) | SubmissionError::AlreadySubmitted => StatusCode::CONFLICT,
        SubmissionError::AccountLocked | SubmissionError::NotApplicable => StatusCode::FORBIDDEN,
        SubmissionError::NoQuestions
        | SubmissionError::UnknownQuestion(_)
        | SubmissionError::DuplicateAnswer(_)
        | SubmissionError::InvalidAnswer { .. }
        | SubmissionError::MissingAnswers(_) => StatusCode::BAD_REQUEST,
    }
}

fn reject(user_id: uuid::Uuid, survey_id: i32, err: SubmissionError) -> (StatusCode, String) {
    tracing::info!("Submission of survey {} by {} rejected: {}", survey_id, user_id, err);
    (submission_status(&err), err.to_string())
}

async fn submit_survey(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
    Json(payload): Json<SubmitPayload>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    let internal = |e: anyhow::Error| {
        tracing::error!("Submission of survey {} by {} failed: {}", survey_id, user.id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    let survey = db::find_survey(&state.pool, survey_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "survey not found".to_string()))?;
    let rules = db::get_access_rules(&state.pool, survey_id).await.map_err(internal)?;
    let existing = db::find_user_survey_status(&state.pool, user.id, survey_id)
        .await
        .map_err(internal)?;

    let now = Utc::now();
    let submitter = Submitter {
        role: user.role,
        user_type: user.user_type,
        is_locked: user.is_locked,
        already_submitted: existing.map_or(false, |s| s.is_locked),
    };
    submission::check_eligibility(&survey, &rules, &submitter, now)
        .map_err(|e| reject(user.id, survey_id, e))?;

    let question_ids: Vec<i32> = db::get_questions(&state.pool, survey_id)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|q| q.id)
        .collect();
    let validated = submission::validate_answers(&question_ids, &payload.answers)
        .map_err(|e| reject(user.id, survey_id, e))?;

    match db::save_submission(&state.pool, user.id, survey_id, &validated, now)
        .await
        .map_err(internal)?
    {
        SaveOutcome::Saved => {
            tracing::info!(
                "User {} submitted survey {} with {} answers, point {}",
                user.id,
                survey_id,
                validated.answers.len(),
                validated.point
            );
            Ok(Json(SubmitResponse {
                survey_id,
                point: validated.point,
                survey_time: now,
            }))
        }
        SaveOutcome::AlreadyLocked => Err(reject(user.id, survey_id, SubmissionError::AlreadySubmitted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn survey(status: bool) -> Survey {
        let now = Utc::now();
        Survey {
            id: 7,
            title: "Khảo sát mức độ hài lòng".to_string(),
            start_time: now - Duration::days(30),
            end_time: now - Duration::days(1),
            status,
        }
    }

    #[test]
    fn submitted_survey_stays_visible_after_it_is_unpublished() {
        let closed = survey(false);
        assert!(visible_to_respondent(&closed, true, true));
        assert!(!visible_to_respondent(&closed, true, false));
        assert!(!visible_to_respondent(&closed, false, true));
        assert!(visible_to_respondent(&survey(true), true, false));
        assert_eq!(closed.window(Utc::now()), SurveyWindow::Closed);
    }

    #[test]
    fn submission_errors_map_to_client_statuses() {
        assert_eq!(
            submission_status(&SubmissionError::AlreadySubmitted),
            StatusCode::CONFLICT
        );
        assert_eq!(
            submission_status(&SubmissionError::NotOpen(SurveyWindow::Closed)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            submission_status(&SubmissionError::NotApplicable),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            submission_status(&SubmissionError::MissingAnswers(vec![3])),
            StatusCode::BAD_REQUEST
        );
    }
}
