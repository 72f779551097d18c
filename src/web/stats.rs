use crate::db::{self, DbUser};
use crate::domain::models::Role;
use crate::domain::progress::{self, ProvinceProgress, SurveyProgress, UserFilter};
use crate::domain::scoring::{self, Coefficients, ProvinceAggregate, ScoredProvince};
use crate::state::SharedState;
use crate::time_utils;
use crate::web::session::{require_admin, require_stats_viewer, CurrentUser};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SurveyProgressRow {
    pub title: String,
    #[serde(flatten)]
    pub progress: SurveyProgress,
}

#[derive(Debug, Serialize)]
pub struct RankingEntry {
    #[serde(flatten)]
    pub scored: ScoredProvince,
    pub coefficients: Coefficients,
}

#[derive(Debug, Serialize)]
pub struct RankingResponse {
    pub year: i32,
    pub provinces: Vec<ScoredProvince>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/progress", get(progress_overview))
        .route("/progress/:survey_id/provinces", get(progress_by_province))
        .route("/ranking", post(score_rows))
        .route("/ranking/current", get(current_ranking))
        .route("/ranking/:year", get(stored_ranking))
        .route("/ranking/:year/recompute", post(recompute_ranking))
        .with_state(state)
}

/// Province-union accounts only ever see their own province.
fn scoped_filter(viewer: &DbUser, filter: UserFilter) -> Result<UserFilter, StatusCode> {
    match viewer.role {
        Role::Admin => Ok(filter),
        Role::Lmhtx => {
            let province = viewer.province_id.ok_or(StatusCode::FORBIDDEN)?;
            Ok(filter.restricted_to(Some(province)))
        }
        _ => Err(StatusCode::FORBIDDEN),
    }
}

/// Stored ranking rows a viewer may read.
fn scoped_ranking(viewer: &DbUser, rows: Vec<ScoredProvince>) -> Result<Vec<ScoredProvince>, StatusCode> {
    match viewer.role {
        Role::Admin => Ok(rows),
        Role::Lmhtx => {
            let province = viewer.province_id.ok_or(StatusCode::FORBIDDEN)?;
            Ok(rows.into_iter().filter(|r| r.province.id == province).collect())
        }
        _ => Err(StatusCode::FORBIDDEN),
    }
}

async fn progress_overview(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<SurveyProgressRow>>, StatusCode> {
    require_stats_viewer(&viewer)?;
    let filter = scoped_filter(&viewer, filter)?;

    let surveys = db::list_surveys(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list surveys: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let rules = db::get_all_access_rules(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load access rules: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let users = db::list_respondents(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load respondents: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let completions = db::load_completions(&state.pool).await.map_err(|e| {
        tracing::error!("Failed to load completions: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    tracing::debug!(
        "Progress over {} surveys, {} respondents, {} completions",
        surveys.len(),
        users.len(),
        completions.len()
    );

    let summary = progress::summarize(
        surveys
            .iter()
            .map(|s| (s.id, rules.get(&s.id).map(Vec::as_slice).unwrap_or_default())),
        &users,
        &completions,
        &filter,
    );

    let rows = surveys
        .into_iter()
        .zip(summary)
        .map(|(survey, progress)| SurveyProgressRow {
            title: survey.title,
            progress,
        })
        .collect();
    Ok(Json(rows))
}

async fn progress_by_province(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(survey_id): Path<i32>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<ProvinceProgress>>, StatusCode> {
    require_stats_viewer(&viewer)?;
    let filter = scoped_filter(&viewer, filter)?;

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
    let rules = db::get_access_rules(&state.pool, survey_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load access rules for survey {}: {}", survey_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let users = db::list_respondents(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load respondents: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let completions = db::load_completions(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load completions: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(progress::province_breakdown(
        survey_id,
        &rules,
        &users,
        &completions,
        &filter,
    )))
}

/// Scores caller-supplied province rows without touching the database.
async fn score_rows(
    CurrentUser(viewer): CurrentUser,
    Json(rows): Json<Vec<ProvinceAggregate>>,
) -> Result<Json<Vec<RankingEntry>>, StatusCode> {
    require_stats_viewer(&viewer)?;
    let ranked = scoring::rank_provinces(rows)
        .into_iter()
        .map(|scored| RankingEntry {
            coefficients: scoring::coefficients(&scored.province),
            scored,
        })
        .collect();
    Ok(Json(ranked))
}

async fn current_ranking(
    viewer: CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<RankingResponse>, StatusCode> {
    let year = time_utils::local_year(state.config.timezone, Utc::now());
    stored_ranking(viewer, State(state), Path(year)).await
}

async fn stored_ranking(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(year): Path<i32>,
) -> Result<Json<RankingResponse>, StatusCode> {
    require_stats_viewer(&viewer)?;
    let provinces = db::list_province_totals(&state.pool, year)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load ranking for {}: {}", year, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let provinces = scoped_ranking(&viewer, provinces)?;
    Ok(Json(RankingResponse { year, provinces }))
}

/// Rebuilds the stored yearly totals from results and returns the new ranking.
pub async fn recompute_year(state: &SharedState, year: i32) -> Result<Vec<ScoredProvince>> {
    let aggregates = db::province_aggregates(&state.pool, year).await?;
    let ranked = scoring::rank_provinces(aggregates);
    db::upsert_province_totals(&state.pool, year, &ranked).await?;
    tracing::info!("Recomputed {} province totals for {}", ranked.len(), year);
    Ok(ranked)
}

async fn recompute_ranking(
    CurrentUser(viewer): CurrentUser,
    State(state): State<SharedState>,
    Path(year): Path<i32>,
) -> Result<Json<RankingResponse>, StatusCode> {
    require_admin(&viewer)?;
    if !(2000..=2100).contains(&year) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let provinces = recompute_year(&state, year).await.map_err(|e| {
        tracing::error!("Failed to recompute ranking for {}: {}", year, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(RankingResponse { year, provinces }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn viewer(role: Role, province_id: Option<i32>) -> DbUser {
        DbUser {
            id: Uuid::new_v4(),
            username: "viewer".to_string(),
            hash: String::new(),
            name: String::new(),
            role,
            user_type: None,
            member: None,
            province_id,
            ward_id: None,
            is_locked: false,
            survey_status: false,
            survey_time: None,
            created_at: Utc::now(),
        }
    }

    fn stored_row(id: i32, final_point: f64) -> ScoredProvince {
        ScoredProvince {
            province: ProvinceAggregate {
                id,
                name: format!("Tỉnh {id}"),
                region: None,
                total_point: 0.0,
                total_users: 0,
                total_members: 0,
                members_surveyed: 0,
                non_members_surveyed: 0,
            },
            final_point,
        }
    }

    #[test]
    fn province_union_reads_only_its_own_ranking_row() {
        let rows = vec![stored_row(2, 90.0), stored_row(4, 70.0), stored_row(9, 40.0)];

        let own = scoped_ranking(&viewer(Role::Lmhtx, Some(4)), rows.clone()).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].province.id, 4);

        let all = scoped_ranking(&viewer(Role::Admin, None), rows.clone()).unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(
            scoped_ranking(&viewer(Role::Lmhtx, None), rows.clone()),
            Err(StatusCode::FORBIDDEN)
        );
        assert_eq!(scoped_ranking(&viewer(Role::Qtd, Some(4)), rows), Err(StatusCode::FORBIDDEN));
    }

    #[test]
    fn province_union_is_pinned_to_its_province() {
        let asked = UserFilter {
            province_id: Some(9),
            ..Default::default()
        };
        let scoped = scoped_filter(&viewer(Role::Lmhtx, Some(4)), asked.clone()).unwrap();
        assert_eq!(scoped.province_id, Some(4));

        let admin = scoped_filter(&viewer(Role::Admin, None), asked.clone()).unwrap();
        assert_eq!(admin.province_id, Some(9));

        assert_eq!(
            scoped_filter(&viewer(Role::Lmhtx, None), asked.clone()),
            Err(StatusCode::FORBIDDEN)
        );
        assert_eq!(scoped_filter(&viewer(Role::Htx, Some(4)), asked), Err(StatusCode::FORBIDDEN));
    }
}
