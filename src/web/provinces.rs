use crate::db;
use crate::domain::models::{Province, Ward};
use crate::state::SharedState;
use crate::web::session::CurrentUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_provinces))
        .route("/:id/wards", get(list_wards))
        .with_state(state)
}

async fn list_provinces(
    _user: CurrentUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Province>>, StatusCode> {
    let provinces = db::list_provinces(&state.pool).await.map_err(|e| {
        tracing::error!("Failed to list provinces: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(provinces))
}

async fn list_wards(
    _user: CurrentUser,
    State(state): State<SharedState>,
    Path(province_id): Path<i32>,
) -> Result<Json<Vec<Ward>>, StatusCode> {
    let wards = db::list_wards(&state.pool, province_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list wards of province {}: {}", province_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(wards))
}
