use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use cadet_core::models::Category;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::CurrentPrincipal,
    error::ApiResult,
    response::{created, success},
    routes::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub category: Option<Category>,
    pub limit: Option<usize>,
}

/// 手动加减分
#[derive(Debug, Deserialize)]
pub struct AwardRequest {
    pub category: Category,
    pub points: i32,
    pub description: String,
}

pub async fn get_scores(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(cadet_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let scores = state.engine.ledger.scores(&principal, cadet_id).await?;
    Ok(success(scores))
}

pub async fn get_history(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(cadet_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let history = state
        .engine
        .ledger
        .history(&principal, cadet_id, query.limit)
        .await?;
    Ok(success(history))
}

pub async fn award_points(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(cadet_id): Path<Uuid>,
    Json(request): Json<AwardRequest>,
) -> ApiResult<impl IntoResponse> {
    let update = state
        .engine
        .ledger
        .award(
            &principal,
            cadet_id,
            request.category,
            request.points,
            &request.description,
        )
        .await?;
    Ok(created(update))
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let standings = state
        .engine
        .ledger
        .leaderboard(query.category, query.limit)
        .await?;
    Ok(success(standings))
}
