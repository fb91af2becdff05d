use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use cadet_core::models::{Principal, ReviewDecision, SubmissionStatus};
use cadet_domain::ReviewRequest;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::CurrentPrincipal,
    error::{ApiError, ApiResult},
    response::{created, success},
    routes::AppState,
};

/// 代某个学员操作时通过 `cadet_id` 指定，学员本人可以省略
#[derive(Debug, Default, Deserialize)]
pub struct ActorQuery {
    pub cadet_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub cadet_id: Option<Uuid>,
    pub submission_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub points_awarded: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<SubmissionStatus>,
    pub limit: Option<i64>,
}

fn acting_cadet(principal: &Principal, requested: Option<Uuid>) -> ApiResult<Uuid> {
    requested
        .or(principal.cadet_id)
        .ok_or_else(|| ApiError::bad_request("缺少 cadet_id 参数"))
}

pub async fn claim_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<i64>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<impl IntoResponse> {
    let cadet_id = acting_cadet(&principal, query.cadet_id)?;
    let submission = state
        .engine
        .submissions
        .claim(&principal, task_id, cadet_id)
        .await?;
    Ok(created(submission))
}

pub async fn submit_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<i64>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let cadet_id = acting_cadet(&principal, request.cadet_id)?;
    let submission = state
        .engine
        .submissions
        .submit(&principal, task_id, cadet_id, &request.submission_text)
        .await?;
    Ok(success(submission))
}

pub async fn abandon_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(task_id): Path<i64>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<impl IntoResponse> {
    let cadet_id = acting_cadet(&principal, query.cadet_id)?;
    let outcome = state
        .engine
        .submissions
        .abandon(&principal, task_id, cadet_id)
        .await?;
    Ok(success(outcome))
}

/// 审核队列
pub async fn review_queue(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<QueueQuery>,
) -> ApiResult<impl IntoResponse> {
    let submissions = state
        .engine
        .submissions
        .review_queue(&principal, query.status, query.limit)
        .await?;
    Ok(success(submissions))
}

pub async fn review_submission(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(submission_id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<impl IntoResponse> {
    let request = ReviewRequest {
        submission_id,
        decision: body.decision,
        feedback: body.feedback,
        points_awarded: body.points_awarded,
    };
    let outcome = state.engine.submissions.review(&principal, &request).await?;
    Ok(success(outcome))
}

pub async fn cadet_submissions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(cadet_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let submissions = state
        .engine
        .submissions
        .submissions_for_cadet(&principal, cadet_id)
        .await?;
    Ok(success(submissions))
}
