use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use cadet_core::models::{Category, TaskDraft, TaskFilter, TaskStatus};
use serde::Deserialize;

use crate::{
    auth::CurrentPrincipal,
    error::ApiResult,
    response::{created, no_content, success},
    routes::AppState,
};

/// 可领取任务查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ActiveTaskQuery {
    pub category: Option<Category>,
}

/// 管理端任务查询参数
#[derive(Debug, Default, Deserialize)]
pub struct TaskQueryParams {
    pub category: Option<Category>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<TaskQueryParams> for TaskFilter {
    fn from(params: TaskQueryParams) -> Self {
        TaskFilter {
            category: params.category,
            status: params.status,
            open_only: params.open_only,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

/// 可领取的任务列表（走缓存）
pub async fn list_active_tasks(
    State(state): State<AppState>,
    Query(params): Query<ActiveTaskQuery>,
) -> ApiResult<impl IntoResponse> {
    let tasks = state.engine.catalog.list_active(params.category).await?;
    Ok(success(tasks))
}

/// 全部任务，包含已关闭的
pub async fn list_all_tasks(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = TaskFilter::from(params);
    let tasks = state.engine.catalog.list_tasks(&principal, &filter).await?;
    Ok(success(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<impl IntoResponse> {
    let task = state.engine.catalog.create_task(&principal, &draft).await?;
    Ok(created(task))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let task = state.engine.catalog.get_task(id).await?;
    Ok(success(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<i64>,
    Json(draft): Json<TaskDraft>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .engine
        .catalog
        .update_task(&principal, id, &draft)
        .await?;
    Ok(success(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.engine.catalog.delete_task(&principal, id).await?;
    Ok(no_content())
}
