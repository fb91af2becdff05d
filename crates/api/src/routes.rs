use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use cadet_core::config::AuthConfig;
use cadet_domain::PortalEngine;

use crate::{
    auth::{auth_middleware, JwtService},
    handlers::{
        health::health_check,
        scores::{award_points, get_history, get_leaderboard, get_scores},
        submissions::{
            abandon_task, cadet_submissions, claim_task, review_queue, review_submission,
            submit_task,
        },
        tasks::{create_task, delete_task, get_task, list_active_tasks, list_all_tasks, update_task},
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub engine: PortalEngine,
    pub auth_config: Arc<AuthConfig>,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(engine: PortalEngine, auth_config: AuthConfig) -> Self {
        let jwt = Arc::new(JwtService::from_config(&auth_config));
        Self {
            engine,
            auth_config: Arc::new(auth_config),
            jwt,
        }
    }
}

/// 创建API路由，除健康检查外都需要经过认证
pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        // 任务目录
        .route("/api/tasks", get(list_active_tasks).post(create_task))
        .route("/api/admin/tasks", get(list_all_tasks))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        // 任务生命周期
        .route("/api/tasks/{id}/claim", post(claim_task))
        .route("/api/tasks/{id}/submit", post(submit_task))
        .route("/api/tasks/{id}/abandon", post(abandon_task))
        .route("/api/submissions", get(review_queue))
        .route("/api/submissions/{id}/review", post(review_submission))
        // 学员视图与积分
        .route("/api/cadets/{id}/submissions", get(cadet_submissions))
        .route("/api/cadets/{id}/scores", get(get_scores))
        .route("/api/cadets/{id}/history", get(get_history))
        .route("/api/cadets/{id}/awards", post(award_points))
        .route("/api/leaderboard", get(get_leaderboard))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
}
