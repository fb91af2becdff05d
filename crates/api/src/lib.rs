//! # Cadet Portal API
//!
//! 学员门户的 REST 接口层，把 HTTP 请求翻译为积分引擎的调用。
//!
//! ## API 端点
//!
//! ### 任务目录
//! - `GET /api/tasks?category=` - 可领取的任务（缓存）
//! - `POST /api/tasks` - 发布任务
//! - `GET /api/admin/tasks` - 全部任务，含已关闭
//! - `GET|PUT|DELETE /api/tasks/{id}` - 任务详情、整体更新、删除
//!
//! ### 任务生命周期
//! - `POST /api/tasks/{id}/claim?cadet_id=` - 领取
//! - `POST /api/tasks/{id}/submit` - 提交成果
//! - `POST /api/tasks/{id}/abandon?cadet_id=` - 放弃，可能扣分
//! - `GET /api/submissions?status=&limit=` - 审核队列
//! - `POST /api/submissions/{id}/review` - 审核
//!
//! ### 积分
//! - `GET /api/cadets/{id}/submissions` - 学员的提交记录
//! - `GET /api/cadets/{id}/scores` - 分类积分
//! - `GET /api/cadets/{id}/history?limit=` - 积分流水
//! - `POST /api/cadets/{id}/awards` - 手动加减分
//! - `GET /api/leaderboard?category=&limit=` - 排行榜
//!
//! ## 响应格式
//!
//! 成功时为 `{"success": true, "data": ..., "timestamp": ...}`，
//! 失败时为 `{"success": false, "error": {"code", "message", "detail", "retryable"}, "timestamp": ...}`。
//! 引擎错误与 HTTP 状态码的对应关系见 [`error::ApiError`]。
//!
//! ## 认证
//!
//! 启用认证时使用 HS256 签名的 Bearer 令牌，令牌中携带角色、学员ID与权限列表；
//! 关闭认证时所有请求以配置的 `dev_principal` 身份执行。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::Router;
use cadet_core::config::ApiConfig;
use cadet_domain::PortalEngine;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, request_timeout, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(engine: PortalEngine, api_config: &ApiConfig) -> Router {
    let state = AppState::new(engine, api_config.auth.clone());
    let timeout = Duration::from_secs(api_config.request_timeout_seconds);

    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(axum::middleware::from_fn_with_state(
                timeout,
                request_timeout,
            )),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(api_config))
    } else {
        router
    }
}
