use std::sync::Arc;

use anyhow::{Context, Result};
use cadet_api::create_app;
use cadet_core::{
    config::AppConfig,
    models::Cadet,
    traits::{CadetRepository, SystemClock},
};
use cadet_domain::{EngineDependencies, PortalEngine};
use cadet_infrastructure::{MemoCache, RolePermissionOracle, SqliteStore};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;

/// 主应用程序
///
/// 持有 SQLite 存储与装配好的积分引擎，HTTP 服务只是引擎的一个入口。
pub struct Application {
    config: AppConfig,
    store: Arc<SqliteStore>,
    engine: PortalEngine,
}

impl Application {
    /// 连接数据库（同时完成迁移）并装配引擎
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let store = Arc::new(
            SqliteStore::connect(&config.database)
                .await
                .with_context(|| format!("连接数据库失败: {}", config.database.url))?,
        );

        let engine = PortalEngine::new(
            EngineDependencies {
                store: store.clone(),
                oracle: Arc::new(RolePermissionOracle::new()),
                cache: Arc::new(MemoCache::new()),
                clock: Arc::new(SystemClock),
            },
            &config.engine,
            &config.cache,
        );

        Ok(Self {
            config,
            store,
            engine,
        })
    }

    pub fn engine(&self) -> &PortalEngine {
        &self.engine
    }

    /// 登记新学员，返回其ID
    pub async fn enroll(&self, full_name: &str) -> Result<Cadet> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(anyhow::anyhow!("学员姓名不能为空"));
        }

        let cadet = self
            .store
            .create_cadet(&Cadet::new(full_name))
            .await
            .context("登记学员失败")?;
        info!(cadet_id = %cadet.id, "学员已登记: {}", cadet.full_name);
        Ok(cadet)
    }

    /// 运行API服务器，收到关闭信号后停止接收新请求并等待已有请求完成
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.api.enabled {
            return Err(anyhow::anyhow!("API服务被禁用，请检查配置"));
        }

        let app = create_app(self.engine.clone(), &self.config.api);
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定API服务器地址失败: {bind_address}"))?;

        info!("API服务器启动在: {}", bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        self.store.close().await;
        info!("数据库连接已关闭");
        Ok(())
    }
}
