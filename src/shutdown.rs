use std::sync::Arc;

use tokio::signal;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 多个组件订阅同一个关闭信号；重复触发只生效一次，关闭之后的订阅会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
        }
    }

    /// 订阅关闭信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            tx.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 触发关闭
    pub async fn shutdown(&self) {
        let mut shutdown_tx = self.shutdown_tx.write().await;
        let Some(tx) = shutdown_tx.take() else {
            debug!("关闭管理器已经触发过关闭");
            return;
        };

        debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
        // 没有订阅者时发送失败，可以忽略
        let _ = tx.send(());
        info!("关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.shutdown_tx.read().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("收到Ctrl+C信号");
            },
            _ = terminate.recv() => {
                info!("收到SIGTERM信号");
            },
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        info!("收到Ctrl+C信号");
    }

    Ok(())
}
