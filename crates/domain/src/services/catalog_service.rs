use std::sync::Arc;
use std::time::Duration;

use cadet_core::{
    config::{CacheConfig, EngineConfig},
    models::{Capability, Category, Principal, Task, TaskDraft, TaskFilter},
    traits::{CachePrefix, CacheService, CacheServiceExt, Clock, LedgerStore},
    CadetError, CadetResult,
};
use tracing::{debug, info, instrument};

use crate::permission_gate::PermissionGate;
use crate::timeout_handler::{run_to_completion, TimeoutConfig, TimeoutHandler};

/// 任务目录服务
///
/// 管理端的任务增删改查。可领取任务列表经过 TTL 缓存，
/// 任何目录变更都在返回成功前同步失效 `tasks:` 前缀下的全部缓存，
/// 写入与失效一起脱离调用方执行，调用方中途放弃也不会留下过期缓存。
pub struct CatalogService {
    store: Arc<dyn LedgerStore>,
    gate: PermissionGate,
    cache: Arc<dyn CacheService>,
    clock: Arc<dyn Clock>,
    timeout: TimeoutHandler,
    list_ttl: Duration,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gate: PermissionGate,
        cache: Arc<dyn CacheService>,
        clock: Arc<dyn Clock>,
        engine: &EngineConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            gate,
            cache,
            clock,
            timeout: TimeoutHandler::new(TimeoutConfig::from(engine)),
            list_ttl: cache_config.task_list_ttl(),
        }
    }

    #[instrument(skip(self, principal, draft), fields(title = %draft.title))]
    pub async fn create_task(&self, principal: &Principal, draft: &TaskDraft) -> CadetResult<Task> {
        draft.validate()?;
        self.gate.require(principal, Capability::ManageTasks).await?;

        let (store, cache, timeout) = self.detached_parts();
        let draft = draft.clone();
        let now = self.clock.now();
        run_to_completion(
            async move {
                let task = timeout
                    .store_operation(store.create_task(&draft, now), "create_task")
                    .await?;
                invalidate_catalog(cache.as_ref()).await?;
                info!(task_id = task.id, "任务已创建");
                Ok(task)
            },
            "create_task",
        )
        .await
    }

    /// 整体更新任务定义，名额上限不能低于当前领取人数
    ///
    /// 上限检查由存储层在同一条写入里完成，更新未生效时再读一次任务以区分原因。
    #[instrument(skip(self, principal, draft))]
    pub async fn update_task(
        &self,
        principal: &Principal,
        task_id: i64,
        draft: &TaskDraft,
    ) -> CadetResult<Task> {
        draft.validate()?;
        self.gate.require(principal, Capability::ManageTasks).await?;

        let (store, cache, timeout) = self.detached_parts();
        let draft = draft.clone();
        let now = self.clock.now();
        run_to_completion(
            async move {
                let updated = timeout
                    .store_operation(store.update_task(task_id, &draft, now), "update_task")
                    .await?;
                let Some(task) = updated else {
                    let current = timeout
                        .store_operation(store.get_task(task_id), "get_task")
                        .await?
                        .ok_or_else(|| CadetError::task_not_found(task_id))?;
                    return Err(CadetError::validation(format!(
                        "名额上限 {} 不能低于当前领取人数 {}",
                        draft.max_participants, current.current_participants
                    )));
                };

                invalidate_catalog(cache.as_ref()).await?;
                info!("任务已更新");
                Ok(task)
            },
            "update_task",
        )
        .await
    }

    /// 删除任务，连带删除它的全部提交记录；已产生的积分流水不受影响
    #[instrument(skip(self, principal))]
    pub async fn delete_task(&self, principal: &Principal, task_id: i64) -> CadetResult<()> {
        self.gate.require(principal, Capability::ManageTasks).await?;

        let (store, cache, timeout) = self.detached_parts();
        run_to_completion(
            async move {
                let deleted = timeout
                    .store_operation(store.delete_task(task_id), "delete_task")
                    .await?;
                if !deleted {
                    return Err(CadetError::task_not_found(task_id));
                }
                invalidate_catalog(cache.as_ref()).await?;
                info!("任务已删除");
                Ok(())
            },
            "delete_task",
        )
        .await
    }

    pub async fn get_task(&self, task_id: i64) -> CadetResult<Task> {
        self.timeout
            .store_operation(self.store.get_task(task_id), "get_task")
            .await?
            .ok_or_else(|| CadetError::task_not_found(task_id))
    }

    /// 不经缓存的完整查询，包含已关闭的任务，供管理端使用
    pub async fn list_tasks(
        &self,
        principal: &Principal,
        filter: &TaskFilter,
    ) -> CadetResult<Vec<Task>> {
        self.gate.require(principal, Capability::ManageTasks).await?;
        self.timeout
            .store_operation(self.store.list_tasks(filter), "list_tasks")
            .await
    }

    /// 可领取的任务列表，按分类分别缓存
    ///
    /// 查询前记下缓存纪元，查询期间如有失效发生，结果只返回不回填。
    pub async fn list_active(&self, category: Option<Category>) -> CadetResult<Vec<Task>> {
        let key = active_list_key(category);

        if let Some(tasks) = self.cache.get_typed::<Vec<Task>>(&key).await? {
            debug!(%key, "任务列表命中缓存");
            return Ok(tasks);
        }

        let epoch = self.cache.epoch().await?;
        let filter = TaskFilter {
            category,
            ..TaskFilter::open()
        };
        let tasks = self
            .timeout
            .store_operation(self.store.list_tasks(&filter), "list_active")
            .await?;

        if self
            .cache
            .set_typed_if_epoch(&key, &tasks, self.list_ttl, epoch)
            .await?
        {
            debug!(%key, count = tasks.len(), "任务列表已缓存");
        } else {
            debug!(%key, "查询期间目录已变更，跳过回填");
        }
        Ok(tasks)
    }

    fn detached_parts(&self) -> (Arc<dyn LedgerStore>, Arc<dyn CacheService>, TimeoutHandler) {
        (
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            self.timeout.clone(),
        )
    }
}

async fn invalidate_catalog(cache: &dyn CacheService) -> CadetResult<()> {
    let removed = cache
        .invalidate_prefix(&CachePrefix::Tasks.collection())
        .await?;
    debug!(removed, "任务目录缓存已失效");
    Ok(())
}

fn active_list_key(category: Option<Category>) -> String {
    match category {
        Some(category) => CachePrefix::Tasks.key(&format!("active:{category}")),
        None => CachePrefix::Tasks.key("active:all"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_list_keys_share_prefix() {
        let prefix = CachePrefix::Tasks.collection();
        assert_eq!(active_list_key(None), "tasks:active:all");
        assert_eq!(active_list_key(Some(Category::Study)), "tasks:active:study");
        assert!(active_list_key(Some(Category::Events)).starts_with(&prefix));
    }
}
