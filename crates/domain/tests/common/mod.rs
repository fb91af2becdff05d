#![allow(dead_code)]

use std::sync::Arc;

use cadet_core::{
    config::{CacheConfig, EngineConfig},
    models::{Cadet, Capability, Category, Difficulty, Principal, Task, TaskDraft},
    traits::{CadetRepository, ManualClock},
};
use cadet_domain::{EngineDependencies, PortalEngine};
use cadet_infrastructure::{InMemoryStore, MemoCache, RolePermissionOracle};
use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub cache: Arc<MemoCache>,
    pub clock: ManualClock,
    pub engine: PortalEngine,
    pub admin: Principal,
    pub reviewer: Principal,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(engine_config: EngineConfig) -> Self {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(MemoCache::with_clock(Arc::new(clock.clone())));

        let engine = PortalEngine::new(
            EngineDependencies {
                store: store.clone(),
                oracle: Arc::new(RolePermissionOracle::new()),
                cache: cache.clone(),
                clock: Arc::new(clock.clone()),
            },
            &engine_config,
            &CacheConfig {
                task_list_ttl_seconds: 60,
            },
        );

        Self {
            store,
            cache,
            clock,
            engine,
            admin: Principal::admin(Uuid::new_v4()),
            reviewer: Principal::staff(Uuid::new_v4(), vec![Capability::ManageTasks]),
        }
    }

    pub async fn enroll(&self, name: &str) -> (Uuid, Principal) {
        let cadet = self.store.create_cadet(&Cadet::new(name)).await.unwrap();
        (cadet.id, Principal::cadet(cadet.id))
    }

    pub async fn publish(&self, draft: TaskDraft) -> Task {
        self.engine
            .catalog
            .create_task(&self.admin, &draft)
            .await
            .unwrap()
    }

    pub async fn task(&self, task_id: i64) -> Task {
        self.engine.catalog.get_task(task_id).await.unwrap()
    }

    pub async fn cadet_total(&self, cadet_id: Uuid) -> i32 {
        self.store
            .inspect(|state| state.cadets[&cadet_id].total_score)
            .await
    }

    pub async fn history_points(&self, cadet_id: Uuid) -> Vec<(Category, i32)> {
        self.store
            .inspect(|state| {
                state
                    .history_for(cadet_id)
                    .into_iter()
                    .map(|entry| (entry.category, entry.points))
                    .collect()
            })
            .await
    }

    pub async fn submission_count(&self, task_id: i64) -> usize {
        self.store
            .inspect(|state| {
                state
                    .submissions
                    .values()
                    .filter(|s| s.task_id == task_id)
                    .count()
            })
            .await
    }
}

pub fn deadline() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()
}

/// "Write an essay": study, 10 分, 放弃扣 5 分, 限 1 人
pub fn essay() -> TaskDraft {
    TaskDraft::new("Write an essay", Category::Study, Difficulty::Medium, 10, deadline())
        .with_abandon_penalty(5)
        .with_capacity(1)
}

pub fn drill(capacity: i32) -> TaskDraft {
    TaskDraft::new("Morning drill", Category::Discipline, Difficulty::Easy, 4, deadline())
        .with_capacity(capacity)
}
