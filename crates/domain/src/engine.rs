use std::sync::Arc;

use cadet_core::{
    config::{CacheConfig, EngineConfig},
    traits::{CacheService, Clock, LedgerStore, PermissionOracle},
};

use crate::permission_gate::PermissionGate;
use crate::services::{CatalogService, ScoringLedger, SubmissionService};

/// 引擎的外部协作者
#[derive(Clone)]
pub struct EngineDependencies {
    pub store: Arc<dyn LedgerStore>,
    pub oracle: Arc<dyn PermissionOracle>,
    pub cache: Arc<dyn CacheService>,
    pub clock: Arc<dyn Clock>,
}

/// 组装好的积分引擎，三个服务共享同一个存储、缓存和时钟
#[derive(Clone)]
pub struct PortalEngine {
    pub catalog: Arc<CatalogService>,
    pub submissions: Arc<SubmissionService>,
    pub ledger: Arc<ScoringLedger>,
}

impl PortalEngine {
    pub fn new(deps: EngineDependencies, engine: &EngineConfig, cache: &CacheConfig) -> Self {
        let gate = PermissionGate::new(deps.oracle);

        let ledger = Arc::new(ScoringLedger::new(
            deps.store.clone(),
            gate.clone(),
            deps.clock.clone(),
            engine,
        ));
        let submissions = Arc::new(SubmissionService::new(
            deps.store.clone(),
            ledger.clone(),
            gate.clone(),
            deps.cache.clone(),
            deps.clock.clone(),
            engine,
        ));
        let catalog = Arc::new(CatalogService::new(
            deps.store,
            gate,
            deps.cache,
            deps.clock,
            engine,
            cache,
        ));

        Self {
            catalog,
            submissions,
            ledger,
        }
    }
}
