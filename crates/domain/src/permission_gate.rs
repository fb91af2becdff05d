use std::sync::Arc;

use cadet_core::{
    models::{Capability, Principal},
    traits::PermissionOracle,
    CadetError, CadetResult,
};
use tracing::warn;
use uuid::Uuid;

/// 写操作前的统一权限关卡
///
/// 所有判定都委托给 `PermissionOracle`，这里只负责把 "否" 变成 `Forbidden`。
#[derive(Clone)]
pub struct PermissionGate {
    oracle: Arc<dyn PermissionOracle>,
}

impl PermissionGate {
    pub fn new(oracle: Arc<dyn PermissionOracle>) -> Self {
        Self { oracle }
    }

    pub async fn require(&self, principal: &Principal, capability: Capability) -> CadetResult<()> {
        if self.oracle.has_capability(principal, capability).await? {
            return Ok(());
        }
        warn!(
            user_id = %principal.user_id,
            %capability,
            "权限不足，拒绝操作"
        );
        Err(CadetError::forbidden(capability.as_str()))
    }

    /// 学员本人，或持有 `capability` 的工作人员
    pub async fn require_self_or(
        &self,
        principal: &Principal,
        cadet_id: Uuid,
        capability: Capability,
    ) -> CadetResult<()> {
        if principal.acts_as(cadet_id) {
            return Ok(());
        }
        self.require(principal, capability).await
    }
}
