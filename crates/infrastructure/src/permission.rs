use async_trait::async_trait;
use cadet_core::{
    models::{Capability, Principal, UserRole},
    traits::PermissionOracle,
    CadetResult,
};
use tracing::debug;

/// 基于角色与显式授权的权限判定
///
/// 管理员持有全部能力；其他角色只持有 `Principal::permissions` 中列出的能力。
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePermissionOracle;

impl RolePermissionOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PermissionOracle for RolePermissionOracle {
    async fn has_capability(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> CadetResult<bool> {
        let granted =
            principal.role == UserRole::Admin || principal.permissions.contains(&capability);
        debug!(
            user_id = %principal.user_id,
            role = principal.role.as_str(),
            %capability,
            granted,
            "权限判定"
        );
        Ok(granted)
    }
}
