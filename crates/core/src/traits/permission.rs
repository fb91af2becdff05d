use async_trait::async_trait;

use crate::errors::CadetResult;
use crate::models::{Capability, Principal};

/// 权限判定接口
///
/// 引擎从不自行推导角色，所有写操作前都通过这里询问主体是否持有某项能力。
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn has_capability(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> CadetResult<bool>;
}
