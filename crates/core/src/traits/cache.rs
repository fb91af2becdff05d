use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{CadetError, CadetResult};

/// 缓存键前缀
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePrefix {
    Tasks,
}

impl CachePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePrefix::Tasks => "tasks",
        }
    }

    /// `tasks:` 形式的集合前缀，用于整体失效
    pub fn collection(&self) -> String {
        format!("{}:", self.as_str())
    }

    pub fn key(&self, segment: &str) -> String {
        format!("{}:{}", self.as_str(), segment)
    }
}

/// 进程内记忆化缓存接口
#[async_trait]
pub trait CacheService: Send + Sync {
    /// 过期项在读取时惰性淘汰并视为未命中
    async fn get(&self, key: &str) -> CadetResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CadetResult<()>;

    /// 无条件移除
    async fn invalidate(&self, key: &str) -> CadetResult<bool>;

    /// 移除所有以 `prefix` 开头的键，返回移除数量
    async fn invalidate_prefix(&self, prefix: &str) -> CadetResult<usize>;

    /// 失效纪元，每次 `invalidate` 或 `invalidate_prefix` 都会递增
    async fn epoch(&self) -> CadetResult<u64>;

    /// 纪元仍等于 `epoch` 时写入，否则丢弃并返回 false
    ///
    /// 读数据源之前取纪元，写回时纪元已变说明读取期间有过失效，读到的值可能已过时。
    async fn set_if_epoch(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        epoch: u64,
    ) -> CadetResult<bool>;
}

/// 类型化读写
#[async_trait]
pub trait CacheServiceExt: Send + Sync {
    async fn get_typed<T>(&self, key: &str) -> CadetResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync;

    async fn set_typed<T>(&self, key: &str, value: &T, ttl: Duration) -> CadetResult<()>
    where
        T: serde::Serialize + Send + Sync;

    async fn set_typed_if_epoch<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        epoch: u64,
    ) -> CadetResult<bool>
    where
        T: serde::Serialize + Send + Sync;
}

#[async_trait]
impl<C: CacheService + ?Sized> CacheServiceExt for C {
    async fn get_typed<T>(&self, key: &str) -> CadetResult<Option<T>>
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        match self.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| CadetError::Internal(format!("缓存反序列化失败: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_typed<T>(&self, key: &str, value: &T, ttl: Duration) -> CadetResult<()>
    where
        T: serde::Serialize + Send + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl).await
    }

    async fn set_typed_if_epoch<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        epoch: u64,
    ) -> CadetResult<bool>
    where
        T: serde::Serialize + Send + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set_if_epoch(key, &bytes, ttl, epoch).await
    }
}
