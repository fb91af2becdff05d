use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use cadet_core::{
    traits::{CacheService, Clock, SystemClock},
    CadetResult,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// 缓存项
#[derive(Clone)]
struct CachedEntry {
    data: Arc<Vec<u8>>,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedEntry {
    /// 存活时间严格大于 ttl 才算过期
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.inserted_at);
        match age.to_std() {
            Ok(age) => age > self.ttl,
            // 时钟回拨时视为未过期
            Err(_) => false,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 缓存内容与失效纪元，放在同一把锁下
#[derive(Default)]
struct CacheTable {
    entries: HashMap<String, CachedEntry>,
    epoch: u64,
}

/// 进程内 TTL 记忆化缓存
///
/// 过期只在读取时惰性判断，没有后台清理。时间取自注入的 `Clock`，
/// 测试中可以用 `ManualClock` 模拟时间流逝。
pub struct MemoCache {
    table: RwLock<CacheTable>,
    stats: RwLock<CacheStats>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(CacheTable::default()),
            stats: RwLock::new(CacheStats::default()),
            clock,
        }
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        stats.total_entries = self.table.read().map(|t| t.entries.len()).unwrap_or(0);
        stats
    }

    pub fn clear(&self) {
        if let Ok(mut table) = self.table.write() {
            table.entries.clear();
            table.epoch += 1;
        }
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

#[async_trait]
impl CacheService for MemoCache {
    async fn get(&self, key: &str) -> CadetResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());

        let expired = match table.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let data = entry.data.as_ref().clone();
                drop(table);
                self.record(|stats| stats.hits += 1);
                return Ok(Some(data));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            table.entries.remove(key);
            debug!(key, "缓存项已过期，移除");
        }
        drop(table);
        self.record(|stats| {
            stats.misses += 1;
            if expired {
                stats.evictions += 1;
            }
        });
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CadetResult<()> {
        let entry = CachedEntry {
            data: Arc::new(value.to_vec()),
            inserted_at: self.clock.now(),
            ttl,
        };
        self.table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CadetResult<bool> {
        let removed = {
            let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
            table.epoch += 1;
            table.entries.remove(key).is_some()
        };
        if removed {
            self.record(|stats| stats.invalidations += 1);
        }
        Ok(removed)
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CadetResult<usize> {
        let removed = {
            let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
            table.epoch += 1;
            let before = table.entries.len();
            table.entries.retain(|key, _| !key.starts_with(prefix));
            before - table.entries.len()
        };
        if removed > 0 {
            debug!(prefix, removed, "按前缀失效缓存");
            self.record(|stats| stats.invalidations += removed as u64);
        }
        Ok(removed)
    }

    async fn epoch(&self) -> CadetResult<u64> {
        Ok(self.table.read().unwrap_or_else(|e| e.into_inner()).epoch)
    }

    async fn set_if_epoch(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        epoch: u64,
    ) -> CadetResult<bool> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if table.epoch != epoch {
            debug!(key, expected = epoch, current = table.epoch, "读取期间缓存已失效，丢弃写入");
            return Ok(false);
        }
        table.entries.insert(
            key.to_string(),
            CachedEntry {
                data: Arc::new(value.to_vec()),
                inserted_at: self.clock.now(),
                ttl,
            },
        );
        Ok(true)
    }
}
