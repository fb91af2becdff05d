//! 任务目录前的进程内缓存

pub mod memo_cache;

pub use memo_cache::*;
