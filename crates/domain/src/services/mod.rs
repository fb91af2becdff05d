//! # 领域服务
//!
//! - `SubmissionService` - 领取、提交、放弃、审核的状态机
//! - `ScoringLedger` - 积分流水与聚合，唯一的积分变更路径
//! - `CatalogService` - 任务目录的管理与带缓存的查询
//!
//! 服务本身无状态，所有数据经 `LedgerStore` 读写，写操作前经 `PermissionGate` 鉴权。

pub mod catalog_service;
pub mod scoring_ledger;
pub mod submission_service;

pub use catalog_service::CatalogService;
pub use scoring_ledger::{rank_standings, ScoringLedger};
pub use submission_service::SubmissionService;
