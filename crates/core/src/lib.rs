//! 学员门户积分引擎的核心抽象：错误类型、数据模型、存储与权限接口、配置。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::*;
pub use traits::*;
