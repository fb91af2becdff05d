pub mod cache;
pub mod clock;
pub mod permission;
pub mod repository;

pub use cache::*;
pub use clock::*;
pub use permission::*;
pub use repository::*;
