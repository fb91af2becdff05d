pub mod engine;
pub mod outcomes;
pub mod permission_gate;
pub mod services;
pub mod timeout_handler;

pub use cadet_core::{CadetError, CadetResult};
pub use engine::{EngineDependencies, PortalEngine};
pub use outcomes::*;
pub use permission_gate::PermissionGate;
pub use services::*;
pub use timeout_handler::{TimeoutConfig, TimeoutHandler};
