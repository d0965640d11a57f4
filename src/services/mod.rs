pub mod local_storage;
pub mod payment_events;
pub mod payment_orchestrator;
pub mod subscription_service;

pub use local_storage::*;
pub use payment_events::*;
pub use payment_orchestrator::*;
pub use subscription_service::*;
