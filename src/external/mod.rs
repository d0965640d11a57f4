pub mod analytics;
pub mod checkout;
pub mod subscription_api;

pub use analytics::*;
pub use checkout::*;
pub use subscription_api::*;
