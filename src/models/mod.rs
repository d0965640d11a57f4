pub mod checkout;
pub mod common;
pub mod event;
pub mod subscription;

pub use checkout::*;
pub use common::*;
pub use event::*;
pub use subscription::*;
