pub mod payment_error;

pub use payment_error::{is_cancellation, parse_error};
