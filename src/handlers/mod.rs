pub mod checkout_callback;

pub use checkout_callback::checkout_callback_config;
