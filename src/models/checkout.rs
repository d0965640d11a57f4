use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CheckoutPrefill;

/// Everything the checkout agent needs to open a subscription payment.
/// Amount and currency are carried server-side by the subscription id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutOptions {
    pub key: String,
    pub subscription_id: String,
    pub name: String,
    pub description: String,
    pub prefill: CheckoutPrefill,
    pub theme_color: String,
}

/// Identifiers the gateway hands back after a provisional success.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSuccess {
    pub payment_id: Option<String>,
    pub subscription_id: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Completed(CheckoutSuccess),
    Cancelled,
    /// Raw gateway error, classified later by `parse_error`.
    Failed(Value),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutErrorType {
    Network,
    InvalidOptions,
    Cancelled,
    PaymentFailed,
    Server,
    Tls,
    Unknown,
}

impl CheckoutErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutErrorType::Network => "NETWORK_ERROR",
            CheckoutErrorType::InvalidOptions => "INVALID_OPTIONS",
            CheckoutErrorType::Cancelled => "PAYMENT_CANCELLED",
            CheckoutErrorType::PaymentFailed => "PAYMENT_FAILED",
            CheckoutErrorType::Server => "SERVER_ERROR",
            CheckoutErrorType::Tls => "TLS_ERROR",
            CheckoutErrorType::Unknown => "UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPaymentError {
    pub error_type: CheckoutErrorType,
    pub message: String,
}
