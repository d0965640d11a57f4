use serde_json::Value;

use crate::models::{CheckoutErrorType, ParsedPaymentError};

// Numeric codes reported by the mobile checkout SDK
const SDK_PAYMENT_CANCELED: i64 = 0;
const SDK_NETWORK_ERROR: i64 = 2;
const SDK_INVALID_OPTIONS: i64 = 3;
const SDK_TLS_ERROR: i64 = 6;

/// Maps the gateway's error shapes into a fixed `{type, message}` taxonomy.
///
/// Accepted shapes:
/// - `{ "code": 2, "description": "..." }` from the mobile SDK
/// - `{ "code": "BAD_REQUEST_ERROR", "description": "...", "reason": "..." }`
/// - `{ "error": { ... } }`, including a `description` that itself holds that JSON
/// - a bare string
pub fn parse_error(raw: &Value) -> ParsedPaymentError {
    if let Value::String(s) = raw {
        return ParsedPaymentError {
            error_type: classify_text(s).unwrap_or(CheckoutErrorType::Unknown),
            message: non_empty(s).unwrap_or_else(|| default_message(CheckoutErrorType::Unknown)),
        };
    }

    let detail = error_detail(raw);
    let error_type = classify(&detail);
    let message = detail
        .get("description")
        .and_then(Value::as_str)
        .and_then(non_empty)
        .unwrap_or_else(|| default_message(error_type));

    ParsedPaymentError {
        error_type,
        message,
    }
}

pub fn is_cancellation(raw: &Value) -> bool {
    parse_error(raw).error_type == CheckoutErrorType::Cancelled
}

fn error_detail(raw: &Value) -> Value {
    if let Some(nested) = raw.get("error").filter(|v| v.is_object()) {
        return nested.clone();
    }

    // The SDK sometimes wraps the gateway error as a JSON string in `description`
    if let Some(Value::Object(inner)) = raw
        .get("description")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .and_then(|v| v.get("error").cloned())
    {
        return Value::Object(inner);
    }

    raw.clone()
}

// Markers the gateway uses when the user closed the checkout themselves
const USER_CANCEL_REASONS: [&str; 2] = ["payment_cancelled", "payment_canceled"];

fn classify(detail: &Value) -> CheckoutErrorType {
    let reason = detail.get("reason").and_then(Value::as_str).unwrap_or("");
    if USER_CANCEL_REASONS.contains(&reason.to_ascii_lowercase().as_str()) {
        return CheckoutErrorType::Cancelled;
    }

    let from_code = match detail.get("code") {
        Some(Value::Number(n)) => n.as_i64().map(|code| match code {
            SDK_PAYMENT_CANCELED => CheckoutErrorType::Cancelled,
            SDK_NETWORK_ERROR => CheckoutErrorType::Network,
            SDK_INVALID_OPTIONS => CheckoutErrorType::InvalidOptions,
            SDK_TLS_ERROR => CheckoutErrorType::Tls,
            _ => CheckoutErrorType::Unknown,
        }),
        Some(Value::String(code)) => Some(match code.to_ascii_uppercase().as_str() {
            "BAD_REQUEST_ERROR" | "GATEWAY_ERROR" | "PAYMENT_FAILED" => {
                CheckoutErrorType::PaymentFailed
            }
            "SERVER_ERROR" => CheckoutErrorType::Server,
            "NETWORK_ERROR" => CheckoutErrorType::Network,
            "INVALID_OPTIONS" => CheckoutErrorType::InvalidOptions,
            "TLS_ERROR" => CheckoutErrorType::Tls,
            "PAYMENT_CANCELLED" | "PAYMENT_CANCELED" => CheckoutErrorType::Cancelled,
            _ => CheckoutErrorType::Unknown,
        }),
        _ => None,
    };

    match from_code {
        Some(CheckoutErrorType::Unknown) | None => detail
            .get("description")
            .and_then(Value::as_str)
            .and_then(classify_text)
            .unwrap_or(CheckoutErrorType::Unknown),
        Some(error_type) => error_type,
    }
}

/// Free text never signals a user cancellation; issuers and banks also
/// "cancel" payments.
fn classify_text(text: &str) -> Option<CheckoutErrorType> {
    text.to_ascii_lowercase()
        .contains("network")
        .then_some(CheckoutErrorType::Network)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn default_message(error_type: CheckoutErrorType) -> String {
    match error_type {
        CheckoutErrorType::Network => "Network error. Please check your connection and try again.",
        CheckoutErrorType::InvalidOptions => "Payment could not be started. Please try again later.",
        CheckoutErrorType::Cancelled => "Payment was cancelled.",
        CheckoutErrorType::PaymentFailed => "Payment failed. Please try another payment method.",
        CheckoutErrorType::Server => "Payment service is unavailable. Please try again later.",
        CheckoutErrorType::Tls => "Secure connection could not be established.",
        CheckoutErrorType::Unknown => "Payment failed due to an unknown error.",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sdk_numeric_codes() {
        let parsed = parse_error(&json!({ "code": 2, "description": "" }));
        assert_eq!(parsed.error_type, CheckoutErrorType::Network);
        assert_eq!(
            parsed.message,
            "Network error. Please check your connection and try again."
        );

        assert!(is_cancellation(&json!({ "code": 0, "description": "Payment cancelled by user" })));
        assert_eq!(
            parse_error(&json!({ "code": 6 })).error_type,
            CheckoutErrorType::Tls
        );
    }

    #[test]
    fn test_gateway_error_object() {
        let parsed = parse_error(&json!({
            "error": {
                "code": "BAD_REQUEST_ERROR",
                "description": "Your card was declined",
                "source": "bank",
                "reason": "payment_failed"
            }
        }));
        assert_eq!(parsed.error_type, CheckoutErrorType::PaymentFailed);
        assert_eq!(parsed.message, "Your card was declined");
    }

    #[test]
    fn test_error_json_inside_description() {
        let description = json!({
            "error": { "code": "SERVER_ERROR", "description": "Gateway down" }
        })
        .to_string();
        let parsed = parse_error(&json!({ "code": 1, "description": description }));
        assert_eq!(parsed.error_type, CheckoutErrorType::Server);
        assert_eq!(parsed.message, "Gateway down");
    }

    #[test]
    fn test_cancellation_by_reason() {
        let raw = json!({ "code": "BAD_REQUEST_ERROR", "reason": "payment_cancelled" });
        assert!(is_cancellation(&raw));
    }

    #[test]
    fn test_issuer_cancellation_is_a_payment_failure() {
        let parsed = parse_error(&json!({
            "error": {
                "code": "BAD_REQUEST_ERROR",
                "description": "Payment failed",
                "reason": "card_cancelled_by_issuer"
            }
        }));
        assert_eq!(parsed.error_type, CheckoutErrorType::PaymentFailed);
        assert_eq!(parsed.message, "Payment failed");

        let parsed = parse_error(&json!({
            "code": 1,
            "description": "Mandate cancelled by issuing bank"
        }));
        assert_eq!(parsed.error_type, CheckoutErrorType::Unknown);
        assert!(!is_cancellation(&json!("Payment cancelled by bank")));
    }

    #[test]
    fn test_unknown_shapes() {
        let parsed = parse_error(&json!({ "code": 42 }));
        assert_eq!(parsed.error_type, CheckoutErrorType::Unknown);
        assert_eq!(parsed.message, "Payment failed due to an unknown error.");

        let parsed = parse_error(&json!("checkout crashed"));
        assert_eq!(parsed.error_type, CheckoutErrorType::Unknown);
        assert_eq!(parsed.message, "checkout crashed");

        let parsed = parse_error(&Value::Null);
        assert_eq!(parsed.error_type, CheckoutErrorType::Unknown);
    }
}
