use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{CheckoutErrorType, SubscriptionStatus};

/// Milestones of the payment workflow, emitted through `PaymentEvents`.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Initiated {
        attempt_id: Uuid,
        plan_id: String,
    },
    CreationFailed {
        attempt_id: Uuid,
        plan_id: String,
        message: String,
    },
    CheckoutCancelled {
        attempt_id: Uuid,
        subscription_id: String,
    },
    PaymentFailed {
        attempt_id: Uuid,
        subscription_id: String,
        error_type: CheckoutErrorType,
        message: String,
    },
    CheckoutSucceeded {
        attempt_id: Uuid,
        subscription_id: String,
        payment_id: Option<String>,
    },
    Verified {
        attempt_id: Uuid,
        subscription_id: String,
    },
    VerificationFailed {
        attempt_id: Uuid,
        subscription_id: String,
        status: SubscriptionStatus,
    },
    VerificationTimedOut {
        attempt_id: Uuid,
        subscription_id: String,
        last_status: SubscriptionStatus,
    },
    Resumed {
        subscription_id: String,
        plan_id: String,
    },
    ResumeVerified {
        subscription_id: String,
    },
    Error {
        plan_id: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Short transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::Initiated { .. } => "subscription_initiated",
            PaymentEvent::CreationFailed { .. } => "subscription_creation_failed",
            PaymentEvent::CheckoutCancelled { .. } => "subscription_checkout_cancelled",
            PaymentEvent::PaymentFailed { .. } => "subscription_payment_failed",
            PaymentEvent::CheckoutSucceeded { .. } => "subscription_checkout_succeeded",
            PaymentEvent::Verified { .. } => "subscription_verified",
            PaymentEvent::VerificationFailed { .. } => "subscription_verification_failed",
            PaymentEvent::VerificationTimedOut { .. } => "subscription_verification_timeout",
            PaymentEvent::Resumed { .. } => "subscription_resumed",
            PaymentEvent::ResumeVerified { .. } => "subscription_resume_verified",
            PaymentEvent::Error { .. } => "subscription_error",
        }
    }

    pub fn properties(&self) -> Map<String, Value> {
        let value = match self {
            PaymentEvent::Initiated {
                attempt_id,
                plan_id,
            } => json!({ "attempt_id": attempt_id, "plan_id": plan_id }),
            PaymentEvent::CreationFailed {
                attempt_id,
                plan_id,
                message,
            } => json!({ "attempt_id": attempt_id, "plan_id": plan_id, "error": message }),
            PaymentEvent::CheckoutCancelled {
                attempt_id,
                subscription_id,
            } => json!({ "attempt_id": attempt_id, "subscription_id": subscription_id }),
            PaymentEvent::PaymentFailed {
                attempt_id,
                subscription_id,
                error_type,
                message,
            } => json!({
                "attempt_id": attempt_id,
                "subscription_id": subscription_id,
                "error_type": error_type.as_str(),
                "error": message,
            }),
            PaymentEvent::CheckoutSucceeded {
                attempt_id,
                subscription_id,
                payment_id,
            } => json!({
                "attempt_id": attempt_id,
                "subscription_id": subscription_id,
                "payment_id": payment_id,
                "verification": "pending",
            }),
            PaymentEvent::Verified {
                attempt_id,
                subscription_id,
            } => json!({ "attempt_id": attempt_id, "subscription_id": subscription_id }),
            PaymentEvent::VerificationFailed {
                attempt_id,
                subscription_id,
                status,
            } => json!({
                "attempt_id": attempt_id,
                "subscription_id": subscription_id,
                "status": status.to_string(),
            }),
            PaymentEvent::VerificationTimedOut {
                attempt_id,
                subscription_id,
                last_status,
            } => json!({
                "attempt_id": attempt_id,
                "subscription_id": subscription_id,
                "last_status": last_status.to_string(),
            }),
            PaymentEvent::Resumed {
                subscription_id,
                plan_id,
            } => json!({ "subscription_id": subscription_id, "plan_id": plan_id }),
            PaymentEvent::ResumeVerified { subscription_id } => {
                json!({ "subscription_id": subscription_id })
            }
            PaymentEvent::Error { plan_id, message } => {
                json!({ "plan_id": plan_id, "error": message })
            }
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// The toast, if any, this milestone shows to the user.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            PaymentEvent::CreationFailed { message, .. } => Some(Notice::new(
                NoticeLevel::Error,
                format!("Could not start subscription: {message}"),
            )),
            PaymentEvent::CheckoutCancelled { .. } => {
                Some(Notice::new(NoticeLevel::Info, "Payment cancelled"))
            }
            PaymentEvent::PaymentFailed { message, .. } => Some(Notice::new(
                NoticeLevel::Error,
                format!("Payment failed: {message}"),
            )),
            PaymentEvent::Verified { .. }
            | PaymentEvent::VerificationTimedOut { .. }
            | PaymentEvent::ResumeVerified { .. } => Some(Notice::new(
                NoticeLevel::Success,
                "Your subscription is now active",
            )),
            PaymentEvent::VerificationFailed { .. } => Some(Notice::new(
                NoticeLevel::Error,
                "Payment could not be verified. Please contact support.",
            )),
            PaymentEvent::Error { message, .. } => Some(Notice::new(
                NoticeLevel::Error,
                format!("Something went wrong: {message}"),
            )),
            PaymentEvent::Initiated { .. }
            | PaymentEvent::CheckoutSucceeded { .. }
            | PaymentEvent::Resumed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_succeeded_marks_verification_pending() {
        let event = PaymentEvent::CheckoutSucceeded {
            attempt_id: Uuid::nil(),
            subscription_id: "sub_1".to_string(),
            payment_id: Some("pay_9".to_string()),
        };
        let props = event.properties();
        assert_eq!(event.name(), "subscription_checkout_succeeded");
        assert_eq!(props["payment_id"], "pay_9");
        assert_eq!(props["verification"], "pending");
        assert!(event.notice().is_none());
    }

    #[test]
    fn test_payment_failed_carries_error_type() {
        let event = PaymentEvent::PaymentFailed {
            attempt_id: Uuid::nil(),
            subscription_id: "sub_1".to_string(),
            error_type: CheckoutErrorType::Network,
            message: "offline".to_string(),
        };
        assert_eq!(event.properties()["error_type"], "NETWORK_ERROR");
        assert_eq!(event.notice().unwrap().level, NoticeLevel::Error);
    }
}
