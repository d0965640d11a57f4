use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CheckoutErrorType;

/// Authoritative subscription status as reported by the remote service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Created,
    Active,
    Halted,
    Cancelled,
    #[serde(other)]
    Pending,
}

impl SubscriptionStatus {
    /// Polling stops once one of these is observed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Halted | SubscriptionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Created => write!(f, "created"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Halted => write!(f, "halted"),
            SubscriptionStatus::Cancelled => write!(f, "cancelled"),
            SubscriptionStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Durable marker for a purchase that was started but not yet confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubscriptionRecord {
    pub subscription_id: String,
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
}

impl PendingSubscriptionRecord {
    pub fn new(subscription_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            plan_id: plan_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
}

/// Body of a create call. Fields are optional on the wire; the workflow
/// treats a missing id or key as a creation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionResponse {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default, alias = "razorpayKeyId", alias = "keyId")]
    pub checkout_key: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PaymentState {
    #[default]
    Idle,
    CreatingSubscription,
    OpeningCheckout,
    ProcessingPayment,
    VerifyingPayment,
    Success,
    Failed,
    Cancelled,
}

impl PaymentState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PaymentState::CreatingSubscription
                | PaymentState::OpeningCheckout
                | PaymentState::ProcessingPayment
                | PaymentState::VerifyingPayment
        )
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentState::Idle => "idle",
            PaymentState::CreatingSubscription => "creatingSubscription",
            PaymentState::OpeningCheckout => "openingCheckout",
            PaymentState::ProcessingPayment => "processingPayment",
            PaymentState::VerifyingPayment => "verifyingPayment",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
            PaymentState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// In-memory state of one purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionIntent {
    pub attempt_id: Uuid,
    pub plan_id: String,
    pub subscription_id: Option<String>,
    pub checkout_key: Option<String>,
}

impl SubscriptionIntent {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            plan_id: plan_id.into(),
            subscription_id: None,
            checkout_key: None,
        }
    }
}

/// Outcome of the two confirmation phases. The checkout agent only ever
/// produces `Provisional`; the other variants come from the remote status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentConfirmation {
    Provisional { payment_id: Option<String> },
    Verified,
    VerificationFailed { status: SubscriptionStatus },
    VerificationTimedOut { last_status: SubscriptionStatus },
}

impl PaymentConfirmation {
    pub fn from_polled_status(status: SubscriptionStatus) -> Self {
        match status {
            SubscriptionStatus::Active => PaymentConfirmation::Verified,
            SubscriptionStatus::Halted | SubscriptionStatus::Cancelled => {
                PaymentConfirmation::VerificationFailed { status }
            }
            SubscriptionStatus::Created | SubscriptionStatus::Pending => {
                PaymentConfirmation::VerificationTimedOut {
                    last_status: status,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Creation,
    Checkout(CheckoutErrorType),
    Verification,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PaymentFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_is_pending() {
        let status: SubscriptionStatus = serde_json::from_str("\"authenticated\"").unwrap();
        assert_eq!(status, SubscriptionStatus::Pending);
        assert!(!status.is_terminal());

        let status: SubscriptionStatus = serde_json::from_str("\"halted\"").unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn test_pending_record_uses_camel_case() {
        let record = PendingSubscriptionRecord::new("sub_123", "plan_monthly");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["subscriptionId"], "sub_123");
        assert_eq!(value["planId"], "plan_monthly");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_create_response_accepts_gateway_key_alias() {
        let response: CreateSubscriptionResponse =
            serde_json::from_str(r#"{"subscriptionId":"sub_1","razorpayKeyId":"rzp_test_x"}"#)
                .unwrap();
        assert_eq!(response.checkout_key.as_deref(), Some("rzp_test_x"));
        assert!(response.amount.is_none());
    }

    #[test]
    fn test_confirmation_from_polled_status() {
        assert_eq!(
            PaymentConfirmation::from_polled_status(SubscriptionStatus::Active),
            PaymentConfirmation::Verified
        );
        assert_eq!(
            PaymentConfirmation::from_polled_status(SubscriptionStatus::Cancelled),
            PaymentConfirmation::VerificationFailed {
                status: SubscriptionStatus::Cancelled
            }
        );
        assert_eq!(
            PaymentConfirmation::from_polled_status(SubscriptionStatus::Created),
            PaymentConfirmation::VerificationTimedOut {
                last_status: SubscriptionStatus::Created
            }
        );
    }
}
