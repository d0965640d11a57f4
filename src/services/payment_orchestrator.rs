//! Client-side subscription purchase workflow.
//!
//! The checkout agent's success is only provisional. A purchase counts as
//! confirmed once the remote subscription service reports it `active`, or
//! when the timeout policy decides so after verification polling runs out.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{CheckoutConfig, VerificationConfig};
use crate::error::{AppError, AppResult};
use crate::external::CheckoutAgent;
use crate::models::{
    CheckoutErrorType, CheckoutOptions, CheckoutOutcome, FailureKind, PaymentConfirmation,
    PaymentEvent, PaymentFailure, PaymentState, PendingSubscriptionRecord, SubscriptionIntent,
    SubscriptionStatus,
};
use crate::services::payment_events::PaymentEvents;
use crate::services::subscription_service::SubscriptionService;
use crate::utils::parse_error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutResolution {
    AssumeActive,
    Fail,
}

/// Decides what a checkout becomes when polling never saw a terminal status.
pub type TimeoutPolicy = fn(&SubscriptionStatus) -> TimeoutResolution;

/// Default policy: the gateway webhook is the final authority on the server,
/// so an unconfirmed checkout is shown to the user as active.
pub fn optimistic_timeout_policy(_last_status: &SubscriptionStatus) -> TimeoutResolution {
    TimeoutResolution::AssumeActive
}

/// Strict alternative that leaves unconfirmed payments failed and pending.
pub fn strict_timeout_policy(_last_status: &SubscriptionStatus) -> TimeoutResolution {
    TimeoutResolution::Fail
}

#[derive(Debug, Default)]
struct WorkflowState {
    state: PaymentState,
    intent: Option<SubscriptionIntent>,
    failure: Option<PaymentFailure>,
    confirmation: Option<PaymentConfirmation>,
}

/// Drives one purchase at a time. Calling `initiate_subscription` concurrently
/// on the same instance is not supported.
pub struct SubscriptionPaymentOrchestrator {
    service: SubscriptionService,
    checkout: Arc<dyn CheckoutAgent>,
    events: PaymentEvents,
    checkout_config: CheckoutConfig,
    verification: VerificationConfig,
    timeout_policy: TimeoutPolicy,
    inner: Mutex<WorkflowState>,
}

impl SubscriptionPaymentOrchestrator {
    pub fn new(
        service: SubscriptionService,
        checkout: Arc<dyn CheckoutAgent>,
        events: PaymentEvents,
        checkout_config: CheckoutConfig,
        verification: VerificationConfig,
    ) -> Self {
        Self {
            service,
            checkout,
            events,
            checkout_config,
            verification,
            timeout_policy: optimistic_timeout_policy,
            inner: Mutex::new(WorkflowState::default()),
        }
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Runs a full purchase of `plan_id`. Returns `true` once the subscription
    /// is confirmed (or optimistically resolved); every failure is recorded in
    /// the workflow state instead of being returned.
    pub async fn initiate_subscription(&self, plan_id: &str) -> bool {
        let plan_id = plan_id.trim();
        let intent = SubscriptionIntent::new(plan_id);
        let attempt_id = intent.attempt_id;
        {
            let mut inner = self.lock();
            inner.intent = Some(intent);
            inner.failure = None;
            inner.confirmation = None;
        }

        if plan_id.is_empty() {
            return self.creation_failed(attempt_id, plan_id, "A subscription plan must be selected");
        }

        match self.run_purchase(plan_id, attempt_id).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                log::error!("Subscription purchase for plan {plan_id} failed: {e}");
                self.record_unexpected(Some(plan_id), &e);
                false
            }
        }
    }

    /// Re-checks a purchase interrupted before confirmation. An already active
    /// subscription is confirmed directly; otherwise a new purchase of the same
    /// plan is started from scratch.
    pub async fn resume_pending_payment(&self, record: &PendingSubscriptionRecord) -> bool {
        {
            let mut inner = self.lock();
            let mut intent = SubscriptionIntent::new(record.plan_id.clone());
            intent.subscription_id = Some(record.subscription_id.clone());
            inner.intent = Some(intent);
            inner.failure = None;
            inner.confirmation = None;
        }
        self.transition(PaymentState::VerifyingPayment);
        self.events.emit(PaymentEvent::Resumed {
            subscription_id: record.subscription_id.clone(),
            plan_id: record.plan_id.clone(),
        });

        match self
            .service
            .get_subscription_status(&record.subscription_id)
            .await
        {
            Ok(SubscriptionStatus::Active) => {
                log::info!(
                    "Pending subscription {} is already active",
                    record.subscription_id
                );
                self.set_confirmation(PaymentConfirmation::Verified);
                self.finish_success().await;
                self.events.emit(PaymentEvent::ResumeVerified {
                    subscription_id: record.subscription_id.clone(),
                });
                true
            }
            Ok(status) => {
                // Starts a new subscription intent; the old one is not reused
                log::info!(
                    "Pending subscription {} is {status}, restarting purchase of plan {}",
                    record.subscription_id,
                    record.plan_id
                );
                self.initiate_subscription(&record.plan_id).await
            }
            Err(e) => {
                log::error!(
                    "Failed to resume pending subscription {}: {e}",
                    record.subscription_id
                );
                self.record_unexpected(Some(&record.plan_id), &e);
                false
            }
        }
    }

    /// Startup hook: resumes the stored pending purchase, if any.
    pub async fn recover_interrupted_payment(&self) -> Option<bool> {
        match self.service.get_pending_subscription().await {
            Ok(Some(record)) => {
                log::info!(
                    "Found interrupted payment for plan {} ({}) started at {}",
                    record.plan_id,
                    record.subscription_id,
                    record.created_at
                );
                Some(self.resume_pending_payment(&record).await)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("Failed to read pending subscription: {e}");
                None
            }
        }
    }

    pub async fn verify_subscription_status(
        &self,
        subscription_id: &str,
    ) -> Option<SubscriptionStatus> {
        match self.service.get_subscription_status(subscription_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                log::warn!("Failed to verify subscription {subscription_id}: {e}");
                None
            }
        }
    }

    pub fn clear_error(&self) {
        self.lock().failure = None;
    }

    pub fn reset_state(&self) {
        *self.lock() = WorkflowState::default();
    }

    pub fn state(&self) -> PaymentState {
        self.lock().state
    }

    pub fn error(&self) -> Option<String> {
        self.lock().failure.as_ref().map(|f| f.message.clone())
    }

    pub fn failure(&self) -> Option<PaymentFailure> {
        self.lock().failure.clone()
    }

    pub fn intent(&self) -> Option<SubscriptionIntent> {
        self.lock().intent.clone()
    }

    pub fn last_confirmation(&self) -> Option<PaymentConfirmation> {
        self.lock().confirmation.clone()
    }

    pub fn is_processing(&self) -> bool {
        self.lock().state.is_in_flight()
    }

    async fn run_purchase(&self, plan_id: &str, attempt_id: Uuid) -> AppResult<bool> {
        self.transition(PaymentState::CreatingSubscription);
        self.events.emit(PaymentEvent::Initiated {
            attempt_id,
            plan_id: plan_id.to_string(),
        });

        let created = match self.service.create_subscription(plan_id).await {
            Ok(created) => created,
            Err(e) => return Ok(self.creation_failed(attempt_id, plan_id, e.to_string())),
        };
        let (Some(subscription_id), Some(checkout_key)) = (
            created.subscription_id.filter(|s| !s.is_empty()),
            created.checkout_key.filter(|s| !s.is_empty()),
        ) else {
            return Ok(self.creation_failed(
                attempt_id,
                plan_id,
                "Subscription response is missing the subscription id or checkout key",
            ));
        };

        if let Some(intent) = self.lock().intent.as_mut() {
            intent.subscription_id = Some(subscription_id.clone());
            intent.checkout_key = Some(checkout_key.clone());
        }

        // Must be durable before the agent runs: it may never hand control back
        self.service
            .set_pending_subscription(&PendingSubscriptionRecord::new(
                subscription_id.clone(),
                plan_id,
            ))
            .await?;

        self.transition(PaymentState::OpeningCheckout);
        let options = self.checkout_options(&subscription_id, &checkout_key);

        match self.checkout.open_subscription_checkout(options).await {
            CheckoutOutcome::Completed(data) => {
                self.confirm_payment(attempt_id, &subscription_id, data.payment_id)
                    .await
            }
            CheckoutOutcome::Cancelled => {
                self.checkout_cancelled(attempt_id, &subscription_id);
                Ok(false)
            }
            CheckoutOutcome::Failed(raw) => {
                let parsed = parse_error(&raw);
                if parsed.error_type == CheckoutErrorType::Cancelled {
                    self.checkout_cancelled(attempt_id, &subscription_id);
                    return Ok(false);
                }

                log::warn!(
                    "Checkout for {subscription_id} failed ({}): {}",
                    parsed.error_type.as_str(),
                    parsed.message
                );
                self.fail(PaymentFailure::new(
                    FailureKind::Checkout(parsed.error_type),
                    parsed.message.clone(),
                ));
                self.events.emit(PaymentEvent::PaymentFailed {
                    attempt_id,
                    subscription_id,
                    error_type: parsed.error_type,
                    message: parsed.message,
                });
                Ok(false)
            }
        }
    }

    async fn confirm_payment(
        &self,
        attempt_id: Uuid,
        subscription_id: &str,
        payment_id: Option<String>,
    ) -> AppResult<bool> {
        self.transition(PaymentState::ProcessingPayment);
        self.set_confirmation(PaymentConfirmation::Provisional {
            payment_id: payment_id.clone(),
        });
        self.transition(PaymentState::VerifyingPayment);
        self.events.emit(PaymentEvent::CheckoutSucceeded {
            attempt_id,
            subscription_id: subscription_id.to_string(),
            payment_id,
        });

        let status = self
            .service
            .poll_subscription_status(
                subscription_id,
                self.verification.max_attempts,
                self.verification.interval(),
            )
            .await?;

        let confirmation = PaymentConfirmation::from_polled_status(status);
        self.set_confirmation(confirmation.clone());

        match confirmation {
            PaymentConfirmation::Verified => {
                log::info!("Subscription {subscription_id} verified active");
                self.finish_success().await;
                self.events.emit(PaymentEvent::Verified {
                    attempt_id,
                    subscription_id: subscription_id.to_string(),
                });
                Ok(true)
            }
            PaymentConfirmation::VerificationFailed { status } => {
                self.verification_failed(attempt_id, subscription_id, status);
                Ok(false)
            }
            PaymentConfirmation::VerificationTimedOut { last_status } => {
                match (self.timeout_policy)(&last_status) {
                    TimeoutResolution::AssumeActive => {
                        log::warn!(
                            "Subscription {subscription_id} still {last_status} after {} checks, assuming active",
                            self.verification.max_attempts
                        );
                        self.finish_success().await;
                        self.events.emit(PaymentEvent::VerificationTimedOut {
                            attempt_id,
                            subscription_id: subscription_id.to_string(),
                            last_status,
                        });
                        Ok(true)
                    }
                    TimeoutResolution::Fail => {
                        self.verification_failed(attempt_id, subscription_id, last_status);
                        Ok(false)
                    }
                }
            }
            PaymentConfirmation::Provisional { .. } => Err(AppError::InternalError(
                "status polling produced a provisional confirmation".to_string(),
            )),
        }
    }

    fn checkout_options(&self, subscription_id: &str, checkout_key: &str) -> CheckoutOptions {
        CheckoutOptions {
            key: checkout_key.to_string(),
            subscription_id: subscription_id.to_string(),
            name: self.checkout_config.merchant_name.clone(),
            description: self.checkout_config.description.clone(),
            prefill: self.checkout_config.prefill.clone(),
            theme_color: self.checkout_config.theme_color.clone(),
        }
    }

    async fn finish_success(&self) {
        // The payment is confirmed either way; a stale marker is re-verified on next start
        if let Err(e) = self.service.clear_pending_subscription().await {
            log::warn!("Failed to clear pending subscription: {e}");
        }
        self.transition(PaymentState::Success);
    }

    fn creation_failed(&self, attempt_id: Uuid, plan_id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        log::warn!("Could not create subscription for plan {plan_id:?}: {message}");
        self.fail(PaymentFailure::new(FailureKind::Creation, message.clone()));
        self.events.emit(PaymentEvent::CreationFailed {
            attempt_id,
            plan_id: plan_id.to_string(),
            message,
        });
        false
    }

    fn checkout_cancelled(&self, attempt_id: Uuid, subscription_id: &str) {
        log::info!("Checkout for {subscription_id} cancelled by the user");
        self.transition(PaymentState::Cancelled);
        self.events.emit(PaymentEvent::CheckoutCancelled {
            attempt_id,
            subscription_id: subscription_id.to_string(),
        });
    }

    fn verification_failed(
        &self,
        attempt_id: Uuid,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) {
        log::warn!("Subscription {subscription_id} failed verification with status {status}");
        self.fail(PaymentFailure::new(
            FailureKind::Verification,
            format!("Payment verification failed: subscription is {status}"),
        ));
        self.events.emit(PaymentEvent::VerificationFailed {
            attempt_id,
            subscription_id: subscription_id.to_string(),
            status,
        });
    }

    fn record_unexpected(&self, plan_id: Option<&str>, error: &AppError) {
        let message = error.to_string();
        self.fail(PaymentFailure::new(FailureKind::Unexpected, message.clone()));
        self.events.emit(PaymentEvent::Error {
            plan_id: plan_id.map(str::to_string),
            message,
        });
    }

    fn fail(&self, failure: PaymentFailure) {
        let mut inner = self.lock();
        log::debug!("payment state: {} -> {}", inner.state, PaymentState::Failed);
        inner.state = PaymentState::Failed;
        inner.failure = Some(failure);
    }

    fn transition(&self, next: PaymentState) {
        let mut inner = self.lock();
        log::debug!("payment state: {} -> {next}", inner.state);
        inner.state = next;
    }

    fn set_confirmation(&self, confirmation: PaymentConfirmation) {
        self.lock().confirmation = Some(confirmation);
    }

    fn lock(&self) -> MutexGuard<'_, WorkflowState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
