use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::external::SubscriptionApi;
use crate::models::{CreateSubscriptionResponse, PendingSubscriptionRecord, SubscriptionStatus};
use crate::services::local_storage::KeyValueStore;

/// Storage key of the single pending subscription slot.
pub const PENDING_SUBSCRIPTION_KEY: &str = "pendingSubscription";

/// Remote subscription calls plus the durable pending-subscription marker.
#[derive(Clone)]
pub struct SubscriptionService {
    api: Arc<dyn SubscriptionApi>,
    storage: Arc<dyn KeyValueStore>,
}

impl SubscriptionService {
    pub fn new(api: Arc<dyn SubscriptionApi>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self { api, storage }
    }

    pub async fn create_subscription(&self, plan_id: &str) -> AppResult<CreateSubscriptionResponse> {
        self.api.create_subscription(plan_id).await
    }

    pub async fn get_subscription_status(
        &self,
        subscription_id: &str,
    ) -> AppResult<SubscriptionStatus> {
        self.api.get_subscription_status(subscription_id).await
    }

    /// Polls until a terminal status is seen or `max_attempts` is reached,
    /// waiting `interval` before every attempt.
    ///
    /// A failed attempt is logged and still counts. The last observed status
    /// is returned; if no attempt succeeded the last error is returned instead.
    pub async fn poll_subscription_status(
        &self,
        subscription_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> AppResult<SubscriptionStatus> {
        let mut last_status = None;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;

            match self.api.get_subscription_status(subscription_id).await {
                Ok(status) => {
                    log::debug!(
                        "Subscription {subscription_id} status on attempt {attempt}/{max_attempts}: {status}"
                    );
                    if status.is_terminal() {
                        return Ok(status);
                    }
                    last_status = Some(status);
                }
                Err(e) => {
                    log::warn!(
                        "Status check {attempt}/{max_attempts} for {subscription_id} failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        match (last_status, last_error) {
            (Some(status), _) => Ok(status),
            (None, Some(e)) => Err(e),
            (None, None) => Err(AppError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            )),
        }
    }

    pub async fn get_pending_subscription(&self) -> AppResult<Option<PendingSubscriptionRecord>> {
        let Some(raw) = self.storage.get_item(PENDING_SUBSCRIPTION_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // An unreadable marker cannot be resumed; drop it
                log::warn!("Discarding unreadable pending subscription: {e}");
                self.storage.remove_item(PENDING_SUBSCRIPTION_KEY).await?;
                Ok(None)
            }
        }
    }

    pub async fn set_pending_subscription(&self, record: &PendingSubscriptionRecord) -> AppResult<()> {
        let raw = serde_json::to_string(record)?;
        self.storage.set_item(PENDING_SUBSCRIPTION_KEY, &raw).await
    }

    pub async fn clear_pending_subscription(&self) -> AppResult<()> {
        self.storage.remove_item(PENDING_SUBSCRIPTION_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::local_storage::InMemoryKeyValueStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedApi {
        statuses: Mutex<VecDeque<AppResult<SubscriptionStatus>>>,
        calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(statuses: Vec<AppResult<SubscriptionStatus>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SubscriptionApi for ScriptedApi {
        async fn create_subscription(&self, _plan_id: &str) -> AppResult<CreateSubscriptionResponse> {
            Err(AppError::InternalError("not scripted".to_string()))
        }

        async fn get_subscription_status(&self, _id: &str) -> AppResult<SubscriptionStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SubscriptionStatus::Created))
        }
    }

    fn service(api: Arc<ScriptedApi>) -> (SubscriptionService, Arc<InMemoryKeyValueStore>) {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        (SubscriptionService::new(api, storage.clone()), storage)
    }

    #[tokio::test]
    async fn test_poll_stops_at_terminal_status() {
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(SubscriptionStatus::Created),
            Ok(SubscriptionStatus::Active),
        ]));
        let (service, _) = service(api.clone());

        let status = service
            .poll_subscription_status("sub_1", 5, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(status, SubscriptionStatus::Active);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_poll_exhausts_attempts_with_last_status() {
        let api = Arc::new(ScriptedApi::new(vec![]));
        let (service, _) = service(api.clone());

        let status = service
            .poll_subscription_status("sub_1", 5, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(status, SubscriptionStatus::Created);
        assert_eq!(api.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_poll_tolerates_transient_errors() {
        let api = Arc::new(ScriptedApi::new(vec![
            Err(AppError::ExternalApiError("502".to_string())),
            Ok(SubscriptionStatus::Halted),
        ]));
        let (service, _) = service(api);

        let status = service
            .poll_subscription_status("sub_1", 3, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(status, SubscriptionStatus::Halted);
    }

    #[tokio::test]
    async fn test_poll_returns_error_when_every_attempt_fails() {
        let api = Arc::new(ScriptedApi::new(vec![
            Err(AppError::ExternalApiError("timeout".to_string())),
            Err(AppError::ExternalApiError("timeout".to_string())),
        ]));
        let (service, _) = service(api);

        let result = service
            .poll_subscription_status("sub_1", 2, Duration::ZERO)
            .await;
        assert!(matches!(result, Err(AppError::ExternalApiError(_))));
    }

    #[tokio::test]
    async fn test_pending_record_single_slot() {
        let (service, storage) = service(Arc::new(ScriptedApi::new(vec![])));
        assert!(service.get_pending_subscription().await.unwrap().is_none());

        service
            .set_pending_subscription(&PendingSubscriptionRecord::new("sub_1", "plan_a"))
            .await
            .unwrap();
        service
            .set_pending_subscription(&PendingSubscriptionRecord::new("sub_2", "plan_b"))
            .await
            .unwrap();

        let record = service.get_pending_subscription().await.unwrap().unwrap();
        assert_eq!(record.subscription_id, "sub_2");
        assert_eq!(storage.len(), 1);

        service.clear_pending_subscription().await.unwrap();
        service.clear_pending_subscription().await.unwrap();
        assert!(service.get_pending_subscription().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_pending_record_is_discarded() {
        let (service, storage) = service(Arc::new(ScriptedApi::new(vec![])));
        storage
            .set_item(PENDING_SUBSCRIPTION_KEY, "not json")
            .await
            .unwrap();

        assert!(service.get_pending_subscription().await.unwrap().is_none());
        assert!(storage.is_empty());
    }
}
