use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiResponse, CreateSubscriptionRequest, CreateSubscriptionResponse, SubscriptionStatus,
    SubscriptionStatusResponse,
};

/// Remote subscription service owning the authoritative status.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn create_subscription(&self, plan_id: &str) -> AppResult<CreateSubscriptionResponse>;

    async fn get_subscription_status(&self, subscription_id: &str)
    -> AppResult<SubscriptionStatus>;
}

#[derive(Clone)]
pub struct HttpSubscriptionApi {
    client: Client,
    config: ApiConfig,
}

impl HttpSubscriptionApi {
    pub fn new(config: ApiConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        action: &str,
    ) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "{action} failed ({status}): {error_text}"
            )));
        }

        let envelope: ApiResponse<T> = response.json().await?;
        envelope.into_data()
    }
}

#[async_trait]
impl SubscriptionApi for HttpSubscriptionApi {
    async fn create_subscription(&self, plan_id: &str) -> AppResult<CreateSubscriptionResponse> {
        let body = CreateSubscriptionRequest {
            plan_id: plan_id.to_string(),
        };

        let response = self
            .authorize(self.client.post(self.url("/subscriptions")))
            .json(&body)
            .send()
            .await?;

        let created: CreateSubscriptionResponse =
            Self::read_envelope(response, "Create subscription").await?;
        log::info!(
            "Subscription created for plan {plan_id}: {:?}",
            created.subscription_id
        );
        Ok(created)
    }

    async fn get_subscription_status(
        &self,
        subscription_id: &str,
    ) -> AppResult<SubscriptionStatus> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/subscriptions/{subscription_id}/status"))),
            )
            .send()
            .await?;

        let body: SubscriptionStatusResponse =
            Self::read_envelope(response, "Fetch subscription status").await?;
        Ok(body.status)
    }
}
