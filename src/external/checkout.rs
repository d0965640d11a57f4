use actix_web::{App, HttpServer, middleware::Logger, web};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::CheckoutConfig;
use crate::error::AppResult;
use crate::handlers::checkout_callback::{CheckoutSession, checkout_callback_config};
use crate::models::{CheckoutOptions, CheckoutOutcome};

/// External checkout flow. Its success is provisional: callers must confirm
/// the payment against the remote subscription status.
#[async_trait]
pub trait CheckoutAgent: Send + Sync {
    async fn open_subscription_checkout(&self, options: CheckoutOptions) -> CheckoutOutcome;
}

/// Runs the hosted checkout in the user's browser and waits for the gateway
/// to redirect back to a short-lived local server.
#[derive(Clone)]
pub struct LoopbackCheckoutAgent {
    config: CheckoutConfig,
}

impl LoopbackCheckoutAgent {
    pub fn new(config: CheckoutConfig) -> Self {
        Self { config }
    }

    fn announce(&self, checkout_url: &str) {
        log::info!("Complete the subscription payment at {checkout_url}");

        if let Some(command) = &self.config.open_command
            && let Err(e) = std::process::Command::new(command)
                .arg(checkout_url)
                .spawn()
        {
            log::warn!("Failed to launch `{command}` for checkout: {e}");
        }
    }

    async fn run(&self, options: CheckoutOptions) -> AppResult<CheckoutOutcome> {
        let base_url = self.config.local_base_url();
        let (session, outcome_rx) = CheckoutSession::new(
            options,
            self.config.hosted_url.clone(),
            format!("{base_url}/checkout/callback"),
            format!("{base_url}/checkout/cancel"),
        );
        let session = web::Data::new(session);

        let server = {
            let session = session.clone();
            HttpServer::new(move || {
                App::new()
                    .wrap(Logger::default())
                    .app_data(session.clone())
                    .configure(checkout_callback_config)
            })
            .workers(1)
            .bind((self.config.host.as_str(), self.config.port))?
            .run()
        };
        let handle = server.handle();
        tokio::spawn(server);

        self.announce(&format!("{base_url}/checkout"));

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                log::warn!("Checkout session closed without an outcome");
                CheckoutOutcome::Cancelled
            }
            Err(_) => {
                log::warn!(
                    "Checkout not completed within {}s, treating it as dismissed",
                    self.config.timeout_secs
                );
                CheckoutOutcome::Cancelled
            }
        };

        handle.stop(true).await;
        Ok(outcome)
    }
}

#[async_trait]
impl CheckoutAgent for LoopbackCheckoutAgent {
    async fn open_subscription_checkout(&self, options: CheckoutOptions) -> CheckoutOutcome {
        match self.run(options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Failed to open checkout: {e}");
                CheckoutOutcome::Failed(json!({
                    "code": "INVALID_OPTIONS",
                    "description": format!("Checkout could not be opened: {e}"),
                }))
            }
        }
    }
}
