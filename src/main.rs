use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use trucking_subscriptions::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{
        AnalyticsSink, HttpAnalyticsSink, HttpSubscriptionApi, LogAnalyticsSink, LogNotifier,
        LoopbackCheckoutAgent,
    },
    services::*,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().context("Failed to load configuration")?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to open local storage database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let api = HttpSubscriptionApi::new(config.api.clone())
        .context("Failed to build subscription API client")?;
    let service = SubscriptionService::new(
        Arc::new(api),
        Arc::new(SeaOrmKeyValueStore::new(pool.clone())),
    );

    let analytics: Arc<dyn AnalyticsSink> = match config.analytics.endpoint.clone() {
        Some(endpoint) => Arc::new(HttpAnalyticsSink::new(endpoint)),
        None => Arc::new(LogAnalyticsSink),
    };

    let orchestrator = SubscriptionPaymentOrchestrator::new(
        service,
        Arc::new(LoopbackCheckoutAgent::new(config.checkout.clone())),
        PaymentEvents::new(analytics, Arc::new(LogNotifier)),
        config.checkout.clone(),
        config.verification.clone(),
    );

    // An interrupted purchase takes precedence over a new one
    let confirmed = match orchestrator.recover_interrupted_payment().await {
        Some(confirmed) => Some(confirmed),
        None => match std::env::var("PLAN_ID") {
            Ok(plan_id) => Some(orchestrator.initiate_subscription(&plan_id).await),
            Err(_) => {
                log::info!("No pending subscription and PLAN_ID is not set, nothing to do");
                None
            }
        },
    };

    if let Some(confirmed) = confirmed {
        log::info!(
            "Subscription payment finished: state={}, confirmed={}",
            orchestrator.state(),
            confirmed
        );
        if let Some(error) = orchestrator.error() {
            log::error!("Subscription payment error: {}", error);
        }
    }

    Ok(())
}
