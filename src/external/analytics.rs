use chrono::Utc;
use reqwest::Client;
use serde_json::{Map, Value, json};

use crate::models::{Notice, NoticeLevel};

/// Fire-and-forget event logging. Implementations must not block and
/// must swallow their own failures.
pub trait AnalyticsSink: Send + Sync {
    fn log_event(&self, name: &str, properties: Map<String, Value>);
}

/// Transient user-facing notifications (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Clone, Default)]
pub struct LogAnalyticsSink;

impl AnalyticsSink for LogAnalyticsSink {
    fn log_event(&self, name: &str, properties: Map<String, Value>) {
        log::info!("analytics event {name}: {}", Value::Object(properties));
    }
}

/// Posts events to the analytics collector on a detached task.
#[derive(Clone)]
pub struct HttpAnalyticsSink {
    client: Client,
    endpoint: String,
}

impl HttpAnalyticsSink {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

impl AnalyticsSink for HttpAnalyticsSink {
    fn log_event(&self, name: &str, properties: Map<String, Value>) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let body = json!({
            "event": name,
            "properties": properties,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime; dropping analytics event {name}");
            return;
        };

        let name = name.to_string();
        handle.spawn(async move {
            match client.post(&endpoint).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => log::warn!("Analytics event {name} rejected: {}", resp.status()),
                Err(e) => log::warn!("Failed to send analytics event {name}: {e}"),
            }
        });
    }
}

#[derive(Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => log::warn!("[toast] {}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => log::info!("[toast] {}", notice.message),
        }
    }
}
