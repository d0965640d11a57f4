use std::sync::Arc;

use crate::external::{AnalyticsSink, LogAnalyticsSink, LogNotifier, Notifier};
use crate::models::PaymentEvent;

/// Single emission point for workflow milestones: every event goes to
/// analytics, and those with a user-facing notice also raise a toast.
#[derive(Clone)]
pub struct PaymentEvents {
    analytics: Arc<dyn AnalyticsSink>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentEvents {
    pub fn new(analytics: Arc<dyn AnalyticsSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            analytics,
            notifier,
        }
    }

    pub fn emit(&self, event: PaymentEvent) {
        self.analytics.log_event(event.name(), event.properties());
        if let Some(notice) = event.notice() {
            self.notifier.notify(notice);
        }
    }
}

impl Default for PaymentEvents {
    fn default() -> Self {
        Self::new(Arc::new(LogAnalyticsSink), Arc::new(LogNotifier))
    }
}
