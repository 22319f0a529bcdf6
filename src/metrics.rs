use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Why a live collection re-read its backing table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchTrigger {
    Initial,
    Notification,
    Poll,
    Manual,
}

impl RefetchTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Notification => "notification",
            Self::Poll => "poll",
            Self::Manual => "manual",
        }
    }
}

/// Metric names and recording helpers
///
/// Nothing is exported unless the binary installs a recorder; without one
/// every call is a no-op.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub backend_calls_total: &'static str,
    pub backend_call_duration: &'static str,
    pub refetches_total: &'static str,
    pub refetch_failures_total: &'static str,
    pub active_subscriptions: &'static str,
    pub validation_failures_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            backend_calls_total: "zesty_backend_calls_total",
            backend_call_duration: "zesty_backend_call_duration_seconds",
            refetches_total: "zesty_refetches_total",
            refetch_failures_total: "zesty_refetch_failures_total",
            active_subscriptions: "zesty_active_subscriptions",
            validation_failures_total: "zesty_validation_failures_total",
        }
    }
}

impl MetricsCollector {
    /// Record one backend request
    pub fn record_backend_call(&self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(self.backend_calls_total, "operation" => operation, "status" => status).increment(1);
        histogram!(self.backend_call_duration, "operation" => operation).record(duration.as_secs_f64());
    }

    /// Record a live-collection refetch
    pub fn record_refetch(&self, collection: &'static str, trigger: RefetchTrigger, success: bool) {
        counter!(self.refetches_total, "collection" => collection, "trigger" => trigger.as_str()).increment(1);
        if !success {
            counter!(self.refetch_failures_total, "collection" => collection).increment(1);
        }
    }

    pub fn subscription_opened(&self, table: &'static str) {
        gauge!(self.active_subscriptions, "table" => table).increment(1.0);
    }

    pub fn subscription_closed(&self, table: &'static str) {
        gauge!(self.active_subscriptions, "table" => table).decrement(1.0);
    }

    /// Record a form rejected before any network call
    pub fn record_validation_failure(&self, form: &'static str) {
        counter!(self.validation_failures_total, "form" => form).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.backend_calls_total, "zesty_backend_calls_total");
    }

    #[test]
    fn test_trigger_labels() {
        assert_eq!(RefetchTrigger::Notification.as_str(), "notification");
        assert_eq!(RefetchTrigger::Poll.as_str(), "poll");
    }
}
