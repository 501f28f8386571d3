//! Prometheus metrics for the federation layer.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::error::Error;

/// Reason label value for failed appends.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum AppendFailureReason {
    NotFound,
    OutOfOrder,
    Duplicate,
    OutOfBounds,
    Other,
}

impl From<&Error> for AppendFailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound => AppendFailureReason::NotFound,
            Error::OutOfOrderSample => AppendFailureReason::OutOfOrder,
            Error::DuplicateSampleForTimestamp => AppendFailureReason::Duplicate,
            Error::OutOfBounds => AppendFailureReason::OutOfBounds,
            _ => AppendFailureReason::Other,
        }
    }
}

/// Labels for append failure metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AppendFailureLabels {
    pub reason: AppendFailureReason,
}

/// Labels for admin request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AdminLabels {
    pub operation: String,
    pub status: u16,
}

/// Container for all Prometheus metrics.
pub struct Metrics {
    registry: Registry,

    /// Counter of queries dispatched to remote read backends.
    pub remote_read_queries: Counter,

    /// Counter of remote read queries that failed.
    pub remote_read_failures: Counter,

    /// Counter of remote queriers skipped because local storage covers the range.
    pub remote_read_skipped: Counter,

    /// Counter of failed appends to local storage, by reason.
    pub local_append_failures: Family<AppendFailureLabels, Counter>,

    /// Counter of admin requests, by operation and HTTP status.
    pub admin_requests: Family<AdminLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Registry for a process serving only the admin surface. The remote read
    /// and append counters exist but are not exported.
    pub fn admin() -> Self {
        Self::build(false)
    }

    fn build(federation: bool) -> Self {
        let mut registry = Registry::default();

        let remote_read_queries = Counter::default();
        let remote_read_failures = Counter::default();
        let remote_read_skipped = Counter::default();
        let local_append_failures = Family::<AppendFailureLabels, Counter>::default();
        if federation {
            registry.register(
                "remote_read_queries",
                "Number of queries sent to remote read backends",
                remote_read_queries.clone(),
            );
            registry.register(
                "remote_read_failures",
                "Number of remote read queries that failed",
                remote_read_failures.clone(),
            );
            registry.register(
                "remote_read_skipped",
                "Number of remote queriers skipped because local storage covers the range",
                remote_read_skipped.clone(),
            );
            registry.register(
                "local_append_failures",
                "Number of samples rejected by local storage",
                local_append_failures.clone(),
            );
        }

        let admin_requests = Family::<AdminLabels, Counter>::default();
        registry.register(
            "admin_requests",
            "Number of admin API requests",
            admin_requests.clone(),
        );

        Self {
            registry,
            remote_read_queries,
            remote_read_failures,
            remote_read_skipped,
            local_append_failures,
            admin_requests,
        }
    }

    /// Records a failed append.
    pub fn record_append_failure(&self, err: &Error) {
        self.local_append_failures
            .get_or_create(&AppendFailureLabels {
                reason: AppendFailureReason::from(err),
            })
            .inc();
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }
}
