//! Prometheus metrics for service health observability.
//!
//! Exposed at `GET /metrics` in the standard text format:
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `custodia_http_requests_total` | Counter | `endpoint`, `status` |
//! | `custodia_authz_denials_total` | Counter | `reason` |
//! | `custodia_workflow_transitions_total` | Counter | `workflow`, `transition` |

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Prometheus registration or encoding failure.
    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Encoded metrics were not valid UTF-8.
    #[error("metrics encoding produced invalid UTF-8")]
    Encoding,
}

/// Counter families for the server.
pub struct ServerMetrics {
    registry: Registry,
    http_requests: CounterVec,
    denials: CounterVec,
    transitions: CounterVec,
}

impl ServerMetrics {
    /// Creates and registers all counter families.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded metric descriptors are invalid, which would
    /// be a programming error caught by the first test run.
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests = CounterVec::new(
            Opts::new("custodia_http_requests_total", "HTTP requests served"),
            &["endpoint", "status"],
        )
        .expect("valid metric descriptor");
        let denials = CounterVec::new(
            Opts::new("custodia_authz_denials_total", "Authorization denials"),
            &["reason"],
        )
        .expect("valid metric descriptor");
        let transitions = CounterVec::new(
            Opts::new(
                "custodia_workflow_transitions_total",
                "Workflow transitions committed",
            ),
            &["workflow", "transition"],
        )
        .expect("valid metric descriptor");

        registry
            .register(Box::new(http_requests.clone()))
            .expect("register http_requests");
        registry
            .register(Box::new(denials.clone()))
            .expect("register denials");
        registry
            .register(Box::new(transitions.clone()))
            .expect("register transitions");

        Self {
            registry,
            http_requests,
            denials,
            transitions,
        }
    }

    /// Records one served request.
    pub fn request_served(&self, endpoint: &str, status: u16) {
        self.http_requests
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
    }

    /// Records an authorization denial.
    pub fn denial(&self, reason: &str) {
        self.denials.with_label_values(&[reason]).inc();
    }

    /// Records a committed workflow transition.
    pub fn transition(&self, workflow: &str, transition: &str) {
        self.transitions
            .with_label_values(&[workflow, transition])
            .inc();
    }

    /// Encodes all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|_| MetricsError::Encoding)
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_text_exposition() {
        let metrics = ServerMetrics::new();
        metrics.request_served("/seizures", 200);
        metrics.denial("self_approval_forbidden");
        metrics.transition("transfer", "approve");

        let text = metrics.encode_text().expect("encode");
        assert!(text.contains("custodia_http_requests_total"));
        assert!(text.contains("custodia_authz_denials_total"));
        assert!(text.contains("custodia_workflow_transitions_total"));
        assert!(text.contains("self_approval_forbidden"));
    }
}
